//! Guardrail engine — policy checks whose blocks become `Rejected`.
//!
//! Policies are deny-lists of terms, loaded from the guardrail registry.
//! Evaluation scans the serialized stage output case-insensitively; the
//! first matching policy blocks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::pipeline::{Outcome, Stage};

/// A named deny-list policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailPolicy {
    pub name: String,
    pub blocked_terms: Vec<String>,
    pub reason: String,
}

/// Result of evaluating the policy set against a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Blocked { policy: String, reason: String },
}

/// Read-only policy evaluator shared across messages.
#[derive(Debug, Clone, Default)]
pub struct GuardrailEngine {
    policies: Vec<GuardrailPolicy>,
}

impl GuardrailEngine {
    pub fn new(policies: Vec<GuardrailPolicy>) -> Self {
        Self { policies }
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Scan `text` against every policy; first match blocks.
    pub fn evaluate(&self, text: &str) -> Verdict {
        let haystack = text.to_lowercase();
        for policy in &self.policies {
            for term in &policy.blocked_terms {
                if !term.is_empty() && haystack.contains(&term.to_lowercase()) {
                    return Verdict::Blocked {
                        policy: policy.name.clone(),
                        reason: policy.reason.clone(),
                    };
                }
            }
        }
        Verdict::Pass
    }
}

/// Guard stage appended after a pipeline: transparent on pass, replaces the
/// outcome with `Rejected(policy, reason)` on block.
pub fn stage<O>(engine: Arc<GuardrailEngine>) -> Stage<O, O>
where
    O: serde::Serialize + Send + 'static,
{
    Stage::new("guardrail", move |value: O, ctx| {
        let engine = Arc::clone(&engine);
        async move {
            let rendered = serde_json::to_string(&value).unwrap_or_default();
            match engine.evaluate(&rendered) {
                Verdict::Pass => Outcome::success(value, ctx),
                Verdict::Blocked { policy, reason } => Outcome::rejected(policy, reason, ctx),
            }
        }
    })
    .logged()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineContext;
    use crate::types::{AgentName, ConversationId, TraceId};

    fn secrets_policy() -> GuardrailPolicy {
        GuardrailPolicy {
            name: "no_secrets".to_string(),
            blocked_terms: vec!["api_key".to_string(), "password".to_string()],
            reason: "output contains credential material".to_string(),
        }
    }

    fn ctx() -> PipelineContext {
        PipelineContext::initial(
            AgentName::from_string("tester".to_string()).unwrap(),
            TraceId::new(),
            ConversationId::new(),
        )
    }

    #[test]
    fn test_empty_engine_passes_everything() {
        let engine = GuardrailEngine::default();
        assert_eq!(engine.evaluate("password=hunter2"), Verdict::Pass);
    }

    #[test]
    fn test_block_is_case_insensitive() {
        let engine = GuardrailEngine::new(vec![secrets_policy()]);
        match engine.evaluate("here is my PASSWORD") {
            Verdict::Blocked { policy, .. } => assert_eq!(policy, "no_secrets"),
            Verdict::Pass => panic!("expected block"),
        }
    }

    #[test]
    fn test_first_matching_policy_wins() {
        let engine = GuardrailEngine::new(vec![
            secrets_policy(),
            GuardrailPolicy {
                name: "second".to_string(),
                blocked_terms: vec!["password".to_string()],
                reason: "other".to_string(),
            },
        ]);
        match engine.evaluate("password") {
            Verdict::Blocked { policy, .. } => assert_eq!(policy, "no_secrets"),
            Verdict::Pass => panic!("expected block"),
        }
    }

    #[tokio::test]
    async fn test_guard_stage_transparent_on_pass() {
        let engine = Arc::new(GuardrailEngine::new(vec![secrets_policy()]));
        let guard = stage::<String>(engine);
        match guard.run("all clear".to_string(), ctx()).await {
            Outcome::Success { value, .. } => assert_eq!(value, "all clear"),
            other => panic!("expected success, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_guard_stage_rejects_on_block() {
        let engine = Arc::new(GuardrailEngine::new(vec![secrets_policy()]));
        let guard = stage::<String>(engine);
        match guard.run("leak the api_key".to_string(), ctx()).await {
            Outcome::Rejected { policy, reason, .. } => {
                assert_eq!(policy, "no_secrets");
                assert!(reason.contains("credential"));
            }
            other => panic!("expected rejection, got {}", other.label()),
        }
    }
}
