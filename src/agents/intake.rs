//! Intake agent — normalizes the raw request and drafts a task brief.

use std::sync::Arc;

use super::{agent_name, AgentStack, TaskBrief, UserRequest};
use crate::agent::{json_decoder, json_encoder, AgentBuilder, AgentDefinition};
use crate::pipeline::process::{self, MaxReflections};
use crate::types::{Error, Result};

pub const NAME: &str = "intake";

const BRIEF_PROMPT: &str = "You are the intake stage of an engineering assistant. \
Rewrite the user request below as one short, precise task brief for a coding agent. \
Reply with the brief only, no preamble.\n\nRequest:\n{input}";

pub async fn definition(stack: &AgentStack) -> Result<AgentDefinition<UserRequest, TaskBrief>> {
    let template = stack.prompts.get_or_seed("intake_brief", BRIEF_PROMPT).await?;

    let normalize = process::try_pure("normalize", |request: UserRequest| {
        let trimmed = request.request.trim().to_string();
        if trimmed.is_empty() {
            return Err(Error::validation("request is empty"));
        }
        Ok(UserRequest { request: trimmed })
    });

    let draft = process::model(
        "draft_brief",
        MaxReflections::new(1),
        Arc::clone(&stack.model),
        stack.model_id.clone(),
        move |request: &UserRequest, _ctx| template.replace("{input}", &request.request),
        |request: &UserRequest, response| {
            let brief = response.trim();
            if brief.is_empty() {
                return Err(Error::model("model returned an empty brief"));
            }
            Ok(TaskBrief {
                request: request.request.clone(),
                brief: brief.to_string(),
            })
        },
        Some(stack.sink.clone()),
    );

    Ok(AgentBuilder::new(agent_name(NAME)?)
        .input(json_decoder())
        .pipeline(normalize.then(draft))
        .output_to(agent_name(super::solver::NAME)?, json_encoder())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::GuardrailEngine;
    use crate::observability::LogSink;
    use crate::pipeline::{Outcome, PipelineContext};
    use crate::registry::{open_in_memory, PromptRegistry};
    use crate::tools::{ScriptedModel, SubprocessTool};
    use crate::types::{ConversationId, ObservabilityConfig, TraceId};

    async fn stack(responses: Vec<String>) -> (AgentStack, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_in_memory().await.unwrap();
        let stack = AgentStack {
            model: Arc::new(ScriptedModel::new(responses)),
            model_id: "test-model".to_string(),
            sink: LogSink::new(&ObservabilityConfig {
                log_dir: dir.path().to_string_lossy().to_string(),
                ..ObservabilityConfig::default()
            }),
            prompts: PromptRegistry::new(pool),
            guardrails: Arc::new(GuardrailEngine::default()),
            code_runner: Arc::new(SubprocessTool::new("sh")),
            code_timeout_seconds: 5,
        };
        (stack, dir)
    }

    fn ctx() -> PipelineContext {
        PipelineContext::initial(agent_name(NAME).unwrap(), TraceId::new(), ConversationId::new())
    }

    #[tokio::test]
    async fn test_intake_produces_brief() {
        let (stack, _dir) = stack(vec!["Sort the list with quicksort.".to_string()]).await;
        let agent = definition(&stack).await.unwrap();

        let outcome = agent
            .pipeline()
            .run(
                UserRequest {
                    request: "  how do I sort a list?  ".to_string(),
                },
                ctx(),
            )
            .await;

        match outcome {
            Outcome::Success { value, ctx } => {
                assert_eq!(value.request, "how do I sort a list?");
                assert_eq!(value.brief, "Sort the list with quicksort.");
                assert_eq!(ctx.step_index(), 2);
            }
            other => panic!("expected success, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_intake_rejects_empty_request() {
        let (stack, _dir) = stack(vec!["unused".to_string()]).await;
        let agent = definition(&stack).await.unwrap();

        let outcome = agent
            .pipeline()
            .run(UserRequest { request: "   ".to_string() }, ctx())
            .await;
        match outcome {
            Outcome::Failure { error, .. } => assert!(error.contains("empty")),
            other => panic!("expected failure, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_intake_routes_to_solver() {
        let (stack, _dir) = stack(vec!["brief".to_string()]).await;
        let agent = definition(&stack).await.unwrap();
        assert_eq!(agent.input_stream(), "agent_intake_tasks");
        assert_eq!(agent.output_stream().as_deref(), Some("agent_solver_tasks"));
    }
}
