//! The canonical four-agent topology: intake -> solver -> executor -> presenter.
//!
//! Each agent module exposes a `definition` constructor that assembles its
//! pipeline from the shared [`AgentStack`] dependencies. Payload types for
//! the whole chain live here so adjacent agents agree on the wire schema.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::guardrail::GuardrailEngine;
use crate::observability::LogSink;
use crate::registry::PromptRegistry;
use crate::tools::{ModelClient, Tool};
use crate::types::{AgentName, Result};

pub mod executor;
pub mod intake;
pub mod presenter;
pub mod solver;

/// What the submitter sends to the intake agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRequest {
    pub request: String,
}

/// Intake output: the normalized request plus a model-drafted task brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBrief {
    pub request: String,
    pub brief: String,
}

/// Solver output: prose plus a runnable snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub brief: String,
    pub explanation: String,
    pub code: String,
}

/// Executor output: the solution folded together with its run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub explanation: String,
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub ran: bool,
}

/// Presenter output: the user-facing answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub text: String,
}

/// Shared dependencies for agent construction.
#[derive(Clone)]
pub struct AgentStack {
    pub model: Arc<dyn ModelClient>,
    pub model_id: String,
    pub sink: LogSink,
    pub prompts: PromptRegistry,
    pub guardrails: Arc<GuardrailEngine>,
    pub code_runner: Arc<dyn Tool>,
    pub code_timeout_seconds: u64,
}

impl std::fmt::Debug for AgentStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStack")
            .field("model_id", &self.model_id)
            .field("code_timeout_seconds", &self.code_timeout_seconds)
            .finish()
    }
}

pub(crate) fn agent_name(name: &str) -> Result<AgentName> {
    AgentName::from_string(name.to_string()).map_err(crate::types::Error::validation)
}
