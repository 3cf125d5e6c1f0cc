//! Per-message pipeline context.
//!
//! One `PipelineContext` exists per message. It carries identity and the
//! per-stage audit trail; it never contains the payload value. The context
//! is immutable: every mutation returns an updated copy, so a stage cannot
//! retroactively edit history.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{AgentName, ConversationId, TraceId};

/// Terminal state of one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum StageStatus {
    Success,
    Failure(String),
    Rejected(String),
}

impl StageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(_) => "failure",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Audit record for one executed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageLog {
    pub stage_name: String,
    pub stage_index: u32,
    pub duration_ms: u64,
    pub reflections_used: u32,
    pub status: StageStatus,
}

/// Immutable per-message metadata threaded through every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineContext {
    agent_name: AgentName,
    trace_id: TraceId,
    conversation_id: ConversationId,
    step_index: u32,
    step_logs: Vec<StageLog>,
}

impl PipelineContext {
    /// Fresh context at message ingress: `step_index = 0`, no logs.
    pub fn initial(agent_name: AgentName, trace_id: TraceId, conversation_id: ConversationId) -> Self {
        Self {
            agent_name,
            trace_id,
            conversation_id,
            step_index: 0,
            step_logs: Vec::new(),
        }
    }

    pub fn agent_name(&self) -> &AgentName {
        &self.agent_name
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn step_index(&self) -> u32 {
        self.step_index
    }

    pub fn step_logs(&self) -> &[StageLog] {
        &self.step_logs
    }

    /// Copy with `step_index` advanced by one.
    pub fn next_step(&self) -> Self {
        let mut next = self.clone();
        next.step_index += 1;
        next
    }

    /// Copy with `entry` appended to the audit trail.
    pub fn with_log(&self, entry: StageLog) -> Self {
        let mut next = self.clone();
        next.step_logs.push(entry);
        next
    }

    /// Record one executed stage: append its log at the current index and
    /// advance. Used by the stage logging wrapper for every terminal state,
    /// so the final `step_index` equals the number of stages executed.
    pub fn record_stage(
        &self,
        stage_name: &str,
        duration: Duration,
        reflections_used: u32,
        status: StageStatus,
    ) -> Self {
        self.with_log(StageLog {
            stage_name: stage_name.to_string(),
            stage_index: self.step_index,
            duration_ms: duration.as_millis() as u64,
            reflections_used,
            status,
        })
        .next_step()
    }

    /// `(stage_name, duration_ms)` roll-up for the per-message summary.
    pub fn timing_summary(&self) -> Vec<(String, u64)> {
        self.step_logs
            .iter()
            .map(|log| (log.stage_name.clone(), log.duration_ms))
            .collect()
    }
}
