//! Structured record schema for the conversation log streams.
//!
//! One record per line, serialized as JSON. Every record carries the
//! conversation id, a level, a source, and an ISO-8601 UTC timestamp;
//! model-call records additionally carry the prompt, response, model
//! identity, and call latency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::StageLog;

/// Record discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    StageStarted,
    StageFinished,
    MessageSummary,
    LlmCall,
    TerminalOutput,
    Submission,
}

/// Record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

/// Emitting subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    Agent,
    Submit,
    #[serde(rename = "LLM")]
    Llm,
    #[serde(rename = "CLI")]
    Cli,
}

/// Per-stage timing entry in a message summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
}

/// One line in a conversation log stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub conversation_id: String,
    pub level: LogLevel,
    pub source: LogSource,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    pub message: String,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageTiming>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl LogRecord {
    fn base(
        kind: RecordKind,
        conversation_id: &str,
        level: LogLevel,
        source: LogSource,
        agent_name: Option<&str>,
        message: String,
    ) -> Self {
        Self {
            kind,
            conversation_id: conversation_id.to_string(),
            level,
            source,
            agent_name: agent_name.map(str::to_string),
            message,
            timestamp: Utc::now(),
            stages: None,
            prompt: None,
            response: None,
            model: None,
            duration_ms: None,
        }
    }

    pub fn stage_started(conversation_id: &str, agent_name: &str, stage: &str, index: u32) -> Self {
        Self::base(
            RecordKind::StageStarted,
            conversation_id,
            LogLevel::Info,
            LogSource::Agent,
            Some(agent_name),
            format!("stage {} [{}] started", stage, index),
        )
    }

    pub fn stage_finished(conversation_id: &str, agent_name: &str, log: &StageLog) -> Self {
        let level = match log.status {
            crate::pipeline::StageStatus::Success => LogLevel::Info,
            _ => LogLevel::Error,
        };
        let mut record = Self::base(
            RecordKind::StageFinished,
            conversation_id,
            level,
            LogSource::Agent,
            Some(agent_name),
            format!(
                "stage {} [{}] finished: {} ({} reflections)",
                log.stage_name,
                log.stage_index,
                log.status.label(),
                log.reflections_used
            ),
        );
        record.duration_ms = Some(log.duration_ms);
        record
    }

    pub fn message_summary(
        conversation_id: &str,
        agent_name: &str,
        outcome_label: &str,
        timings: Vec<(String, u64)>,
    ) -> Self {
        let mut record = Self::base(
            RecordKind::MessageSummary,
            conversation_id,
            LogLevel::Info,
            LogSource::Agent,
            Some(agent_name),
            format!("message processed: {}", outcome_label),
        );
        record.stages = Some(
            timings
                .into_iter()
                .map(|(stage, duration_ms)| StageTiming { stage, duration_ms })
                .collect(),
        );
        record
    }

    pub fn model_call(
        conversation_id: &str,
        agent_name: &str,
        prompt: &str,
        response: &str,
        model: &str,
        latency_ms: u64,
    ) -> Self {
        let mut record = Self::base(
            RecordKind::LlmCall,
            conversation_id,
            LogLevel::Info,
            LogSource::Llm,
            Some(agent_name),
            format!(
                "model call: prompt {} chars, response {} chars",
                prompt.len(),
                response.len()
            ),
        );
        record.prompt = Some(prompt.to_string());
        record.response = Some(response.to_string());
        record.model = Some(model.to_string());
        record.duration_ms = Some(latency_ms);
        record
    }

    pub fn terminal_output(conversation_id: &str, agent_name: &str, message: String) -> Self {
        Self::base(
            RecordKind::TerminalOutput,
            conversation_id,
            LogLevel::Info,
            LogSource::Agent,
            Some(agent_name),
            message,
        )
    }

    pub fn submission(conversation_id: &str, message: String) -> Self {
        Self::base(
            RecordKind::Submission,
            conversation_id,
            LogLevel::Info,
            LogSource::Submit,
            None,
            message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_shape() {
        let record = LogRecord::model_call("c-1", "solver", "hi", "hello there", "m1", 42);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "llm_call");
        assert_eq!(value["conversation_id"], "c-1");
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["source"], "LLM");
        assert_eq!(value["agent_name"], "solver");
        assert_eq!(value["prompt"], "hi");
        assert_eq!(value["model"], "m1");
        assert_eq!(value["duration_ms"], 42);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_optional_fields_omitted() {
        let record = LogRecord::submission("c-2", "submitted".to_string());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["source"], "Submit");
        assert!(value.get("agent_name").is_none());
        assert!(value.get("prompt").is_none());
        assert!(value.get("stages").is_none());
    }

    #[test]
    fn test_summary_carries_timings() {
        let record = LogRecord::message_summary(
            "c-3",
            "intake",
            "success",
            vec![("normalize".to_string(), 2), ("draft".to_string(), 120)],
        );
        let value = serde_json::to_value(&record).unwrap();
        let stages = value["stages"].as_array().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0]["stage"], "normalize");
        assert_eq!(stages[1]["duration_ms"], 120);
    }
}
