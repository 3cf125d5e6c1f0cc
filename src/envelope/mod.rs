//! Envelope — the inter-agent wire record.
//!
//! Every message between agents is a UTF-8 JSON object with exactly the
//! fields of [`Envelope`] (underscore key spelling is part of the ABI).
//! The `payload_type` discriminator keeps upstream failures and guardrail
//! rejections first-class on the wire so downstream agents can react to
//! each differently.

use serde::{Deserialize, Serialize};

use crate::types::{AgentName, ConversationId, TraceId};

pub mod codec;

pub use codec::{decode, encode, payload_or_string};

/// Payload discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    Normal,
    UpstreamFailure,
    UpstreamRejection,
}

/// Payload of an `UpstreamFailure` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamFailure {
    pub from_agent: String,
    pub error: String,
}

/// Payload of an `UpstreamRejection` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRejection {
    pub from_agent: String,
    pub guardrail_name: String,
    pub reason: String,
}

/// Inbound payload after typed dispatch on `payload_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    Normal(serde_json::Value),
    Failure(UpstreamFailure),
    Rejection(UpstreamRejection),
}

/// The wire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from_agent: String,
    pub to_agent: String,
    pub trace_id: String,
    pub conversation_id: String,
    pub payload_type: PayloadKind,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// A `Normal` envelope carrying a structured payload.
    pub fn normal(
        from_agent: &AgentName,
        to_agent: &AgentName,
        trace_id: &TraceId,
        conversation_id: &ConversationId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            trace_id: trace_id.to_string(),
            conversation_id: conversation_id.to_string(),
            payload_type: PayloadKind::Normal,
            payload,
        }
    }

    /// An `UpstreamFailure` envelope announcing this agent's failed outcome.
    pub fn upstream_failure(
        from_agent: &AgentName,
        to_agent: &AgentName,
        trace_id: &TraceId,
        conversation_id: &ConversationId,
        error: impl Into<String>,
    ) -> Self {
        let failure = UpstreamFailure {
            from_agent: from_agent.to_string(),
            error: error.into(),
        };
        Self {
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            trace_id: trace_id.to_string(),
            conversation_id: conversation_id.to_string(),
            payload_type: PayloadKind::UpstreamFailure,
            payload: payload_or_string(&failure),
        }
    }

    /// An `UpstreamRejection` envelope announcing a guardrail block.
    pub fn upstream_rejection(
        from_agent: &AgentName,
        to_agent: &AgentName,
        trace_id: &TraceId,
        conversation_id: &ConversationId,
        guardrail_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let rejection = UpstreamRejection {
            from_agent: from_agent.to_string(),
            guardrail_name: guardrail_name.into(),
            reason: reason.into(),
        };
        Self {
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            trace_id: trace_id.to_string(),
            conversation_id: conversation_id.to_string(),
            payload_type: PayloadKind::UpstreamRejection,
            payload: payload_or_string(&rejection),
        }
    }

    /// Dispatch the payload by its discriminator.
    pub fn inbound_payload(&self) -> crate::types::Result<InboundPayload> {
        match self.payload_type {
            PayloadKind::Normal => Ok(InboundPayload::Normal(self.payload.clone())),
            PayloadKind::UpstreamFailure => {
                let failure: UpstreamFailure = serde_json::from_value(self.payload.clone())
                    .map_err(|e| {
                        crate::types::Error::decode(format!("bad UpstreamFailure payload: {}", e))
                    })?;
                Ok(InboundPayload::Failure(failure))
            }
            PayloadKind::UpstreamRejection => {
                let rejection: UpstreamRejection = serde_json::from_value(self.payload.clone())
                    .map_err(|e| {
                        crate::types::Error::decode(format!("bad UpstreamRejection payload: {}", e))
                    })?;
                Ok(InboundPayload::Rejection(rejection))
            }
        }
    }
}
