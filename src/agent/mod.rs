//! Agent definition — the immutable product of the builder.
//!
//! An `AgentDefinition` is constructed once at startup, owns no per-message
//! state, and is shared read-only across the runtime's message tasks.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::envelope::{UpstreamFailure, UpstreamRejection};
use crate::pipeline::Stage;
use crate::types::{AgentName, Error, Result};

pub mod builder;

pub use builder::AgentBuilder;

/// Payload decoder at the agent's input edge.
pub type Decoder<I> = Arc<dyn Fn(&serde_json::Value) -> Result<I> + Send + Sync>;

/// Payload encoder at the agent's output edge.
pub type Encoder<O> = Arc<dyn Fn(&O) -> Result<serde_json::Value> + Send + Sync>;

/// Handler for inbound upstream-failure/rejection envelopes.
pub type UpstreamHandler<I> = Arc<dyn Fn(UpstreamNotice) -> UpstreamReaction<I> + Send + Sync>;

/// What an upstream agent reported instead of a normal payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamNotice {
    Failure(UpstreamFailure),
    Rejection(UpstreamRejection),
}

/// How this agent reacts to an upstream notice.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReaction<I> {
    /// Run the pipeline on a substitute input (the conversation continues).
    Continue(I),
    /// Surface a failure outcome mirroring the upstream one.
    Fail(String),
    /// Surface a rejection outcome mirroring the upstream one.
    Reject { policy: String, reason: String },
}

/// Where the pipeline's outcome goes.
pub enum OutputBinding<O> {
    /// Non-terminal: encode and publish to the next agent's stream.
    Stream { to: AgentName, encoder: Encoder<O> },
    /// Terminal: encode for the observability sink only.
    Terminal { encoder: Encoder<O> },
}

impl<O> OutputBinding<O> {
    /// Encode a pipeline output for the wire (or, for terminal agents, the
    /// observability sink).
    pub fn encode(&self, value: &O) -> Result<serde_json::Value> {
        match self {
            Self::Stream { encoder, .. } | Self::Terminal { encoder } => (**encoder)(value),
        }
    }
}

impl<O> std::fmt::Debug for OutputBinding<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream { to, .. } => f.debug_struct("Stream").field("to", to).finish(),
            Self::Terminal { .. } => f.debug_struct("Terminal").finish(),
        }
    }
}

/// Fully-configured agent: name, input binding, composed pipeline, output
/// binding, and the upstream-notice handler.
pub struct AgentDefinition<I, O> {
    name: AgentName,
    input_stream: String,
    decoder: Decoder<I>,
    pipeline: Stage<I, O>,
    output: OutputBinding<O>,
    upstream: UpstreamHandler<I>,
}

impl<I, O> std::fmt::Debug for AgentDefinition<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("input_stream", &self.input_stream)
            .field("pipeline", &self.pipeline)
            .field("output", &self.output)
            .finish()
    }
}

impl<I, O> AgentDefinition<I, O> {
    pub fn name(&self) -> &AgentName {
        &self.name
    }

    pub fn input_stream(&self) -> &str {
        &self.input_stream
    }

    pub fn pipeline(&self) -> &Stage<I, O> {
        &self.pipeline
    }

    /// Decode a `Normal` payload into the pipeline input type.
    pub fn decode_input(&self, value: &serde_json::Value) -> Result<I> {
        (*self.decoder)(value)
    }

    /// Dispatch an upstream failure/rejection through the agent's handler.
    pub fn react_upstream(&self, notice: UpstreamNotice) -> UpstreamReaction<I> {
        (*self.upstream)(notice)
    }

    pub fn output(&self) -> &OutputBinding<O> {
        &self.output
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.output, OutputBinding::Terminal { .. })
    }

    /// Output stream name for a non-terminal agent.
    pub fn output_stream(&self) -> Option<String> {
        match &self.output {
            OutputBinding::Stream { to, .. } => Some(to.task_stream()),
            OutputBinding::Terminal { .. } => None,
        }
    }
}

/// Serde-backed payload decoder.
pub fn json_decoder<I: DeserializeOwned>() -> Decoder<I> {
    Arc::new(|value: &serde_json::Value| {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::decode(format!("payload does not match schema: {}", e)))
    })
}

/// Serde-backed payload encoder.
pub fn json_encoder<O: Serialize>() -> Encoder<O> {
    Arc::new(|value: &O| Ok(serde_json::to_value(value)?))
}

/// The standard propagation handler: mirror upstream failures as failures
/// and upstream rejections as rejections, so non-success outcomes travel
/// the whole topology unchanged.
pub fn propagate_upstream<I>() -> UpstreamHandler<I> {
    Arc::new(|notice| match notice {
        UpstreamNotice::Failure(f) => UpstreamReaction::Fail(format!(
            "upstream failure from {}: {}",
            f.from_agent, f.error
        )),
        UpstreamNotice::Rejection(r) => UpstreamReaction::Reject {
            policy: r.guardrail_name,
            reason: r.reason,
        },
    })
}
