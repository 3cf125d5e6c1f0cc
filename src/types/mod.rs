//! Core types for the courier runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (TraceId, ConversationId, AgentName)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for broker, observability, model, registry

mod config;
mod errors;
mod ids;

pub use config::{BrokerConfig, Config, ModelConfig, ObservabilityConfig, RegistryConfig};
pub use errors::{Error, Result};
pub use ids::{AgentName, ConversationId, TraceId};
