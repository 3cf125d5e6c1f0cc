//! # Courier Core - Typed Agent Pipeline Runtime
//!
//! Rust implementation of the courier agent framework providing:
//! - A three-valued outcome algebra (Success / Failure / Rejected)
//! - Composable typed pipeline stages with reflection-based retry
//! - A phantom-typed agent builder that rejects incomplete agents at compile time
//! - A broker-driven runtime with per-message concurrency and typed
//!   failure/rejection envelopes
//! - Per-conversation structured log streams
//!
//! ## Architecture
//!
//! One agent process runs one composed pipeline between two broker streams:
//! ```text
//!   broker.pull -> decode envelope -> decode payload -> initial context
//!              -> Stage 1 -> Stage 2 -> ... -> Stage n
//!              -> encode outcome -> publish envelope -> ack
//! ```
//! Agents chain linearly (`agent_<name>_tasks` streams); a terminal agent
//! writes its result to the observability sink instead of a stream.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod agent;
pub mod agents;
pub mod broker;
pub mod envelope;
pub mod guardrail;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod submit;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};
