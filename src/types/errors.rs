//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the courier core.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or builder validation errors.
    #[error("validation error: {0}")]
    Validation(String),

    /// Envelope or payload could not be parsed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Broker operation failed (connect, publish, pull, ack).
    #[error("broker error: {0}")]
    Broker(String),

    /// Model call failed.
    #[error("model error: {0}")]
    Model(String),

    /// Tool invocation failed.
    #[error("tool error: {0}")]
    Tool(String),

    /// Resource not found (stream, prompt, policy).
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Registry database errors.
    #[error("registry error: {0}")]
    Registry(#[from] sqlx::Error),

    /// HTTP transport errors (model endpoint).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
