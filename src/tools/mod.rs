//! External tool interfaces and implementations.
//!
//! Tools exchange structured JSON values at the trait boundary; typed
//! conversion happens in the process layer of the invoking agent.

use async_trait::async_trait;

use crate::types::Result;

pub mod model;
pub mod subprocess;

pub use model::{HttpModelClient, ModelClient, ModelRequest, ModelResponse, ScriptedModel};
pub use subprocess::{SubprocessOutput, SubprocessRequest, SubprocessTool};

/// A callable external tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Invoke the tool. `Err` means the tool itself failed; a tool that ran
    /// and produced a bad result (e.g. a non-zero exit code) reports that in
    /// its output value.
    async fn invoke(&self, request: serde_json::Value) -> Result<serde_json::Value>;
}
