//! Subprocess executor — runs code snippets with a per-call timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use super::Tool;
use crate::types::{Error, Result};

/// Request to execute a code snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessRequest {
    pub code: String,
    pub timeout_seconds: u64,
}

/// Execution report. A timed-out run reports a negative exit code and a
/// timeout marker in stderr rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub execution_time_ms: u64,
}

/// Runs snippets through an interpreter (`<interpreter> -c <code>`).
#[derive(Debug, Clone)]
pub struct SubprocessTool {
    interpreter: String,
}

impl SubprocessTool {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    async fn execute(&self, request: SubprocessRequest) -> Result<SubprocessOutput> {
        if request.timeout_seconds == 0 {
            return Err(Error::tool("timeout_seconds must be positive"));
        }

        let started = Instant::now();
        let child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(&request.code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(format!("failed to spawn {}: {}", self.interpreter, e)))?;

        let deadline = Duration::from_secs(request.timeout_seconds);
        match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(SubprocessOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().map(i64::from).unwrap_or(-1),
                execution_time_ms: started.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(Error::tool(format!("subprocess wait failed: {}", e))),
            Err(_elapsed) => Ok(SubprocessOutput {
                stdout: String::new(),
                stderr: format!("[timeout] execution exceeded {}s", request.timeout_seconds),
                exit_code: -1,
                execution_time_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}

impl Default for SubprocessTool {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl Tool for SubprocessTool {
    fn name(&self) -> &str {
        "subprocess"
    }

    async fn invoke(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        let request: SubprocessRequest = serde_json::from_value(request)
            .map_err(|e| Error::tool(format!("invalid subprocess request: {}", e)))?;
        let output = self.execute(request).await?;
        Ok(serde_json::to_value(output)?)
    }
}
