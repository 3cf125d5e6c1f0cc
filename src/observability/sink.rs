//! Append-only JSONL sinks keyed by conversation id.
//!
//! Two streams per conversation:
//! - `agent_logs/<conversation_id>_<agent_name>.jsonl` (records with an agent)
//! - `conversation_logs/<conversation_id>.jsonl` (all records)
//!
//! Writes retry with capped exponential backoff; a record that still cannot
//! be written is reported to stderr and dropped. A sink failure never
//! reaches the pipeline outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::records::LogRecord;
use crate::types::ObservabilityConfig;

/// Cloneable handle to the conversation log streams.
#[derive(Debug, Clone)]
pub struct LogSink {
    root: PathBuf,
    write_attempts: u32,
    write_backoff: Duration,
    write_backoff_cap: Duration,
}

impl LogSink {
    pub fn new(config: &ObservabilityConfig) -> Self {
        Self {
            root: PathBuf::from(&config.log_dir),
            write_attempts: config.write_attempts.max(1),
            write_backoff: config.write_backoff,
            write_backoff_cap: config.write_backoff_cap,
        }
    }

    /// Append one record to both streams. Infallible by contract: failures
    /// are retried, then reported to stderr and swallowed.
    pub async fn append(&self, record: LogRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("log sink: record serialization failed: {}", e);
                return;
            }
        };

        let conversation_path = self
            .root
            .join("conversation_logs")
            .join(format!("{}.jsonl", record.conversation_id));
        self.append_line(&conversation_path, &line).await;

        if let Some(agent_name) = &record.agent_name {
            let agent_path = self
                .root
                .join("agent_logs")
                .join(format!("{}_{}.jsonl", record.conversation_id, agent_name));
            self.append_line(&agent_path, &line).await;
        }
    }

    async fn append_line(&self, path: &Path, line: &str) {
        let mut backoff = self.write_backoff;
        for attempt in 1..=self.write_attempts {
            match write_line(path, line).await {
                Ok(()) => return,
                Err(e) if attempt == self.write_attempts => {
                    eprintln!(
                        "log sink: giving up on {} after {} attempts: {}",
                        path.display(),
                        attempt,
                        e
                    );
                }
                Err(_) => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.write_backoff_cap);
                }
            }
        }
    }
}

async fn write_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::LogRecord;

    fn sink_in(dir: &Path) -> LogSink {
        LogSink::new(&ObservabilityConfig {
            log_dir: dir.to_string_lossy().to_string(),
            ..ObservabilityConfig::default()
        })
    }

    #[tokio::test]
    async fn test_append_writes_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path());

        sink.append(LogRecord::stage_started("C-42", "intake", "normalize", 0))
            .await;

        let agent_file = dir.path().join("agent_logs/C-42_intake.jsonl");
        let conversation_file = dir.path().join("conversation_logs/C-42.jsonl");

        let agent_line = tokio::fs::read_to_string(&agent_file).await.unwrap();
        let conversation_line = tokio::fs::read_to_string(&conversation_file).await.unwrap();

        assert!(agent_line.contains("\"conversation_id\":\"C-42\""));
        assert_eq!(agent_line, conversation_line);
    }

    #[tokio::test]
    async fn test_agentless_record_skips_agent_stream() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path());

        sink.append(LogRecord::submission("C-7", "submitted".to_string()))
            .await;

        assert!(!dir.path().join("agent_logs").exists());
        assert!(dir.path().join("conversation_logs/C-7.jsonl").exists());
    }

    #[tokio::test]
    async fn test_appends_accumulate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path());

        for i in 0..3 {
            sink.append(LogRecord::stage_started("C-9", "solver", "draft", i))
                .await;
        }

        let content = tokio::fs::read_to_string(dir.path().join("conversation_logs/C-9.jsonl"))
            .await
            .unwrap();
        assert_eq!(content.lines().count(), 3);
    }
}
