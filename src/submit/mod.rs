//! Submitter — injects a conversation into the topology and collects the
//! terminal report.
//!
//! Terminal results live in a supervised handle owned at the submitter's
//! root and passed explicitly to the terminal agent's runtime; there is no
//! global cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use crate::broker::Broker;
use crate::envelope::{self, Envelope};
use crate::observability::{LogRecord, LogSink};
use crate::types::{AgentName, ConversationId, Result, TraceId};

/// What a terminal agent produced for one conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalReport {
    Success { payload: serde_json::Value },
    Failure { error: String },
    Rejected { policy: String, reason: String },
}

impl TerminalReport {
    /// Single-line description for log records.
    pub fn describe(&self) -> String {
        match self {
            Self::Success { payload } => format!("final output: {}", payload),
            Self::Failure { error } => format!("failed: {}", error),
            Self::Rejected { policy, reason } => {
                format!("rejected by {}: {}", policy, reason)
            }
        }
    }

    /// User-visible labelled block distinguishing the three outcomes.
    pub fn render_block(&self) -> String {
        match self {
            Self::Success { payload } => {
                let body = serde_json::to_string_pretty(payload)
                    .unwrap_or_else(|_| payload.to_string());
                format!(
                    "==================== RESULT ====================\n\
                     {}\n\
                     ================================================",
                    body
                )
            }
            Self::Failure { error } => format!(
                "==================== FAILED ====================\n\
                 error: {}\n\
                 ================================================",
                error
            ),
            Self::Rejected { policy, reason } => format!(
                "=================== REJECTED ===================\n\
                 guardrail: {}\n\
                 reason: {}\n\
                 ================================================",
                policy, reason
            ),
        }
    }
}

/// Supervised handle to terminal results, shared between the terminal
/// agent's runtime (writer) and the submitter (reader).
#[derive(Debug, Clone, Default)]
pub struct TerminalResults {
    reports: Arc<Mutex<HashMap<String, TerminalReport>>>,
    notify: Arc<Notify>,
}

impl TerminalResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a conversation's terminal report and wake waiters.
    pub async fn record(&self, conversation_id: &str, report: TerminalReport) {
        self.reports
            .lock()
            .await
            .insert(conversation_id.to_string(), report);
        self.notify.notify_waiters();
    }

    /// Non-blocking lookup.
    pub async fn get(&self, conversation_id: &str) -> Option<TerminalReport> {
        self.reports.lock().await.get(conversation_id).cloned()
    }

    /// Wait until the conversation's report arrives or the timeout expires.
    pub async fn wait_for(
        &self,
        conversation_id: &str,
        timeout: Duration,
    ) -> Option<TerminalReport> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(report) = self.get(conversation_id).await {
                return Some(report);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return None,
            }
        }
    }
}

/// Command-line submitter: builds the initial envelope and publishes it to
/// the entry agent's stream.
pub struct Submitter {
    broker: Arc<dyn Broker>,
    sink: LogSink,
    results: TerminalResults,
    entry: AgentName,
    identity: AgentName,
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("entry", &self.entry)
            .finish()
    }
}

impl Submitter {
    pub fn new(
        broker: Arc<dyn Broker>,
        sink: LogSink,
        results: TerminalResults,
        entry: AgentName,
    ) -> Self {
        Self {
            broker,
            sink,
            results,
            entry,
            // from_agent on the initial envelope; not a running agent
            identity: AgentName::from_string("submit".to_string())
                .unwrap_or_else(|_| unreachable!()),
        }
    }

    /// Publish a fresh conversation carrying `payload` to the entry agent.
    pub async fn submit(
        &self,
        payload: serde_json::Value,
    ) -> Result<(ConversationId, TraceId)> {
        let conversation_id = ConversationId::new();
        let trace_id = TraceId::new();

        let message = Envelope::normal(
            &self.identity,
            &self.entry,
            &trace_id,
            &conversation_id,
            payload,
        );
        let bytes = envelope::encode(&message)?;

        let stream = self.entry.task_stream();
        self.broker.ensure_stream(&stream).await?;
        self.broker.publish(&stream, bytes).await?;

        self.sink
            .append(LogRecord::submission(
                conversation_id.as_str(),
                format!("submitted to {}", stream),
            ))
            .await;

        Ok((conversation_id, trace_id))
    }

    /// Wait for the conversation's terminal report.
    pub async fn await_report(
        &self,
        conversation_id: &ConversationId,
        timeout: Duration,
    ) -> Option<TerminalReport> {
        self.results.wait_for(conversation_id.as_str(), timeout).await
    }
}
