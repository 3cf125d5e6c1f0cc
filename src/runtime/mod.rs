//! Agent runtime — the broker consumer loop.
//!
//! One runtime per agent process. The consumer loop pulls single messages,
//! spawns an independent task per delivery (bounded by broker prefetch),
//! and never blocks on a message's pipeline. Conversation and trace ids
//! are copied verbatim from the inbound envelope to the outbound one.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentDefinition, OutputBinding, UpstreamNotice, UpstreamReaction};
use crate::broker::{retry_fixed, Broker, Delivery};
use crate::envelope::{self, Envelope, InboundPayload, PayloadKind};
use crate::observability::{LogRecord, LogSink};
use crate::pipeline::{Outcome, PipelineContext};
use crate::submit::{TerminalReport, TerminalResults};
use crate::types::{BrokerConfig, ConversationId, Error, Result, TraceId};

/// Long-running consumer for one agent.
pub struct AgentRuntime<I, O> {
    definition: Arc<AgentDefinition<I, O>>,
    broker: Arc<dyn Broker>,
    sink: LogSink,
    config: BrokerConfig,
    terminal_results: Option<TerminalResults>,
    cancel: CancellationToken,
}

impl<I, O> std::fmt::Debug for AgentRuntime<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agent", self.definition.name())
            .finish()
    }
}

impl<I, O> AgentRuntime<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(
        definition: AgentDefinition<I, O>,
        broker: Arc<dyn Broker>,
        sink: LogSink,
        config: BrokerConfig,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            broker,
            sink,
            config,
            terminal_results: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the supervised terminal-results handle (terminal agents).
    pub fn with_terminal_results(mut self, results: TerminalResults) -> Self {
        self.terminal_results = Some(results);
        self
    }

    /// Token that interrupts the consume loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled. Declares streams, then pulls messages forever,
    /// one task per delivery. In-flight tasks are drained on shutdown.
    pub async fn run(self) -> Result<()> {
        let input_stream = self.definition.input_stream().to_string();

        // Startup: bounded connect/declare retries with fixed spacing.
        retry_fixed(
            self.config.connect_attempts,
            self.config.connect_spacing,
            "declare input stream",
            || self.broker.ensure_stream(&input_stream),
        )
        .await?;

        if let Some(output_stream) = self.definition.output_stream() {
            retry_fixed(
                self.config.connect_attempts,
                self.config.connect_spacing,
                "declare output stream",
                || self.broker.ensure_stream(&output_stream),
            )
            .await?;
        }

        tracing::info!(
            agent = %self.definition.name(),
            input = %input_stream,
            terminal = self.definition.is_terminal(),
            prefetch = self.config.prefetch,
            "agent runtime started"
        );

        let prefetch = Arc::new(Semaphore::new(self.config.prefetch.max(1)));
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(agent = %self.definition.name(), error = %e, "message task aborted");
                    }
                }

                permit = Arc::clone(&prefetch).acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    match self.broker.pull(&input_stream).await {
                        Ok(Some(delivery)) => {
                            let worker = MessageWorker {
                                definition: Arc::clone(&self.definition),
                                broker: Arc::clone(&self.broker),
                                sink: self.sink.clone(),
                                config: self.config.clone(),
                                terminal_results: self.terminal_results.clone(),
                            };
                            tasks.spawn(async move {
                                worker.handle(delivery).await;
                                drop(permit);
                            });
                        }
                        Ok(None) => {
                            drop(permit);
                            tokio::time::sleep(self.config.idle_sleep).await;
                        }
                        Err(e) => {
                            drop(permit);
                            tracing::warn!(agent = %self.definition.name(), error = %e, "pull failed");
                            tokio::time::sleep(self.config.idle_sleep).await;
                        }
                    }
                }
            }
        }

        tracing::info!(
            agent = %self.definition.name(),
            in_flight = tasks.len(),
            "agent runtime shutting down"
        );
        while tasks.join_next().await.is_some() {}
        Ok(())
    }
}

/// Everything a message task needs, cloned out of the runtime.
struct MessageWorker<I, O> {
    definition: Arc<AgentDefinition<I, O>>,
    broker: Arc<dyn Broker>,
    sink: LogSink,
    config: BrokerConfig,
    terminal_results: Option<TerminalResults>,
}

impl<I, O> MessageWorker<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    async fn handle(&self, delivery: Delivery) {
        let inbound = match envelope::decode(&delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(
                    agent = %self.definition.name(),
                    error = %e,
                    "inbound envelope undecodable, dropping"
                );
                self.nack_quietly(&delivery).await;
                return;
            }
        };

        let ctx = match self.initial_context(&inbound) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(agent = %self.definition.name(), error = %e, "bad envelope identity");
                self.nack_quietly(&delivery).await;
                return;
            }
        };

        let outcome = match self.resolve_input(&inbound, ctx) {
            ResolvedInput::Run(input, ctx) => {
                let pipeline = self.definition.pipeline().clone();
                let boundary_ctx = ctx.clone();
                match tokio::spawn(async move { pipeline.run(input, ctx).await }).await {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        // Task boundary: a panicking stage becomes a Failure
                        // outcome and travels downstream like any other; the
                        // consumer loop is untouched.
                        tracing::error!(
                            agent = %self.definition.name(),
                            conversation_id = %inbound.conversation_id,
                            error = %join_error,
                            "pipeline task panicked"
                        );
                        Outcome::failure(
                            format!("pipeline task panicked: {}", join_error),
                            boundary_ctx,
                        )
                    }
                }
            }
            ResolvedInput::Immediate(outcome) => outcome,
        };

        self.record_message(&inbound, &outcome).await;

        let published = if self.definition.is_terminal() {
            self.finish_terminal(&inbound, outcome).await;
            true
        } else {
            self.publish_downstream(&inbound, outcome).await
        };

        if published {
            if let Err(e) = self.broker.ack(&delivery).await {
                tracing::error!(agent = %self.definition.name(), error = %e, "ack failed");
            }
        } else {
            self.nack_quietly(&delivery).await;
        }
    }

    fn initial_context(&self, inbound: &Envelope) -> Result<PipelineContext> {
        let trace_id = TraceId::from_string(inbound.trace_id.clone())
            .map_err(Error::decode)?;
        let conversation_id = ConversationId::from_string(inbound.conversation_id.clone())
            .map_err(Error::decode)?;
        Ok(PipelineContext::initial(
            self.definition.name().clone(),
            trace_id,
            conversation_id,
        ))
    }

    /// Decode the payload (or dispatch an upstream notice) into either a
    /// pipeline input or an immediate outcome.
    fn resolve_input(&self, inbound: &Envelope, ctx: PipelineContext) -> ResolvedInput<I, O> {
        let payload = match inbound.inbound_payload() {
            Ok(payload) => payload,
            Err(e) => {
                return ResolvedInput::Immediate(Outcome::failure(
                    format!("Failed to decode input: {}", e),
                    ctx,
                ))
            }
        };

        match payload {
            InboundPayload::Normal(value) => match self.definition.decode_input(&value) {
                Ok(input) => ResolvedInput::Run(input, ctx),
                Err(e) => ResolvedInput::Immediate(Outcome::failure(
                    format!("Failed to decode input: {}", e),
                    ctx,
                )),
            },
            InboundPayload::Failure(failure) => {
                self.react(UpstreamNotice::Failure(failure), ctx)
            }
            InboundPayload::Rejection(rejection) => {
                self.react(UpstreamNotice::Rejection(rejection), ctx)
            }
        }
    }

    fn react(&self, notice: UpstreamNotice, ctx: PipelineContext) -> ResolvedInput<I, O> {
        match self.definition.react_upstream(notice) {
            UpstreamReaction::Continue(input) => ResolvedInput::Run(input, ctx),
            UpstreamReaction::Fail(error) => {
                ResolvedInput::Immediate(Outcome::failure(error, ctx))
            }
            UpstreamReaction::Reject { policy, reason } => {
                ResolvedInput::Immediate(Outcome::rejected(policy, reason, ctx))
            }
        }
    }

    /// Per-stage and per-message records, plus the one-line summary.
    async fn record_message(&self, inbound: &Envelope, outcome: &Outcome<O>) {
        let agent = self.definition.name().as_str();
        let conversation = inbound.conversation_id.as_str();
        let ctx = outcome.context();

        for log in ctx.step_logs() {
            self.sink
                .append(LogRecord::stage_started(
                    conversation,
                    agent,
                    &log.stage_name,
                    log.stage_index,
                ))
                .await;
            self.sink
                .append(LogRecord::stage_finished(conversation, agent, log))
                .await;
        }

        self.sink
            .append(LogRecord::message_summary(
                conversation,
                agent,
                outcome.label(),
                ctx.timing_summary(),
            ))
            .await;

        tracing::info!(
            agent,
            conversation_id = conversation,
            outcome = outcome.label(),
            stages = ctx.step_logs().len(),
            "message processed"
        );
    }

    /// Build and publish the outbound envelope. Returns false when the
    /// message must be negative-acked instead.
    async fn publish_downstream(&self, inbound: &Envelope, outcome: Outcome<O>) -> bool {
        let OutputBinding::Stream { to, .. } = self.definition.output() else {
            return true;
        };

        let from = self.definition.name().to_string();
        let (payload_type, payload) = match outcome {
            Outcome::Success { value, .. } => match self.definition.output().encode(&value) {
                Ok(payload) => (PayloadKind::Normal, payload),
                Err(e) => {
                    tracing::error!(agent = %from, error = %e, "output encoding failed");
                    (
                        PayloadKind::UpstreamFailure,
                        envelope::payload_or_string(&crate::envelope::UpstreamFailure {
                            from_agent: from.clone(),
                            error: format!("output encoding failed: {}", e),
                        }),
                    )
                }
            },
            Outcome::Failure { error, .. } => (
                PayloadKind::UpstreamFailure,
                envelope::payload_or_string(&crate::envelope::UpstreamFailure {
                    from_agent: from.clone(),
                    error,
                }),
            ),
            Outcome::Rejected { policy, reason, .. } => (
                PayloadKind::UpstreamRejection,
                envelope::payload_or_string(&crate::envelope::UpstreamRejection {
                    from_agent: from.clone(),
                    guardrail_name: policy,
                    reason,
                }),
            ),
        };

        let outbound = Envelope {
            from_agent: from,
            to_agent: to.to_string(),
            trace_id: inbound.trace_id.clone(),
            conversation_id: inbound.conversation_id.clone(),
            payload_type,
            payload,
        };

        let bytes = match envelope::encode(&outbound) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(agent = %self.definition.name(), error = %e, "outbound encode failed");
                return false;
            }
        };

        let stream = to.task_stream();
        let publish = retry_fixed(
            self.config.publish_attempts,
            self.config.connect_spacing,
            "publish",
            || self.broker.publish(&stream, bytes.clone()),
        )
        .await;

        match publish {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    agent = %self.definition.name(),
                    stream = %stream,
                    error = %e,
                    "publish failed, dropping message"
                );
                false
            }
        }
    }

    /// Terminal agent: write the report to the observability sink and the
    /// supervised results handle.
    async fn finish_terminal(&self, inbound: &Envelope, outcome: Outcome<O>) {
        let OutputBinding::Terminal { .. } = self.definition.output() else {
            return;
        };

        let report = match outcome {
            Outcome::Success { value, .. } => match self.definition.output().encode(&value) {
                Ok(payload) => TerminalReport::Success { payload },
                Err(e) => TerminalReport::Failure {
                    error: format!("output encoding failed: {}", e),
                },
            },
            Outcome::Failure { error, .. } => TerminalReport::Failure { error },
            Outcome::Rejected { policy, reason, .. } => {
                TerminalReport::Rejected { policy, reason }
            }
        };

        self.sink
            .append(LogRecord::terminal_output(
                &inbound.conversation_id,
                self.definition.name().as_str(),
                report.describe(),
            ))
            .await;

        if let Some(results) = &self.terminal_results {
            results.record(&inbound.conversation_id, report).await;
        }
    }

    async fn nack_quietly(&self, delivery: &Delivery) {
        if let Err(e) = self.broker.nack(delivery, false).await {
            tracing::error!(agent = %self.definition.name(), error = %e, "nack failed");
        }
    }
}

enum ResolvedInput<I, O> {
    Run(I, PipelineContext),
    Immediate(Outcome<O>),
}
