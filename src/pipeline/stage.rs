//! Stage — the atomic composable pipeline unit.
//!
//! A `Stage<A, B>` is a named async function `(A, PipelineContext) -> Outcome<B>`
//! that never panics outward; all domain faults are encoded into the outcome.
//! Stages compose with [`Stage::then`], which short-circuits on any
//! non-`Success` outcome. Composition is associative and `Stage::identity`
//! is a two-sided identity.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::context::{PipelineContext, StageStatus};
use super::outcome::Outcome;

type RunFn<A, B> = dyn Fn(A, PipelineContext) -> BoxFuture<'static, Outcome<B>> + Send + Sync;

/// A named unit `(A, PipelineContext) -> Outcome<B>`.
pub struct Stage<A, B> {
    name: String,
    run: Arc<RunFn<A, B>>,
}

impl<A, B> Clone for Stage<A, B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: Arc::clone(&self.run),
        }
    }
}

impl<A, B> std::fmt::Debug for Stage<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}

impl<A, B> Stage<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    /// Raw constructor: no logging, no step accounting. The process layer
    /// and [`Stage::logged`] add those.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A, PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<B>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(move |a, ctx| Box::pin(f(a, ctx))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute the stage.
    pub async fn run(&self, input: A, ctx: PipelineContext) -> Outcome<B> {
        (*self.run)(input, ctx).await
    }

    /// Compose: run `self`, then feed a `Success` value into `next`.
    /// `Failure` and `Rejected` short-circuit; `next` is never invoked.
    pub fn then<C>(self, next: Stage<B, C>) -> Stage<A, C>
    where
        C: Send + 'static,
    {
        let name = format!("{} -> {}", self.name, next.name);
        let first = self.run;
        let second = next.run;
        Stage {
            name,
            run: Arc::new(move |a, ctx| {
                let first = Arc::clone(&first);
                let second = Arc::clone(&second);
                Box::pin(async move {
                    match (*first)(a, ctx).await {
                        Outcome::Success { value, ctx } => (*second)(value, ctx).await,
                        Outcome::Failure { error, ctx } => Outcome::Failure { error, ctx },
                        Outcome::Rejected { policy, reason, ctx } => {
                            Outcome::Rejected { policy, reason, ctx }
                        }
                    }
                })
            }),
        }
    }

    /// Transform only the `Success` payload; other variants pass through.
    pub fn map<C>(self, f: impl Fn(B) -> C + Send + Sync + 'static) -> Stage<A, C>
    where
        C: Send + 'static,
    {
        let name = self.name;
        let inner = self.run;
        let f = Arc::new(f);
        Stage {
            name,
            run: Arc::new(move |a, ctx| {
                let inner = Arc::clone(&inner);
                let f = Arc::clone(&f);
                Box::pin(async move { (*inner)(a, ctx).await.map(|b| (*f)(b)) })
            }),
        }
    }

    /// Wrap with the logging wrapper: emits one-line start/finish records,
    /// appends a `StageLog`, and advances the step index — for every
    /// terminal state, so the final index counts executed stages.
    pub fn logged(self) -> Stage<A, B> {
        let name = self.name.clone();
        let inner = self.run;
        Stage {
            name: name.clone(),
            run: Arc::new(move |a, ctx| {
                let inner = Arc::clone(&inner);
                let name = name.clone();
                Box::pin(async move {
                    let started = log_stage_start(&name, &ctx);
                    let outcome = (*inner)(a, ctx).await;
                    finalize_stage(&name, started, 0, outcome)
                })
            }),
        }
    }
}

impl<A> Stage<A, A>
where
    A: Send + 'static,
{
    /// Pass-through stage: returns its input unchanged, records nothing.
    pub fn identity() -> Self {
        Stage::new("identity", |a, ctx| async move { Outcome::success(a, ctx) })
    }
}

/// Emit the stage-start line and capture the start instant.
pub(crate) fn log_stage_start(name: &str, ctx: &PipelineContext) -> Instant {
    tracing::info!(
        conversation_id = %ctx.conversation_id(),
        agent = %ctx.agent_name(),
        stage = name,
        step = ctx.step_index(),
        "stage started"
    );
    Instant::now()
}

/// Emit the stage-finish line and fold the stage record into the outcome's
/// context. Shared by [`Stage::logged`] and the process layer (which supplies
/// a real reflection count).
pub(crate) fn finalize_stage<B>(
    name: &str,
    started: Instant,
    reflections_used: u32,
    outcome: Outcome<B>,
) -> Outcome<B> {
    let duration = started.elapsed();
    let status = match &outcome {
        Outcome::Success { .. } => StageStatus::Success,
        Outcome::Failure { error, .. } => StageStatus::Failure(error.clone()),
        Outcome::Rejected { policy, reason, .. } => {
            StageStatus::Rejected(format!("{}: {}", policy, reason))
        }
    };
    tracing::info!(
        conversation_id = %outcome.context().conversation_id(),
        agent = %outcome.context().agent_name(),
        stage = name,
        step = outcome.context().step_index(),
        outcome = outcome.label(),
        duration_ms = duration.as_millis() as u64,
        "stage finished"
    );
    match outcome {
        Outcome::Success { value, ctx } => Outcome::Success {
            value,
            ctx: ctx.record_stage(name, duration, reflections_used, status),
        },
        Outcome::Failure { error, ctx } => Outcome::Failure {
            error,
            ctx: ctx.record_stage(name, duration, reflections_used, status),
        },
        Outcome::Rejected { policy, reason, ctx } => Outcome::Rejected {
            policy,
            reason,
            ctx: ctx.record_stage(name, duration, reflections_used, status),
        },
    }
}
