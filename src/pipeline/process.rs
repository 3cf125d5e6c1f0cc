//! Process layer — named stage factories with reflection.
//!
//! A process is a [`Stage`] constructor that layers bounded retry
//! ("reflection") and a fixed catalogue of shapes on top of the raw stage
//! primitive: pure transforms, async effects, model-backed queries, tool
//! invocations, and conditional wrappers.
//!
//! Reflection is a bounded iteration, never a recursive combinator: a
//! process with `MaxReflections(n)` makes exactly `1 + n` attempts before
//! giving up, rewriting its input between attempts through an `on_failure`
//! callback (identity by default).

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use super::context::PipelineContext;
use super::outcome::Outcome;
use super::stage::{finalize_stage, log_stage_start, Stage};
use crate::observability::{LogRecord, LogSink};
use crate::tools::model::{ModelClient, ModelRequest};
use crate::tools::Tool;
use crate::types::Result;

/// Bounded reflection budget, clamped to `[0, 10]`.
///
/// `0` means one attempt and no retries; `n` means one attempt plus up to
/// `n` reflections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxReflections(u32);

impl MaxReflections {
    pub const NONE: Self = Self(0);

    pub fn new(n: u32) -> Self {
        Self(n.min(10))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Input-rewriting callback invoked between reflection attempts.
pub type OnFailure<A> = Arc<dyn Fn(A, &str) -> A + Send + Sync>;

/// Identity rewrite: retry with the unchanged input.
pub fn retry_same_input<A>() -> OnFailure<A> {
    Arc::new(|input, _| input)
}

/// Pure transform. Fallibility in Rust is explicit, so a pure process
/// cannot fail; use [`try_pure`] for fallible transforms.
pub fn pure<A, B>(name: impl Into<String>, f: impl Fn(A) -> B + Send + Sync + 'static) -> Stage<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let f = Arc::new(f);
    Stage::new(name, move |a: A, ctx: PipelineContext| {
        let f = Arc::clone(&f);
        async move { Outcome::success((*f)(a), ctx) }
    })
    .logged()
}

/// Pure transform whose domain errors become `Failure`.
pub fn try_pure<A, B>(
    name: impl Into<String>,
    f: impl Fn(A) -> Result<B> + Send + Sync + 'static,
) -> Stage<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let f = Arc::new(f);
    Stage::new(name, move |a: A, ctx: PipelineContext| {
        let f = Arc::clone(&f);
        async move {
            match (*f)(a) {
                Ok(b) => Outcome::success(b, ctx),
                Err(e) => Outcome::failure(e.to_string(), ctx),
            }
        }
    })
    .logged()
}

/// Async effect with reflection and the identity rewrite.
pub fn effect<A, B, F, Fut>(
    name: impl Into<String>,
    reflections: MaxReflections,
    body: F,
) -> Stage<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Send + 'static,
    F: Fn(A, PipelineContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B>> + Send + 'static,
{
    effect_with(name, reflections, retry_same_input(), body)
}

/// Async effect with reflection and a custom input rewrite.
pub fn effect_with<A, B, F, Fut>(
    name: impl Into<String>,
    reflections: MaxReflections,
    on_failure: OnFailure<A>,
    body: F,
) -> Stage<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Send + 'static,
    F: Fn(A, PipelineContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B>> + Send + 'static,
{
    let body = Arc::new(move |a: A, ctx: PipelineContext| -> BoxFuture<'static, Result<B>> {
        Box::pin(body(a, ctx))
    });
    with_reflection(name.into(), reflections, on_failure, body)
}

/// Model-backed process: build a prompt from input and context, issue one
/// blocking model call, parse the textual response (with the original input
/// in scope for typed outputs). Reflection re-runs the whole
/// build -> call -> parse sequence.
///
/// When a `sink` is supplied, every completed model call appends an
/// auxiliary observability record (prompt, response, model, latency).
#[allow(clippy::too_many_arguments)]
pub fn model<A, B>(
    name: impl Into<String>,
    reflections: MaxReflections,
    client: Arc<dyn ModelClient>,
    model_id: impl Into<String>,
    build_prompt: impl Fn(&A, &PipelineContext) -> String + Send + Sync + 'static,
    parse: impl Fn(&A, &str) -> Result<B> + Send + Sync + 'static,
    sink: Option<LogSink>,
) -> Stage<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Send + 'static,
{
    let model_id = model_id.into();
    let build_prompt = Arc::new(build_prompt);
    let parse = Arc::new(parse);

    let body = Arc::new(move |a: A, ctx: PipelineContext| -> BoxFuture<'static, Result<B>> {
        let client = Arc::clone(&client);
        let build_prompt = Arc::clone(&build_prompt);
        let parse = Arc::clone(&parse);
        let model_id = model_id.clone();
        let sink = sink.clone();
        Box::pin(async move {
            let prompt = (*build_prompt)(&a, &ctx);
            let response = client
                .generate(ModelRequest {
                    prompt: prompt.clone(),
                    model: model_id.clone(),
                })
                .await?;

            if let Some(sink) = sink {
                let record = LogRecord::model_call(
                    ctx.conversation_id().as_str(),
                    ctx.agent_name().as_str(),
                    &prompt,
                    &response.response,
                    &model_id,
                    response.latency_ms,
                );
                sink.append(record).await;
            }

            (*parse)(&a, &response.response)
        })
    });

    with_reflection(name.into(), reflections, retry_same_input(), body)
}

/// Tool-backed process: convert input into a tool request, invoke the tool,
/// convert its output into `B`. Tool errors become `Failure`; reflection
/// applies to the whole request -> invoke -> convert sequence.
pub fn tool<A, B>(
    name: impl Into<String>,
    reflections: MaxReflections,
    tool: Arc<dyn Tool>,
    to_request: impl Fn(&A) -> Result<serde_json::Value> + Send + Sync + 'static,
    from_output: impl Fn(&A, serde_json::Value) -> Result<B> + Send + Sync + 'static,
) -> Stage<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Send + 'static,
{
    let to_request = Arc::new(to_request);
    let from_output = Arc::new(from_output);

    let body = Arc::new(move |a: A, _ctx: PipelineContext| -> BoxFuture<'static, Result<B>> {
        let tool = Arc::clone(&tool);
        let to_request = Arc::clone(&to_request);
        let from_output = Arc::clone(&from_output);
        Box::pin(async move {
            let request = (*to_request)(&a)?;
            let output = tool.invoke(request).await?;
            (*from_output)(&a, output)
        })
    });

    with_reflection(name.into(), reflections, retry_same_input(), body)
}

/// Conditional wrapper: run `inner` only when the predicate holds,
/// otherwise pass the input through unchanged (no log, no step).
pub fn when<A>(
    name: impl Into<String>,
    predicate: impl Fn(&A) -> bool + Send + Sync + 'static,
    inner: Stage<A, A>,
) -> Stage<A, A>
where
    A: Send + 'static,
{
    let predicate = Arc::new(predicate);
    Stage::new(name, move |a: A, ctx: PipelineContext| {
        let predicate = Arc::clone(&predicate);
        let inner = inner.clone();
        async move {
            if (*predicate)(&a) {
                inner.run(a, ctx).await
            } else {
                Outcome::success(a, ctx)
            }
        }
    })
}

/// The bounded reflection loop shared by all retrying process shapes.
fn with_reflection<A, B>(
    name: String,
    reflections: MaxReflections,
    on_failure: OnFailure<A>,
    body: Arc<dyn Fn(A, PipelineContext) -> BoxFuture<'static, Result<B>> + Send + Sync>,
) -> Stage<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Send + 'static,
{
    let stage_name = name.clone();
    Stage::new(name, move |input: A, ctx: PipelineContext| {
        let body = Arc::clone(&body);
        let on_failure = Arc::clone(&on_failure);
        let name = stage_name.clone();
        async move {
            let started = log_stage_start(&name, &ctx);
            let max = reflections.get();
            let mut current = input;
            let mut attempts: u32 = 0;

            let outcome = loop {
                attempts += 1;
                match (*body)(current.clone(), ctx.clone()).await {
                    Ok(value) => break Outcome::success(value, ctx.clone()),
                    Err(err) => {
                        let message = err.to_string();
                        if attempts > max {
                            break Outcome::failure(
                                format!("max reflections ({}) exceeded: {}", max, message),
                                ctx.clone(),
                            );
                        }
                        tracing::warn!(
                            stage = %name,
                            attempt = attempts,
                            error = %message,
                            "stage attempt failed, reflecting"
                        );
                        current = (*on_failure)(current, &message);
                    }
                }
            };

            finalize_stage(&name, started, attempts - 1, outcome)
        }
    })
}
