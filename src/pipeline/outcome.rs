//! Three-valued stage outcome.
//!
//! Every stage produces exactly one `Outcome` variant. `Failure` and
//! `Rejected` are distinct on purpose: downstream agents react differently
//! to a crashed pipeline than to a guardrail block, and the wire format
//! keeps them apart end to end.

use super::context::PipelineContext;

/// Result of running one stage (or a whole composed pipeline).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<A> {
    /// The stage produced a value.
    Success { value: A, ctx: PipelineContext },

    /// The stage failed after its retries were exhausted.
    Failure { error: String, ctx: PipelineContext },

    /// A safety policy blocked the value.
    Rejected {
        policy: String,
        reason: String,
        ctx: PipelineContext,
    },
}

impl<A> Outcome<A> {
    pub fn success(value: A, ctx: PipelineContext) -> Self {
        Self::Success { value, ctx }
    }

    pub fn failure(error: impl Into<String>, ctx: PipelineContext) -> Self {
        Self::Failure {
            error: error.into(),
            ctx,
        }
    }

    pub fn rejected(
        policy: impl Into<String>,
        reason: impl Into<String>,
        ctx: PipelineContext,
    ) -> Self {
        Self::Rejected {
            policy: policy.into(),
            reason: reason.into(),
            ctx,
        }
    }

    /// Apply `f` inside `Success`; `Failure` and `Rejected` pass through
    /// with payload and context untouched.
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Outcome<B> {
        match self {
            Self::Success { value, ctx } => Outcome::Success {
                value: f(value),
                ctx,
            },
            Self::Failure { error, ctx } => Outcome::Failure { error, ctx },
            Self::Rejected { policy, reason, ctx } => Outcome::Rejected { policy, reason, ctx },
        }
    }

    /// Sequence a computation in the `Success` branch only; the other two
    /// variants short-circuit.
    pub fn and_then<B>(self, f: impl FnOnce(A, PipelineContext) -> Outcome<B>) -> Outcome<B> {
        match self {
            Self::Success { value, ctx } => f(value, ctx),
            Self::Failure { error, ctx } => Outcome::Failure { error, ctx },
            Self::Rejected { policy, reason, ctx } => Outcome::Rejected { policy, reason, ctx },
        }
    }

    /// Uniform context accessor, regardless of variant.
    pub fn context(&self) -> &PipelineContext {
        match self {
            Self::Success { ctx, .. } | Self::Failure { ctx, .. } | Self::Rejected { ctx, .. } => {
                ctx
            }
        }
    }

    /// Consume the outcome, returning only its context.
    pub fn into_context(self) -> PipelineContext {
        match self {
            Self::Success { ctx, .. } | Self::Failure { ctx, .. } | Self::Rejected { ctx, .. } => {
                ctx
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
            Self::Rejected { .. } => "rejected",
        }
    }
}
