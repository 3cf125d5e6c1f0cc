//! Phantom-typed agent builder.
//!
//! The builder tracks three independent facts in its type: whether the
//! input binding is set, whether the pipeline is set, and whether the
//! output binding (stream or terminal marker) is set. `build` exists only
//! on the fully-configured type, so an incomplete or doubly-configured
//! agent does not compile. No runtime validation is needed.

use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{
    propagate_upstream, AgentDefinition, Decoder, Encoder, OutputBinding, UpstreamHandler,
};
use crate::guardrail::{self, GuardrailEngine};
use crate::pipeline::Stage;
use crate::types::AgentName;

/// Typestate marker: the piece has not been provided yet.
#[derive(Debug)]
pub struct Missing;

/// Typestate marker: the piece is in place.
#[derive(Debug)]
pub struct Set;

/// Fluent agent assembler. Type parameters `In`, `Pipe`, `Out` are the
/// typestate markers for the input binding, the pipeline, and the output
/// binding respectively.
pub struct AgentBuilder<I, O, In, Pipe, Out> {
    name: AgentName,
    decoder: Option<Decoder<I>>,
    pipeline: Option<Stage<I, O>>,
    output: Option<OutputBinding<O>>,
    upstream: Option<UpstreamHandler<I>>,
    guardrail: Option<Arc<GuardrailEngine>>,
    _state: PhantomData<(In, Pipe, Out)>,
}

impl<I, O, In, Pipe, Out> std::fmt::Debug for AgentBuilder<I, O, In, Pipe, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("name", &self.name)
            .field("has_decoder", &self.decoder.is_some())
            .field("has_pipeline", &self.pipeline.is_some())
            .field("has_output", &self.output.is_some())
            .finish()
    }
}

impl<I, O> AgentBuilder<I, O, Missing, Missing, Missing> {
    pub fn new(name: AgentName) -> Self {
        Self {
            name,
            decoder: None,
            pipeline: None,
            output: None,
            upstream: None,
            guardrail: None,
            _state: PhantomData,
        }
    }
}

impl<I, O, In, Pipe, Out> AgentBuilder<I, O, In, Pipe, Out> {
    fn transition<In2, Pipe2, Out2>(self) -> AgentBuilder<I, O, In2, Pipe2, Out2> {
        AgentBuilder {
            name: self.name,
            decoder: self.decoder,
            pipeline: self.pipeline,
            output: self.output,
            upstream: self.upstream,
            guardrail: self.guardrail,
            _state: PhantomData,
        }
    }

    /// React to upstream failure/rejection envelopes. Optional; the default
    /// is the standard propagation handler.
    pub fn on_upstream(mut self, handler: UpstreamHandler<I>) -> Self {
        self.upstream = Some(handler);
        self
    }
}

impl<I, O, Pipe, Out> AgentBuilder<I, O, Missing, Pipe, Out> {
    /// Bind the input stream (derived from the agent name) with a payload
    /// decoder. Exactly once.
    pub fn input(mut self, decoder: Decoder<I>) -> AgentBuilder<I, O, Set, Pipe, Out> {
        self.decoder = Some(decoder);
        self.transition()
    }
}

impl<I, O, In, Out> AgentBuilder<I, O, In, Missing, Out> {
    /// Install the composed pipeline. Exactly once; compose stages with
    /// `then` before handing them in.
    pub fn pipeline(mut self, stage: Stage<I, O>) -> AgentBuilder<I, O, In, Set, Out> {
        self.pipeline = Some(stage);
        self.transition()
    }
}

impl<I, O, In, Pipe> AgentBuilder<I, O, In, Pipe, Missing> {
    /// Bind the output stream of a non-terminal agent. Mutually exclusive
    /// with [`terminal`](Self::terminal).
    pub fn output_to(
        mut self,
        to: AgentName,
        encoder: Encoder<O>,
    ) -> AgentBuilder<I, O, In, Pipe, Set> {
        self.output = Some(OutputBinding::Stream { to, encoder });
        self.transition()
    }

    /// Mark this agent terminal; the encoder feeds the observability sink
    /// only.
    pub fn terminal(mut self, encoder: Encoder<O>) -> AgentBuilder<I, O, In, Pipe, Set> {
        self.output = Some(OutputBinding::Terminal { encoder });
        self.transition()
    }
}

impl<I, O> AgentBuilder<I, O, Set, Set, Set>
where
    I: Send + 'static,
    O: Serialize + Send + 'static,
{
    /// Append a guardrail stage after the pipeline. An engine with no
    /// policies is skipped entirely (identity).
    pub fn guardrail(mut self, engine: Arc<GuardrailEngine>) -> Self {
        self.guardrail = Some(engine);
        self
    }

    /// Produce the immutable definition. Only callable when input,
    /// pipeline, and output are all configured.
    pub fn build(self) -> AgentDefinition<I, O> {
        // Unwraps are justified by the typestate: every Set marker was
        // produced by the method that filled the corresponding field.
        #[allow(clippy::unwrap_used)]
        let (decoder, pipeline, output) = (
            self.decoder.unwrap(),
            self.pipeline.unwrap(),
            self.output.unwrap(),
        );

        let pipeline = match self.guardrail {
            Some(engine) if !engine.is_empty() => pipeline.then(guardrail::stage(engine)),
            _ => pipeline,
        };

        let input_stream = self.name.task_stream();
        AgentDefinition {
            name: self.name,
            input_stream,
            decoder,
            pipeline,
            output,
            upstream: self.upstream.unwrap_or_else(propagate_upstream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{json_decoder, json_encoder};
    use crate::guardrail::GuardrailPolicy;
    use crate::pipeline::{process, Outcome, PipelineContext};
    use crate::types::{ConversationId, TraceId};

    fn name(s: &str) -> AgentName {
        AgentName::from_string(s.to_string()).unwrap()
    }

    fn ctx(agent: &str) -> PipelineContext {
        PipelineContext::initial(name(agent), TraceId::new(), ConversationId::new())
    }

    #[test]
    fn test_terminal_agent_builds() {
        let agent = AgentBuilder::<String, String, _, _, _>::new(name("presenter"))
            .input(json_decoder())
            .pipeline(process::pure("upper", |s: String| s.to_uppercase()))
            .terminal(json_encoder())
            .build();

        assert!(agent.is_terminal());
        assert_eq!(agent.input_stream(), "agent_presenter_tasks");
        assert!(agent.output_stream().is_none());
    }

    #[test]
    fn test_non_terminal_agent_routes_by_convention() {
        let agent = AgentBuilder::<String, String, _, _, _>::new(name("intake"))
            .input(json_decoder())
            .pipeline(process::pure("id", |s: String| s))
            .output_to(name("solver"), json_encoder())
            .build();

        assert!(!agent.is_terminal());
        assert_eq!(agent.output_stream().as_deref(), Some("agent_solver_tasks"));
    }

    #[tokio::test]
    async fn test_guardrail_appended_after_pipeline() {
        let engine = Arc::new(GuardrailEngine::new(vec![GuardrailPolicy {
            name: "no_shouting".to_string(),
            blocked_terms: vec!["LOUD".to_string()],
            reason: "too loud".to_string(),
        }]));

        let agent = AgentBuilder::<String, String, _, _, _>::new(name("presenter"))
            .input(json_decoder())
            .pipeline(process::pure("upper", |s: String| s.to_uppercase()))
            .terminal(json_encoder())
            .guardrail(engine)
            .build();

        let outcome = agent
            .pipeline()
            .run("loud noises".to_string(), ctx("presenter"))
            .await;
        match outcome {
            Outcome::Rejected { policy, .. } => assert_eq!(policy, "no_shouting"),
            other => panic!("expected rejection, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_empty_guardrail_engine_is_identity() {
        let agent = AgentBuilder::<String, String, _, _, _>::new(name("presenter"))
            .input(json_decoder())
            .pipeline(process::pure("id", |s: String| s))
            .terminal(json_encoder())
            .guardrail(Arc::new(GuardrailEngine::default()))
            .build();

        let outcome = agent.pipeline().run("hi".to_string(), ctx("presenter")).await;
        match outcome {
            Outcome::Success { ctx, .. } => assert_eq!(ctx.step_index(), 1),
            other => panic!("expected success, got {}", other.label()),
        }
    }
}
