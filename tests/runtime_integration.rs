//! Runtime integration tests — agents over the in-memory broker, end to end.

use std::sync::Arc;
use std::time::Duration;

use courier_core::agent::{json_decoder, json_encoder, AgentBuilder};
use courier_core::agents::{self, AgentStack};
use courier_core::broker::{Broker, Delivery, InMemoryBroker};
use courier_core::envelope::{self, Envelope, PayloadKind};
use courier_core::guardrail::{GuardrailEngine, GuardrailPolicy};
use courier_core::observability::LogSink;
use courier_core::pipeline::process;
use courier_core::registry::{open_in_memory, PromptRegistry};
use courier_core::runtime::AgentRuntime;
use courier_core::submit::{Submitter, TerminalReport, TerminalResults};
use courier_core::tools::{ScriptedModel, SubprocessTool};
use courier_core::types::{
    AgentName, BrokerConfig, ConversationId, ObservabilityConfig, TraceId,
};
use tokio_util::sync::CancellationToken;

fn name(s: &str) -> AgentName {
    AgentName::from_string(s.to_string()).unwrap()
}

fn fast_broker_config() -> BrokerConfig {
    BrokerConfig {
        idle_sleep: Duration::from_millis(10),
        connect_spacing: Duration::from_millis(10),
        ..BrokerConfig::default()
    }
}

fn sink_in(dir: &tempfile::TempDir) -> LogSink {
    LogSink::new(&ObservabilityConfig {
        log_dir: dir.path().to_string_lossy().to_string(),
        ..ObservabilityConfig::default()
    })
}

/// Pull from a stream until a message arrives or the timeout expires.
async fn pull_one(broker: &InMemoryBroker, stream: &str, timeout: Duration) -> Option<Delivery> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(Some(delivery)) = broker.pull(stream).await {
            return Some(delivery);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Spawn an echo agent `name` that uppercases a string payload and forwards
/// it to `next`. Returns the cancellation token.
fn spawn_echo_agent(
    agent: &str,
    next: &str,
    broker: Arc<InMemoryBroker>,
    sink: LogSink,
) -> CancellationToken {
    let definition = AgentBuilder::<String, String, _, _, _>::new(name(agent))
        .input(json_decoder())
        .pipeline(process::pure("upper", |s: String| s.to_uppercase()))
        .output_to(name(next), json_encoder())
        .build();

    let runtime = AgentRuntime::new(definition, broker, sink, fast_broker_config());
    let cancel = runtime.cancellation_token();
    tokio::spawn(runtime.run());
    cancel
}

#[tokio::test]
async fn test_conversation_and_trace_ids_propagate() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(InMemoryBroker::new());
    let cancel = spawn_echo_agent("echo", "downstream", broker.clone(), sink_in(&dir));

    let conversation = ConversationId::from_string("C-42".to_string()).unwrap();
    let trace = TraceId::from_string("T-7".to_string()).unwrap();
    let inbound = Envelope::normal(
        &name("submit"),
        &name("echo"),
        &trace,
        &conversation,
        serde_json::json!("hello"),
    );

    broker.ensure_stream("agent_echo_tasks").await.unwrap();
    broker
        .publish("agent_echo_tasks", envelope::encode(&inbound).unwrap())
        .await
        .unwrap();

    let delivery = pull_one(&broker, "agent_downstream_tasks", Duration::from_secs(5))
        .await
        .expect("no downstream message");
    let outbound = envelope::decode(&delivery.body).unwrap();

    assert_eq!(outbound.conversation_id, "C-42");
    assert_eq!(outbound.trace_id, "T-7");
    assert_eq!(outbound.from_agent, "echo");
    assert_eq!(outbound.to_agent, "downstream");
    assert_eq!(outbound.payload_type, PayloadKind::Normal);
    assert_eq!(outbound.payload, serde_json::json!("HELLO"));

    // observability stream files carry the conversation id
    let agent_log = dir.path().join("agent_logs/C-42_echo.jsonl");
    let conversation_log = dir.path().join("conversation_logs/C-42.jsonl");
    assert!(agent_log.exists(), "missing {}", agent_log.display());
    assert!(conversation_log.exists());

    cancel.cancel();
}

#[tokio::test]
async fn test_failure_becomes_upstream_failure_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(InMemoryBroker::new());

    let definition = AgentBuilder::<String, String, _, _, _>::new(name("crasher"))
        .input(json_decoder())
        .pipeline(process::try_pure("explode", |_: String| {
            Err::<String, _>(courier_core::Error::internal("boom"))
        }))
        .output_to(name("downstream"), json_encoder())
        .build();
    let runtime = AgentRuntime::new(definition, broker.clone(), sink_in(&dir), fast_broker_config());
    let cancel = runtime.cancellation_token();
    tokio::spawn(runtime.run());

    let inbound = Envelope::normal(
        &name("submit"),
        &name("crasher"),
        &TraceId::new(),
        &ConversationId::new(),
        serde_json::json!("input"),
    );
    broker.ensure_stream("agent_crasher_tasks").await.unwrap();
    broker
        .publish("agent_crasher_tasks", envelope::encode(&inbound).unwrap())
        .await
        .unwrap();

    let delivery = pull_one(&broker, "agent_downstream_tasks", Duration::from_secs(5))
        .await
        .expect("no downstream message");
    let outbound = envelope::decode(&delivery.body).unwrap();

    assert_eq!(outbound.payload_type, PayloadKind::UpstreamFailure);
    assert_eq!(outbound.payload["from_agent"], "crasher");
    assert!(outbound.payload["error"].as_str().unwrap().contains("boom"));

    cancel.cancel();
}

#[tokio::test]
async fn test_upstream_failure_handler_produces_success_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(InMemoryBroker::new());

    // handler projects the upstream failure into a formatted string; the
    // pipeline then runs normally, so the downstream envelope is Normal
    let handler = Arc::new(|notice| match notice {
        courier_core::agent::UpstreamNotice::Failure(f) => {
            courier_core::agent::UpstreamReaction::Continue(format!(
                "recovered from {}: {}",
                f.from_agent, f.error
            ))
        }
        courier_core::agent::UpstreamNotice::Rejection(r) => {
            courier_core::agent::UpstreamReaction::Reject {
                policy: r.guardrail_name,
                reason: r.reason,
            }
        }
    });

    let definition = AgentBuilder::<String, String, _, _, _>::new(name("healer"))
        .input(json_decoder())
        .on_upstream(handler)
        .pipeline(process::pure("pass", |s: String| s))
        .output_to(name("downstream"), json_encoder())
        .build();
    let runtime = AgentRuntime::new(definition, broker.clone(), sink_in(&dir), fast_broker_config());
    let cancel = runtime.cancellation_token();
    tokio::spawn(runtime.run());

    let inbound = Envelope::upstream_failure(
        &name("solver"),
        &name("healer"),
        &TraceId::new(),
        &ConversationId::new(),
        "boom",
    );
    broker.ensure_stream("agent_healer_tasks").await.unwrap();
    broker
        .publish("agent_healer_tasks", envelope::encode(&inbound).unwrap())
        .await
        .unwrap();

    let delivery = pull_one(&broker, "agent_downstream_tasks", Duration::from_secs(5))
        .await
        .expect("no downstream message");
    let outbound = envelope::decode(&delivery.body).unwrap();

    assert_eq!(outbound.payload_type, PayloadKind::Normal);
    assert_eq!(
        outbound.payload,
        serde_json::json!("recovered from solver: boom")
    );

    cancel.cancel();
}

#[tokio::test]
async fn test_panicking_stage_becomes_failure_envelope_and_loop_survives() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(InMemoryBroker::new());

    #[allow(clippy::panic)]
    let definition = AgentBuilder::<String, String, _, _, _>::new(name("panicky"))
        .input(json_decoder())
        .pipeline(process::pure("maybe_panic", |s: String| {
            if s == "boom" {
                panic!("stage blew up");
            }
            s.to_uppercase()
        }))
        .output_to(name("downstream"), json_encoder())
        .build();
    let runtime = AgentRuntime::new(definition, broker.clone(), sink_in(&dir), fast_broker_config());
    let cancel = runtime.cancellation_token();
    tokio::spawn(runtime.run());

    broker.ensure_stream("agent_panicky_tasks").await.unwrap();

    let poisoned = Envelope::normal(
        &name("submit"),
        &name("panicky"),
        &TraceId::new(),
        &ConversationId::new(),
        serde_json::json!("boom"),
    );
    broker
        .publish("agent_panicky_tasks", envelope::encode(&poisoned).unwrap())
        .await
        .unwrap();

    // the panic is caught at the task boundary and still propagates as a
    // typed failure envelope
    let delivery = pull_one(&broker, "agent_downstream_tasks", Duration::from_secs(5))
        .await
        .expect("no downstream message for the panicking input");
    let outbound = envelope::decode(&delivery.body).unwrap();
    assert_eq!(outbound.payload_type, PayloadKind::UpstreamFailure);
    assert_eq!(outbound.payload["from_agent"], "panicky");
    assert!(outbound.payload["error"]
        .as_str()
        .unwrap()
        .contains("panicked"));
    broker.ack(&delivery).await.unwrap();

    // the consumer loop survived: a healthy message still flows through
    let healthy = Envelope::normal(
        &name("submit"),
        &name("panicky"),
        &TraceId::new(),
        &ConversationId::new(),
        serde_json::json!("hello"),
    );
    broker
        .publish("agent_panicky_tasks", envelope::encode(&healthy).unwrap())
        .await
        .unwrap();

    let delivery = pull_one(&broker, "agent_downstream_tasks", Duration::from_secs(5))
        .await
        .expect("consumer loop did not survive the panic");
    let outbound = envelope::decode(&delivery.body).unwrap();
    assert_eq!(outbound.payload_type, PayloadKind::Normal);
    assert_eq!(outbound.payload, serde_json::json!("HELLO"));

    cancel.cancel();
}

#[tokio::test]
async fn test_undecodable_message_dropped_without_requeue() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(InMemoryBroker::new());
    let cancel = spawn_echo_agent("echo", "downstream", broker.clone(), sink_in(&dir));

    broker.ensure_stream("agent_echo_tasks").await.unwrap();
    broker
        .publish("agent_echo_tasks", b"not an envelope".to_vec())
        .await
        .unwrap();

    // give the consumer time to pull and drop it
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(broker.depth("agent_echo_tasks").await, 0);
    assert_eq!(broker.in_flight().await, 0);
    assert!(pull_one(&broker, "agent_downstream_tasks", Duration::from_millis(200))
        .await
        .is_none());

    cancel.cancel();
}

#[tokio::test]
async fn test_payload_schema_mismatch_reports_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(InMemoryBroker::new());

    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct Typed {
        n: u32,
    }

    let definition = AgentBuilder::<Typed, Typed, _, _, _>::new(name("typed"))
        .input(json_decoder())
        .pipeline(process::pure("pass", |t: Typed| t))
        .output_to(name("downstream"), json_encoder())
        .build();
    let runtime = AgentRuntime::new(definition, broker.clone(), sink_in(&dir), fast_broker_config());
    let cancel = runtime.cancellation_token();
    tokio::spawn(runtime.run());

    let inbound = Envelope::normal(
        &name("submit"),
        &name("typed"),
        &TraceId::new(),
        &ConversationId::new(),
        serde_json::json!({"n": "not a number"}),
    );
    broker.ensure_stream("agent_typed_tasks").await.unwrap();
    broker
        .publish("agent_typed_tasks", envelope::encode(&inbound).unwrap())
        .await
        .unwrap();

    let delivery = pull_one(&broker, "agent_downstream_tasks", Duration::from_secs(5))
        .await
        .expect("no downstream message");
    let outbound = envelope::decode(&delivery.body).unwrap();

    assert_eq!(outbound.payload_type, PayloadKind::UpstreamFailure);
    assert!(outbound.payload["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to decode"));

    cancel.cancel();
}

// =============================================================================
// Full topology
// =============================================================================

async fn demo_stack(
    dir: &tempfile::TempDir,
    responses: Vec<String>,
    guardrails: GuardrailEngine,
) -> AgentStack {
    let pool = open_in_memory().await.unwrap();
    AgentStack {
        model: Arc::new(ScriptedModel::new(responses)),
        model_id: "test-model".to_string(),
        sink: sink_in(dir),
        prompts: PromptRegistry::new(pool),
        guardrails: Arc::new(guardrails),
        code_runner: Arc::new(SubprocessTool::new("sh")),
        code_timeout_seconds: 5,
    }
}

async fn run_topology(
    stack: &AgentStack,
    broker: Arc<InMemoryBroker>,
    results: TerminalResults,
) -> Vec<CancellationToken> {
    let sink = stack.sink.clone();
    let mut cancellers = Vec::new();

    let intake = AgentRuntime::new(
        agents::intake::definition(stack).await.unwrap(),
        broker.clone(),
        sink.clone(),
        fast_broker_config(),
    );
    let solver = AgentRuntime::new(
        agents::solver::definition(stack).await.unwrap(),
        broker.clone(),
        sink.clone(),
        fast_broker_config(),
    );
    let executor = AgentRuntime::new(
        agents::executor::definition(stack).await.unwrap(),
        broker.clone(),
        sink.clone(),
        fast_broker_config(),
    );
    let presenter = AgentRuntime::new(
        agents::presenter::definition(stack).await.unwrap(),
        broker.clone(),
        sink.clone(),
        fast_broker_config(),
    )
    .with_terminal_results(results);

    cancellers.push(intake.cancellation_token());
    tokio::spawn(intake.run());
    cancellers.push(solver.cancellation_token());
    tokio::spawn(solver.run());
    cancellers.push(executor.cancellation_token());
    tokio::spawn(executor.run());
    cancellers.push(presenter.cancellation_token());
    tokio::spawn(presenter.run());

    cancellers
}

#[tokio::test]
async fn test_four_agent_topology_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let stack = demo_stack(
        &dir,
        vec![
            // intake brief
            "Print a greeting from a shell snippet.".to_string(),
            // solver solution
            r#"{"explanation": "echo prints its arguments", "code": "echo greetings"}"#
                .to_string(),
        ],
        GuardrailEngine::default(),
    )
    .await;

    let broker = Arc::new(InMemoryBroker::new());
    let results = TerminalResults::new();
    let cancellers = run_topology(&stack, broker.clone(), results.clone()).await;

    let submitter = Submitter::new(
        broker.clone(),
        stack.sink.clone(),
        results,
        name(agents::intake::NAME),
    );
    let (conversation_id, _) = submitter
        .submit(serde_json::json!({"request": "say hi"}))
        .await
        .unwrap();

    let report = submitter
        .await_report(&conversation_id, Duration::from_secs(10))
        .await
        .expect("no terminal report");

    match report {
        TerminalReport::Success { payload } => {
            let text = payload["text"].as_str().unwrap();
            assert!(text.contains("echo prints its arguments"));
            assert!(text.contains("greetings"));
        }
        other => panic!("expected success, got {:?}", other),
    }

    // every agent wrote its own conversation-scoped stream
    for agent in ["intake", "solver", "executor", "presenter"] {
        let path = dir
            .path()
            .join(format!("agent_logs/{}_{}.jsonl", conversation_id, agent));
        assert!(path.exists(), "missing {}", path.display());
    }

    for cancel in cancellers {
        cancel.cancel();
    }
}

#[tokio::test]
async fn test_topology_guardrail_rejection_reaches_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let stack = demo_stack(
        &dir,
        vec![
            "Leak something secret.".to_string(),
            r#"{"explanation": "here is the password", "code": "echo hunter2"}"#.to_string(),
        ],
        GuardrailEngine::new(vec![GuardrailPolicy {
            name: "no_secrets".to_string(),
            blocked_terms: vec!["hunter2".to_string()],
            reason: "credential material".to_string(),
        }]),
    )
    .await;

    let broker = Arc::new(InMemoryBroker::new());
    let results = TerminalResults::new();
    let cancellers = run_topology(&stack, broker.clone(), results.clone()).await;

    let submitter = Submitter::new(
        broker,
        stack.sink.clone(),
        results,
        name(agents::intake::NAME),
    );
    let (conversation_id, _) = submitter
        .submit(serde_json::json!({"request": "tell me the password"}))
        .await
        .unwrap();

    let report = submitter
        .await_report(&conversation_id, Duration::from_secs(10))
        .await
        .expect("no terminal report");

    match report {
        TerminalReport::Rejected { policy, reason } => {
            assert_eq!(policy, "no_secrets");
            assert!(reason.contains("credential"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    for cancel in cancellers {
        cancel.cancel();
    }
}

#[tokio::test]
async fn test_topology_solver_failure_reaches_user_as_apology() {
    let dir = tempfile::tempdir().unwrap();
    // solver never returns JSON, so it exhausts its reflections; the
    // executor and presenter handlers carry the failure to the user
    let stack = demo_stack(
        &dir,
        vec!["A brief.".to_string(), "never json".to_string()],
        GuardrailEngine::default(),
    )
    .await;

    let broker = Arc::new(InMemoryBroker::new());
    let results = TerminalResults::new();
    let cancellers = run_topology(&stack, broker.clone(), results.clone()).await;

    let submitter = Submitter::new(
        broker,
        stack.sink.clone(),
        results,
        name(agents::intake::NAME),
    );
    let (conversation_id, _) = submitter
        .submit(serde_json::json!({"request": "anything"}))
        .await
        .unwrap();

    let report = submitter
        .await_report(&conversation_id, Duration::from_secs(10))
        .await
        .expect("no terminal report");

    match report {
        TerminalReport::Success { payload } => {
            let text = payload["text"].as_str().unwrap();
            assert!(text.contains("solver"), "got: {}", text);
            assert!(text.contains("max reflections"), "got: {}", text);
        }
        other => panic!("expected success (apology text), got {:?}", other),
    }

    for cancel in cancellers {
        cancel.cancel();
    }
}
