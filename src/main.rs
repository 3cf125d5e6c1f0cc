//! Courier demo topology — runs the four-agent chain in one process and
//! submits a request from the command line.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use courier_core::agents::{self, AgentStack};
use courier_core::broker::InMemoryBroker;
use courier_core::guardrail::GuardrailEngine;
use courier_core::observability::{init_tracing, LogSink};
use courier_core::registry::{self, GuardrailRegistry, PromptRegistry};
use courier_core::runtime::AgentRuntime;
use courier_core::submit::{Submitter, TerminalResults};
use courier_core::tools::{HttpModelClient, SubprocessTool};
use courier_core::Config;

#[derive(Debug, Parser)]
#[command(name = "courier", about = "Run the demo agent topology on one request")]
struct Args {
    /// The user request to run through the pipeline.
    #[arg(long)]
    input: String,

    /// Model endpoint (Ollama-style /api/generate).
    #[arg(long, env = "COURIER_MODEL_ENDPOINT")]
    endpoint: Option<String>,

    /// Model identity.
    #[arg(long, env = "COURIER_MODEL")]
    model: Option<String>,

    /// Registry database path.
    #[arg(long, env = "COURIER_REGISTRY_PATH")]
    registry: Option<String>,

    /// Seconds to wait for the terminal report.
    #[arg(long, default_value_t = 300)]
    wait_seconds: u64,

    /// Per-run subprocess timeout in seconds.
    #[arg(long, default_value_t = 30)]
    code_timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(endpoint) = args.endpoint {
        config.model.endpoint = endpoint;
    }
    if let Some(model) = args.model {
        config.model.model = model;
    }
    if let Some(path) = args.registry {
        config.registry.path = path;
    }

    init_tracing(&config.observability);

    let pool = registry::open_pool(&config.registry.path).await?;
    let prompts = PromptRegistry::new(pool.clone());
    let guardrails = Arc::new(GuardrailEngine::new(
        GuardrailRegistry::new(pool).load_policies().await?,
    ));

    let sink = LogSink::new(&config.observability);
    let stack = AgentStack {
        model: Arc::new(HttpModelClient::new(&config.model)?),
        model_id: config.model.model.clone(),
        sink: sink.clone(),
        prompts,
        guardrails,
        code_runner: Arc::new(SubprocessTool::default()),
        code_timeout_seconds: args.code_timeout_seconds,
    };

    let broker = Arc::new(InMemoryBroker::new());
    let results = TerminalResults::new();

    let intake = AgentRuntime::new(
        agents::intake::definition(&stack).await?,
        broker.clone(),
        sink.clone(),
        config.broker.clone(),
    );
    let solver = AgentRuntime::new(
        agents::solver::definition(&stack).await?,
        broker.clone(),
        sink.clone(),
        config.broker.clone(),
    );
    let executor = AgentRuntime::new(
        agents::executor::definition(&stack).await?,
        broker.clone(),
        sink.clone(),
        config.broker.clone(),
    );
    let presenter = AgentRuntime::new(
        agents::presenter::definition(&stack).await?,
        broker.clone(),
        sink.clone(),
        config.broker.clone(),
    )
    .with_terminal_results(results.clone());

    let cancellers = vec![
        intake.cancellation_token(),
        solver.cancellation_token(),
        executor.cancellation_token(),
        presenter.cancellation_token(),
    ];

    let mut handles = Vec::new();
    handles.push(tokio::spawn(intake.run()));
    handles.push(tokio::spawn(solver.run()));
    handles.push(tokio::spawn(executor.run()));
    handles.push(tokio::spawn(presenter.run()));

    let entry = courier_core::types::AgentName::from_string(agents::intake::NAME.to_string())?;
    let submitter = Submitter::new(broker, sink, results, entry);
    let (conversation_id, _trace_id) = submitter
        .submit(serde_json::json!({"request": args.input}))
        .await?;
    tracing::info!(conversation_id = %conversation_id, "request submitted");

    let report = tokio::select! {
        report = submitter.await_report(&conversation_id, Duration::from_secs(args.wait_seconds)) => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, shutting down");
            None
        }
    };

    for cancel in cancellers {
        cancel.cancel();
    }
    for handle in handles {
        let _ = handle.await;
    }

    match report {
        Some(report) => {
            println!("{}", report.render_block());
            Ok(())
        }
        None => {
            eprintln!("no terminal report within {}s", args.wait_seconds);
            std::process::exit(1);
        }
    }
}
