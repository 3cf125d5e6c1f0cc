//! Observability — tracing init and the per-conversation record streams.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::ObservabilityConfig;

mod records;
mod sink;

pub use records::{LogLevel, LogRecord, LogSource, RecordKind, StageTiming};
pub use sink::LogSink;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the process-wide tracing subscriber from the observability
/// config. Later calls are no-ops, so every agent entry point can call it
/// unconditionally.
///
/// `RUST_LOG` overrides `config.log_level`; `config.json_logs` selects the
/// output format.
pub fn init_tracing(config: &ObservabilityConfig) {
    if TRACING_INIT.set(()).is_err() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing init skipped: {err}");
    }
}
