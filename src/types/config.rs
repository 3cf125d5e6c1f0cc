//! Configuration structures.
//!
//! Configuration is loaded from defaults and overridden by environment
//! variables (`COURIER_*`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global configuration for an agent process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Broker connection configuration.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Model endpoint configuration.
    #[serde(default)]
    pub model: ModelConfig,

    /// Registry database configuration.
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Config {
    /// Load configuration, applying environment overrides on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse("COURIER_BROKER_PREFETCH") {
            config.broker.prefetch = n;
        }
        if let Some(n) = env_parse("COURIER_BROKER_CONNECT_ATTEMPTS") {
            config.broker.connect_attempts = n;
        }
        if let Some(ms) = env_parse("COURIER_BROKER_CONNECT_SPACING_MS") {
            config.broker.connect_spacing = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("COURIER_BROKER_IDLE_SLEEP_MS") {
            config.broker.idle_sleep = Duration::from_millis(ms);
        }
        if let Ok(dir) = std::env::var("COURIER_LOG_DIR") {
            config.observability.log_dir = dir;
        }
        if let Ok(level) = std::env::var("COURIER_LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("COURIER_LOG_FORMAT") {
            config.observability.json_logs = format.eq_ignore_ascii_case("json");
        }
        if let Ok(endpoint) = std::env::var("COURIER_MODEL_ENDPOINT") {
            config.model.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("COURIER_MODEL") {
            config.model.model = model;
        }
        if let Ok(path) = std::env::var("COURIER_REGISTRY_PATH") {
            config.registry.path = path;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Number of messages the broker may deliver before an ack is required.
    /// Bounds per-agent in-flight concurrency.
    pub prefetch: usize,

    /// Maximum connection attempts at startup.
    pub connect_attempts: u32,

    /// Fixed spacing between connection attempts.
    #[serde(with = "humantime_serde")]
    pub connect_spacing: Duration,

    /// Sleep between empty pulls in the consume loop.
    #[serde(with = "humantime_serde")]
    pub idle_sleep: Duration,

    /// Publish retry attempts before the message is negative-acked.
    pub publish_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            prefetch: 10,
            connect_attempts: 5,
            connect_spacing: Duration::from_secs(2),
            idle_sleep: Duration::from_millis(200),
            publish_attempts: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Root directory for the `agent_logs/` and `conversation_logs/` streams.
    pub log_dir: String,

    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit process logs as JSON instead of compact text.
    pub json_logs: bool,

    /// Write retry attempts for a single record.
    pub write_attempts: u32,

    /// Initial backoff between write retries; doubles per attempt.
    #[serde(with = "humantime_serde")]
    pub write_backoff: Duration,

    /// Backoff cap.
    #[serde(with = "humantime_serde")]
    pub write_backoff_cap: Duration,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            write_attempts: 3,
            write_backoff: Duration::from_millis(50),
            write_backoff_cap: Duration::from_millis(500),
        }
    }
}

/// Model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the generation endpoint.
    pub endpoint: String,

    /// Default model identity.
    pub model: String,

    /// Per-call HTTP timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Registry database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// SQLite database path.
    pub path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: "courier.db".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.broker.prefetch, 10);
        assert_eq!(config.broker.connect_attempts, 5);
        assert_eq!(config.observability.log_dir, "logs");
        assert!(config.registry.path.ends_with(".db"));
    }
}
