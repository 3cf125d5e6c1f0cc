//! Broker abstraction — durable stream operations.
//!
//! The runtime consumes and publishes through this trait; the real remote
//! broker client lives outside the core. [`memory::InMemoryBroker`] is the
//! reference implementation of the contract, used by the tests and the
//! single-process demo topology.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::types::{Error, Result};

pub mod memory;

pub use memory::InMemoryBroker;

/// One delivered message, identified by its delivery tag until acked.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub stream: String,
    pub body: Vec<u8>,
    pub delivery_tag: u64,
}

/// Durable queue operations.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a durable stream. Idempotent.
    async fn ensure_stream(&self, stream: &str) -> Result<()>;

    /// Publish one message to a stream.
    async fn publish(&self, stream: &str, body: Vec<u8>) -> Result<()>;

    /// Pull a single message, or `None` when the stream is empty.
    async fn pull(&self, stream: &str) -> Result<Option<Delivery>>;

    /// Positive-ack a delivery.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Negative-ack a delivery; `requeue` controls whether it is redelivered.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;
}

/// Run `op` up to `attempts` times with fixed spacing between failures.
/// Used for broker connect/declare at startup and for publish retries.
pub async fn retry_fixed<T, F, Fut>(
    attempts: u32,
    spacing: Duration,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    what,
                    attempt,
                    attempts,
                    error = %e,
                    "broker operation failed"
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(spacing).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| Error::broker(format!("{} failed", what))))
}
