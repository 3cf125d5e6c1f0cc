//! In-memory broker — reference implementation of the broker contract.
//!
//! Streams are FIFO queues; an unacked delivery sits in an in-flight table
//! until acked (dropped), nacked with requeue (pushed back to the front),
//! or nacked without requeue (dropped).

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Broker, Delivery};
use crate::types::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, VecDeque<Vec<u8>>>,
    in_flight: HashMap<u64, (String, Vec<u8>)>,
    next_tag: u64,
}

/// Shared in-process broker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ready (not in-flight) messages in a stream. Test aid.
    pub async fn depth(&self, stream: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.streams.get(stream).map(VecDeque::len).unwrap_or(0)
    }

    /// Number of unacked deliveries. Test aid.
    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn ensure_stream(&self, stream: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.streams.entry(stream.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, stream: &str, body: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.streams.get_mut(stream) {
            Some(queue) => {
                queue.push_back(body);
                Ok(())
            }
            None => Err(Error::broker(format!("unknown stream: {}", stream))),
        }
    }

    async fn pull(&self, stream: &str) -> Result<Option<Delivery>> {
        let mut inner = self.inner.lock().await;
        let body = match inner.streams.get_mut(stream) {
            Some(queue) => queue.pop_front(),
            None => return Err(Error::broker(format!("unknown stream: {}", stream))),
        };

        Ok(body.map(|body| {
            inner.next_tag += 1;
            let delivery_tag = inner.next_tag;
            inner
                .in_flight
                .insert(delivery_tag, (stream.to_string(), body.clone()));
            Delivery {
                stream: stream.to_string(),
                body,
                delivery_tag,
            }
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .in_flight
            .remove(&delivery.delivery_tag)
            .map(|_| ())
            .ok_or_else(|| Error::broker(format!("unknown delivery tag: {}", delivery.delivery_tag)))
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let (stream, body) = inner
            .in_flight
            .remove(&delivery.delivery_tag)
            .ok_or_else(|| {
                Error::broker(format!("unknown delivery tag: {}", delivery.delivery_tag))
            })?;

        if requeue {
            inner.streams.entry(stream).or_default().push_front(body);
        }
        Ok(())
    }
}
