//! Model client — blocking text-in/text-out calls with latency.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::types::{Error, ModelConfig, Result};

/// One model call.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub model: String,
}

/// The model's answer plus observed call latency.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub response: String,
    pub latency_ms: u64,
}

/// Text-in/text-out model interface. Blocking from the caller's
/// perspective; suspends only the owning task.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse>;
}

/// HTTP client for an Ollama-style `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpModelClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
        });

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::model(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::model(format!(
                "model endpoint returned {}: {}",
                status, text
            )));
        }

        let value: serde_json::Value = response.json().await?;
        let text = value
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::model("model response missing 'response' field"))?
            .to_string();

        Ok(ModelResponse {
            response: text,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// A test client that returns canned responses in order, cycling when
/// exhausted. Lets agents be exercised deterministically without a live
/// endpoint.
#[derive(Debug)]
pub struct ScriptedModel {
    responses: Vec<String>,
    index: AtomicUsize,
    latency: Duration,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            index: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// A model that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse> {
        if self.responses.is_empty() {
            return Err(Error::model("scripted model has no responses"));
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        Ok(ModelResponse {
            response: self.responses[idx].clone(),
            latency_ms: self.latency.as_millis() as u64,
        })
    }
}
