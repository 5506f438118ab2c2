//! Embedding and generation collaborator clients.
//!
//! Both clients speak the OpenAI-compatible wire format (`/v1/embeddings`
//! and `/v1/chat/completions`), which most hosted and local model servers
//! accept, and implement the core [`Embedder`] / [`Generator`] traits.
//!
//! # Retry Strategy
//!
//! Transient failures are retried with exponential backoff before the
//! typed unavailable error is surfaced:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every request is also bounded by the configured per-request timeout,
//! so a pipeline call can never hang on a collaborator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use ragline_core::error::RagError;
use ragline_core::pipeline::{Embedder, Generator};

use crate::config::{EmbeddingConfig, GenerationConfig};

/// Build the configured [`Embedder`].
pub fn create_embedder(config: &EmbeddingConfig, dims: usize) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder { dims })),
        "openai" => Ok(Arc::new(HttpEmbedder::new(config, dims)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Build the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(HttpGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Decide whether an HTTP status is worth retrying.
fn retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Exponential backoff delay for the given attempt (1-based).
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

fn api_key(env_var: &str) -> Result<String> {
    std::env::var(env_var).with_context(|| format!("{} environment variable not set", env_var))
}

// ============ Disabled providers ============

/// Used when `embedding.provider = "disabled"`: lexical search still
/// works, vector and hybrid modes surface the unavailable error.
pub struct DisabledEmbedder {
    dims: usize,
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> ragline_core::Result<Vec<f32>> {
        Err(RagError::EmbeddingUnavailable(
            "embedding provider is disabled".into(),
        ))
    }
    async fn embed_batch(&self, _texts: &[String]) -> ragline_core::Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingUnavailable(
            "embedding provider is disabled".into(),
        ))
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Used when `generation.provider = "disabled"`: search-only deployments.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> ragline_core::Result<String> {
        Err(RagError::GenerationUnavailable(
            "generation provider is disabled".into(),
        ))
    }
}

// ============ Embeddings over HTTP ============

/// `POST {base_url}/v1/embeddings` client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_retries: u32,
    dims: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, dims: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key(&config.api_key_env)?,
            max_retries: config.max_retries,
            dims,
        })
    }

    async fn request(&self, texts: &[String]) -> ragline_core::Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::debug!(attempt, "retrying embedding request");
                tokio::time::sleep(backoff(attempt)).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RagError::EmbeddingUnavailable(format!("invalid response body: {}", e))
                        })?;
                        return parse_embeddings_response(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if retryable(status) {
                        last_err = Some(format!("API error {}: {}", status, body_text));
                        continue;
                    }
                    return Err(RagError::EmbeddingUnavailable(format!(
                        "API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RagError::EmbeddingUnavailable(
            last_err.unwrap_or_else(|| "embedding failed after retries".into()),
        ))
    }
}

fn parse_embeddings_response(json: &serde_json::Value) -> ragline_core::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::EmbeddingUnavailable("response missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RagError::EmbeddingUnavailable("response missing embedding".into()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> ragline_core::Result<Vec<f32>> {
        let mut results = self.request(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| RagError::EmbeddingUnavailable("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> ragline_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.request(texts).await?;
        if results.len() != texts.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                results.len()
            )));
        }
        Ok(results)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

// ============ Generation over HTTP ============

/// `POST {base_url}/v1/chat/completions` client.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_retries: u32,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key(&config.api_key_env)?,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> ragline_core::Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": self.temperature,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::debug!(attempt, "retrying generation request");
                tokio::time::sleep(backoff(attempt)).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RagError::GenerationUnavailable(format!(
                                "invalid response body: {}",
                                e
                            ))
                        })?;
                        return parse_completion_response(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if retryable(status) {
                        last_err = Some(format!("API error {}: {}", status, body_text));
                        continue;
                    }
                    return Err(RagError::GenerationUnavailable(format!(
                        "API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RagError::GenerationUnavailable(
            last_err.unwrap_or_else(|| "generation failed after retries".into()),
        ))
    }
}

fn parse_completion_response(json: &serde_json::Value) -> ragline_core::Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            RagError::GenerationUnavailable("response missing choices[0].message.content".into())
        })
}
