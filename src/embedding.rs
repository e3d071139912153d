//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two concrete providers:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are
//!   not configured.
//! - **[`HuggingFaceProvider`]** — calls the HuggingFace inference API
//!   feature-extraction pipeline with retry and exponential backoff.
//!
//! [`CachedEmbedder`] wraps any provider with a per-record vector cache
//! in the cache store, keyed by the sha256 of the input text, so
//! unchanged records are not re-embedded across refreshes.
//!
//! # Retry strategy
//!
//! HTTP 429 and 5xx responses and network errors are retried with
//! exponential backoff (1s, 2s, 4s, ..., capped at 2^5); other 4xx
//! responses fail immediately.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::CatalogError;
use crate::store::CacheStore;

const DEFAULT_API_URL: &str = "https://api-inference.huggingface.co";

/// Environment variable holding the HuggingFace API token.
const HF_TOKEN_ENV: &str = "HF_SECRET_KEY";

/// Maps a record's descriptive text to a fixed-length numeric vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed one text. Vectors from the same provider always have
    /// [`dims`](EmbeddingProvider::dims) components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CatalogError>;
}

/// Instantiate the provider described by the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "huggingface" => Ok(Box::new(HuggingFaceProvider::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled provider ============

/// A no-op provider that always returns errors. Used when
/// `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CatalogError> {
        Err(CatalogError::EmbeddingUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ HuggingFace provider ============

/// Calls `POST /pipeline/feature-extraction/{model}` on the HuggingFace
/// inference API. Token-level outputs are mean-pooled into a single
/// sentence vector.
pub struct HuggingFaceProvider {
    model: String,
    dims: usize,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl HuggingFaceProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for huggingface provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for huggingface provider"))?;

        Ok(Self {
            model,
            dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| CatalogError::EmbeddingUnavailable(e.to_string()))?;

        let body = serde_json::json!({ "inputs": text });
        let endpoint = format!("{}/pipeline/feature-extraction/{}", self.url, self.model);
        let mut last_err: Option<CatalogError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = client.post(&endpoint).json(&body);
            if let Ok(token) = std::env::var(HF_TOKEN_ENV) {
                request = request.header("Authorization", format!("Bearer {token}"));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await.map_err(|e| {
                            CatalogError::EmbeddingUnavailable(format!(
                                "invalid embedding response: {e}"
                            ))
                        })?;
                        return parse_embedding(&json, self.dims);
                    }

                    let text = response.text().await.unwrap_or_default();
                    let err = CatalogError::EmbeddingUnavailable(format!(
                        "inference API error {status}: {text}"
                    ));

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(CatalogError::EmbeddingUnavailable(format!(
                        "request to {endpoint} failed: {e}"
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            CatalogError::EmbeddingUnavailable("embedding failed after retries".to_string())
        }))
    }
}

/// Parse a feature-extraction response into a single vector.
///
/// Sentence-level models return a flat `[dims]` array; token-level
/// models return `[tokens][dims]`, which is mean-pooled.
fn parse_embedding(json: &Value, dims: usize) -> Result<Vec<f32>, CatalogError> {
    let outer = json.as_array().ok_or_else(|| {
        CatalogError::EmbeddingUnavailable(format!("embedding response is not an array: {json}"))
    })?;

    let vector: Vec<f32> = if outer.first().map(Value::is_array).unwrap_or(false) {
        // Token-level output: mean-pool across tokens.
        let mut sums = vec![0.0f32; dims];
        let mut count = 0usize;
        for token in outer {
            let token = token.as_array().ok_or_else(|| {
                CatalogError::EmbeddingUnavailable("ragged embedding response".to_string())
            })?;
            if token.len() != dims {
                return Err(CatalogError::EmbeddingUnavailable(format!(
                    "expected {dims} components per token, got {}",
                    token.len()
                )));
            }
            for (acc, component) in sums.iter_mut().zip(token) {
                *acc += component.as_f64().unwrap_or(0.0) as f32;
            }
            count += 1;
        }
        if count == 0 {
            return Err(CatalogError::EmbeddingUnavailable(
                "empty embedding response".to_string(),
            ));
        }
        sums.iter().map(|s| s / count as f32).collect()
    } else {
        outer
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect()
    };

    if vector.len() != dims {
        return Err(CatalogError::EmbeddingUnavailable(format!(
            "expected a {dims}-component vector, got {}",
            vector.len()
        )));
    }

    Ok(vector)
}

// ============ Caching wrapper ============

/// Wraps a provider with a per-text vector cache in the cache store.
///
/// Keys are `emb:<model>:<sha256(text)>`, so a model change naturally
/// invalidates old entries without any explicit flush.
pub struct CachedEmbedder {
    inner: Box<dyn EmbeddingProvider>,
    store: Arc<dyn CacheStore>,
}

impl CachedEmbedder {
    pub fn new(inner: Box<dyn EmbeddingProvider>, store: Arc<dyn CacheStore>) -> Self {
        Self { inner, store }
    }

    fn cache_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("emb:{}:{:x}", self.inner.model_name(), hasher.finalize())
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CatalogError> {
        let key = self.cache_key(text);

        if let Some(cached) = self.store.get(&key).await.map_err(CatalogError::Store)? {
            if let Ok(vector) = serde_json::from_value::<Vec<f32>>(cached) {
                debug!(key, "embedding cache hit");
                return Ok(vector);
            }
            // Corrupt entry: fall through and recompute.
        }

        let vector = self.inner.embed(text).await?;
        let encoded = serde_json::to_value(&vector)
            .map_err(|e| CatalogError::Store(e.into()))?;
        self.store
            .set(&key, &encoded)
            .await
            .map_err(CatalogError::Store)?;

        Ok(vector)
    }
}
