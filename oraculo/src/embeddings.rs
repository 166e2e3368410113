//! Embedding providers: the external collaborator that turns text into
//! fixed-length vectors, plus a deterministic mock for tests.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::EngineError;

/// Converts text into fixed-length numeric vectors.
///
/// Every vector returned by one provider instance has exactly
/// [`dimensions`](EmbeddingProvider::dimensions) components; the index
/// layer treats any disagreement as a stale-index signal.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of inputs, one vector per input, in input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;

    /// Width of the vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// Stable identifier recorded in the index catalog.
    fn name(&self) -> &str;

    /// Embed a single input.
    async fn embed(&self, input: &str) -> Result<Vec<f32>, EngineError> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::Embedding("provider returned no vector".into()))
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbeddings {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddings {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        if api_key.trim().is_empty() {
            return Err(EngineError::Config("embedding API key is empty".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EngineError::Config("embedding API key is not a valid header".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EngineError::Embedding(format!("unreadable response: {err}")))?;
        // The API may return rows out of order; index is authoritative.
        parsed.data.sort_by_key(|row| row.index);
        if parsed.data.len() != inputs.len() {
            return Err(EngineError::Embedding(format!(
                "got {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        for row in &parsed.data {
            if row.embedding.len() != self.dimensions {
                return Err(EngineError::Embedding(format!(
                    "expected {} dimensions, got {}",
                    self.dimensions,
                    row.embedding.len()
                )));
            }
        }
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Deterministic embedding provider for tests and offline runs.
///
/// Vectors are built by hashing whitespace-separated tokens into
/// buckets and normalizing, so identical text always embeds
/// identically and overlapping text lands nearby.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 64 }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in input.split_whitespace() {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
            let bucket = (hash % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(inputs.iter().map(|input| self.embed_text(input)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}
