use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::error::{Result, TrafficRagError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_BATCH: usize = 2048;

/// Request structure for the embeddings endpoint
#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

/// Response structure from the embeddings endpoint
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible hosted embeddings API.
///
/// Single-query embedding retries transparently on rate-limit and server
/// errors with exponential backoff; batch embedding splits oversized input.
///
/// # Panics
///
/// Construction panics if the HTTP client cannot be built (should not happen
/// in normal operation).
pub struct HostedEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    batch_size: usize,
    max_retries: usize,
}

impl HostedEmbedder {
    /// Create an embedder for the given credential and model name
    /// (e.g. "text-embedding-3-small").
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: 100,
            max_retries: 3,
        }
    }

    /// Point the client at a different API host (e.g. a local inference
    /// server exposing the same wire format).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Maximum texts per API request; capped at the provider limit of 2048.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed a batch of texts, splitting into API-sized requests as needed.
    /// Returns one embedding per input text, in input order.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            all.extend(self.request_embeddings(chunk.to_vec()).await?);
            // Brief pause between full batches to stay under rate limits.
            if chunk.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        Ok(all)
    }

    /// One API round-trip.
    async fn request_embeddings(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| TrafficRagError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(TrafficRagError::Embedding(format!(
                "Embeddings API error {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| TrafficRagError::Embedding(format!("Failed to parse response: {}", e)))?;

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.request_embeddings(vec![text.to_string()]).await {
                Ok(mut embeddings) => {
                    if embeddings.is_empty() {
                        return Err(TrafficRagError::Embedding(
                            "Empty response from embeddings API".to_string(),
                        ));
                    }
                    log::debug!(
                        "embedding call took {:?} (attempt {})",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(embeddings.remove(0));
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    log::warn!("retry {}/{} after error: {}", attempt + 1, self.max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Rate limits (429) and server-side failures (5xx) are worth retrying;
/// anything else fails immediately.
fn is_retryable(error: &TrafficRagError) -> bool {
    let message = error.to_string();
    ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| message.contains(code))
}

#[async_trait]
impl Embedder for HostedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_retry(text).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_defaults() {
        let embedder = HostedEmbedder::new("test-key", "text-embedding-3-small");
        assert_eq!(embedder.model(), "text-embedding-3-small");
        assert_eq!(embedder.batch_size(), 100);
        assert_eq!(embedder.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_batch_size_capped() {
        let embedder =
            HostedEmbedder::new("test-key", "text-embedding-3-small").with_batch_size(5000);
        assert_eq!(embedder.batch_size(), MAX_BATCH);
    }

    #[test]
    fn test_batch_size_floor() {
        let embedder = HostedEmbedder::new("test-key", "m").with_batch_size(0);
        assert_eq!(embedder.batch_size(), 1);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&TrafficRagError::Embedding(
            "Embeddings API error 429 Too Many Requests: slow down".to_string()
        )));
        assert!(is_retryable(&TrafficRagError::Embedding(
            "Embeddings API error 503 Service Unavailable: maintenance".to_string()
        )));
        assert!(!is_retryable(&TrafficRagError::Embedding(
            "Embeddings API error 401 Unauthorized: bad key".to_string()
        )));
    }

    #[tokio::test]
    async fn test_embed_batch_empty_input() {
        let embedder = HostedEmbedder::new("test-key", "m");
        let embeddings = embedder.embed_batch(Vec::new()).await.unwrap();
        assert!(embeddings.is_empty());
    }
}
