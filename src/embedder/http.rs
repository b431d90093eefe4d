//! OpenAI-compatible HTTP embedding provider
//!
//! Talks to any `/embeddings` endpoint speaking the OpenAI wire shape
//! (OpenAI itself, Azure, Ollama, vLLM, ...). Transient failures - timeouts,
//! connection errors, HTTP 429 and 5xx - are retried with bounded
//! exponential backoff; anything else fails immediately.

use super::{EmbedError, Embedder};
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Async embeddings client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: usize,
    backoff_base: Duration,
    batch_size: usize,
}

impl HttpEmbedder {
    /// Build a client from the embedding configuration plus an optional API
    /// key resolved by the caller (the key never lives in config files).
    pub fn new(config: &EmbeddingConfig, api_key: Option<&str>) -> Result<Self, EmbedError> {
        if config.model.trim().is_empty() {
            return Err(EmbedError::Provider("missing embedding model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| EmbedError::Provider("API key contains invalid header bytes".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| EmbedError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms.max(1)),
            batch_size: config.batch_size.max(1),
        })
    }

    fn should_retry_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_transport(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
    }

    /// Attempt n (1-based) sleeps `backoff_base << n`, capped at 32x base.
    fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.min(5) as u32;
        self.backoff_base * (1u32 << shift)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.batch_size {
            return Err(EmbedError::BatchTooLarge {
                got: texts.len(),
                max: self.batch_size,
            });
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let request = EmbeddingRequest {
                model: &self.model,
                input: texts,
            };
            let result = self.client.post(&self.endpoint).json(&request).send().await;

            let retry_reason = match result {
                Ok(resp) if resp.status().is_success() => {
                    let mut parsed: EmbeddingResponse = resp
                        .json()
                        .await
                        .map_err(|e| EmbedError::Provider(format!("malformed embedding response: {e}")))?;
                    // Providers may reorder; the index field restores input order.
                    parsed.data.sort_by_key(|entry| entry.index);
                    if parsed.data.len() != texts.len() {
                        return Err(EmbedError::CountMismatch {
                            expected: texts.len(),
                            got: parsed.data.len(),
                        });
                    }
                    debug!(batch = texts.len(), attempt, "Embedding batch complete");
                    return Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
                    if !Self::should_retry_status(status) {
                        return Err(EmbedError::Provider(format!(
                            "embedding request failed ({status}): {body}"
                        )));
                    }
                    format!("HTTP {status}: {body}")
                }
                Err(err) => {
                    if !Self::is_retryable_transport(&err) {
                        return Err(EmbedError::Provider(err.to_string()));
                    }
                    err.to_string()
                }
            };

            if attempt >= self.max_retries {
                return Err(EmbedError::Exhausted {
                    attempts: attempt,
                    message: retry_reason,
                });
            }
            let delay = self.backoff(attempt);
            warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                reason = %retry_reason,
                "Transient embedding failure - backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            endpoint: "http://127.0.0.1:1/v1/embeddings".to_string(),
            model: "test-model".to_string(),
            backoff_base_ms: 1,
            max_retries: 2,
            timeout_secs: 1,
            batch_size: 4,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_rejects_missing_model() {
        let mut config = test_config();
        config.model = "  ".to_string();
        assert!(HttpEmbedder::new(&config, None).is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let embedder = HttpEmbedder::new(&test_config(), Some("key")).unwrap();
        assert_eq!(embedder.backoff(1), Duration::from_millis(2));
        assert_eq!(embedder.backoff(2), Duration::from_millis(4));
        assert_eq!(embedder.backoff(5), Duration::from_millis(32));
        // Deep attempts stop growing.
        assert_eq!(embedder.backoff(50), Duration::from_millis(32));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_without_network() {
        let embedder = HttpEmbedder::new(&test_config(), None).unwrap();
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        let err = embedder.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, EmbedError::BatchTooLarge { got: 5, max: 4 }));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let embedder = HttpEmbedder::new(&test_config(), None).unwrap();
        let out = embedder.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_exhausts_retries() {
        // Port 1 refuses connections; two fast attempts then Exhausted.
        let embedder = HttpEmbedder::new(&test_config(), None).unwrap();
        let err = embedder
            .embed_batch(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Exhausted { attempts: 2, .. }));
    }
}
