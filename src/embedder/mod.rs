//! Embedding capability boundary
//!
//! Embeddings are an external capability reached through the [`Embedder`]
//! trait so alternate providers can be swapped in without touching the
//! chunker or the index. The trait is deliberately a single embed-batch
//! method; callers own batching policy and any caching layered on top.

pub mod http;

pub use http::HttpEmbedder;

use async_trait::async_trait;
use thiserror::Error;

/// Embedding errors.
///
/// `Exhausted` is terminal: the ingestion run that hit it must abort, because
/// an index is never built from partially-embedded data.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("embedding failed after {attempts} attempts: {message}")]
    Exhausted { attempts: usize, message: String },

    #[error("provider returned {got} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("batch of {got} texts exceeds provider maximum of {max}")]
    BatchTooLarge { got: usize, max: usize },
}

/// Boundary contract to an external embedding capability.
///
/// Implementations must be order-preserving: the i-th output vector embeds
/// the i-th input text. For a fixed provider/model version, re-embedding
/// identical text yields the same vector, which is what makes rebuild-skip
/// and reproducibility tests possible.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts into fixed-dimension vectors.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Largest batch this provider accepts per request.
    fn max_batch_size(&self) -> usize;

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}
