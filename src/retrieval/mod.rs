//! Retrieval engine - query text to ranked context bundle
//!
//! Validates the query, embeds it through the shared [`Embedder`], ranks the
//! active index generation and maps the matches back to passages. Read-only:
//! the service holds a reference to the index, never a copy, and any number
//! of retrievals may run concurrently against the same generation.

use crate::embedder::{EmbedError, Embedder};
use crate::index::{IndexError, VectorIndex};
use crate::types::ScoredPassage;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Retrieval errors.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query text must not be empty")]
    InvalidQuery,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Embeds queries and serves ranked passages from the vector index.
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Return up to `k` passages ranked by similarity to `query_text`.
    ///
    /// Fewer than `k` indexed passages is not an error - every entry comes
    /// back, ranked.
    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let trimmed = query_text.trim();
        if trimmed.is_empty() {
            return Err(RetrievalError::InvalidQuery);
        }

        let batch = [query_text.to_string()];
        let mut vectors = self.embedder.embed_batch(&batch).await?;
        let query_vector = vectors
            .pop()
            .ok_or_else(|| EmbedError::CountMismatch { expected: 1, got: 0 })?;

        // Pin one generation for both ranking and passage lookup, so a
        // concurrent swap cannot split the two across generations.
        let generation = self
            .index
            .active_generation()
            .ok_or(IndexError::EmptyIndex)?;
        let ranked = generation.search(&query_vector, k)?;

        let passages: Vec<ScoredPassage> = ranked
            .into_iter()
            .filter_map(|result| {
                generation.entry(&result.chunk_id).map(|entry| ScoredPassage {
                    chunk_text: entry.chunk_text.clone(),
                    document_id: entry.document_id.clone(),
                    score: result.score,
                })
            })
            .collect();

        debug!(
            k,
            returned = passages.len(),
            indexed = generation.entry_count(),
            "Retrieval complete"
        );
        Ok(passages)
    }
}
