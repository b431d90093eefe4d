//! Ingestion pipeline - document to servable index generation
//!
//! Processing sequence for one knowledge-base document:
//!
//! ```text
//! PHASE 1: Load      - read the file, compute the source checksum
//! PHASE 2: Skip?     - checksum matches the active generation -> done
//! PHASE 3: Chunk     - deterministic overlapping passages
//! PHASE 4: Embed     - batched provider calls, bounded retries inside
//! PHASE 5: Build     - stage, make durable, atomically swap in
//! ```
//!
//! Any failure in phases 1-5 aborts the whole run; a previously built
//! generation stays active and servable. Cancellation is checked between
//! embedding batches and before the build, so an abandoned run leaves no
//! observable state.

use crate::chunking::{ChunkError, ChunkingEngine};
use crate::embedder::{EmbedError, Embedder};
use crate::index::{IndexError, VectorIndex};
use crate::types::{IndexEntry, IndexManifest};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Ingestion errors. Every variant aborts the run before anything swaps in.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("ingestion cancelled before the new generation was swapped in")]
    Cancelled,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub manifest: IndexManifest,
    /// Chunks embedded during this run; 0 when the rebuild was skipped.
    pub chunks_embedded: usize,
    /// True when the source checksum matched and the active generation was
    /// kept as-is.
    pub skipped: bool,
    pub elapsed_ms: u128,
}

/// Orchestrates chunk -> embed -> build for one document at a time.
///
/// Logically single-writer: concurrent runs are serialized or rejected by the
/// index's build lock, and this pipeline never interleaves writes with one.
pub struct IngestionPipeline {
    chunker: ChunkingEngine,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        chunker: ChunkingEngine,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest a knowledge-base text file.
    ///
    /// The document id is the file stem, so re-ingesting the same file
    /// produces identical chunk ids.
    pub async fn ingest_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let document_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        self.ingest_text(&document_id, &text, cancel).await
    }

    /// Ingest an already-loaded document.
    pub async fn ingest_text(
        &self,
        document_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let started = Instant::now();

        // PHASE 1: checksum over the raw bytes, before any normalization.
        let source_checksum = format!("{:x}", md5::compute(text.as_bytes()));

        // PHASE 2: rebuild-skip. Embedding is the expensive step, so the
        // staleness check runs before any provider traffic.
        if let Some(manifest) = self.index.stats() {
            if manifest.source_checksum == source_checksum {
                info!(
                    document_id,
                    generation = %manifest.generation_id,
                    "Document unchanged - skipping rebuild"
                );
                return Ok(IngestReport {
                    manifest,
                    chunks_embedded: 0,
                    skipped: true,
                    elapsed_ms: started.elapsed().as_millis(),
                });
            }
        }

        // PHASE 3: chunk.
        let chunks = self.chunker.chunk(document_id, text)?;
        let total_chunks = chunks.len();
        info!(
            document_id,
            chunks = total_chunks,
            provider = self.embedder.provider_name(),
            batch_size = self.batch_size,
            "Ingestion started"
        );

        // PHASE 4: embed in bounded batches. Chunks are consumed as their
        // entries are produced; nothing partial ever reaches the index.
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(total_chunks);
        let mut dimension: Option<usize> = None;
        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!(document_id, batch = batch_no, "Ingestion cancelled between batches");
                return Err(IngestError::Cancelled);
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(IngestError::Embed(EmbedError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                }));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                match dimension {
                    None => dimension = Some(vector.len()),
                    Some(expected) if expected != vector.len() => {
                        return Err(IngestError::Index(IndexError::DimensionMismatch {
                            expected,
                            got: vector.len(),
                        }));
                    }
                    Some(_) => {}
                }
                entries.push(IndexEntry {
                    chunk_id: chunk.chunk_id.clone(),
                    vector,
                    chunk_text: chunk.text.clone(),
                    document_id: chunk.document_id.clone(),
                    sequence_index: chunk.sequence_index,
                });
            }
            debug!(
                document_id,
                batch = batch_no,
                embedded = entries.len(),
                total = total_chunks,
                "Embedding batch complete"
            );
        }

        if cancel.is_cancelled() {
            info!(document_id, "Ingestion cancelled before build");
            return Err(IngestError::Cancelled);
        }

        // PHASE 5: build and swap.
        let manifest = self.index.build(entries, &source_checksum).await?;

        let elapsed_ms = started.elapsed().as_millis();
        info!(
            document_id,
            generation = %manifest.generation_id,
            entries = manifest.entry_count,
            dimension = manifest.embedding_dimension,
            elapsed_ms,
            "Ingestion complete"
        );
        Ok(IngestReport {
            manifest,
            chunks_embedded: total_chunks,
            skipped: false,
            elapsed_ms,
        })
    }
}
