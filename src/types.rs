//! Shared data structures for the context retrieval pipeline
//!
//! This module defines the core types flowing through the system:
//! - Ingestion: Chunk (chunker output), IndexEntry (embedded chunk)
//! - Index: IndexManifest (one generation's metadata), QueryResult
//! - Serving: ScoredPassage (context bundle element returned to callers)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Ingestion: chunks
// ============================================================================

/// A contiguous span of a source document, the unit of embedding and
/// retrieval.
///
/// Offsets are **character** offsets into the document, not byte offsets.
/// Consecutive chunks share exactly `overlap` characters, so concatenating
/// the first chunk with the post-overlap suffix of each following chunk
/// reconstructs the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier: `{document_id}:{sequence_index:06}`. The zero-padded
    /// sequence keeps lexicographic order equal to sequence order.
    pub chunk_id: String,
    /// Source document identifier (file stem of the ingested file).
    pub document_id: String,
    /// Position of this chunk within the document, starting at 0.
    pub sequence_index: u32,
    /// Start character offset (inclusive).
    pub start: usize,
    /// End character offset (exclusive).
    pub end: usize,
    /// The chunk text itself.
    pub text: String,
}

impl Chunk {
    /// Build the canonical chunk identifier for a document/sequence pair.
    pub fn make_id(document_id: &str, sequence_index: u32) -> String {
        format!("{document_id}:{sequence_index:06}")
    }
}

// ============================================================================
// Index: entries and manifests
// ============================================================================

/// One durable index record: an embedded chunk plus the metadata needed to
/// serve it back. Immutable once written to a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    /// Embedding vector; dimension is constant across a generation.
    pub vector: Vec<f32>,
    pub chunk_text: String,
    pub document_id: String,
    pub sequence_index: u32,
}

/// Metadata describing one complete index generation.
///
/// Persisted as `manifest.toml` next to the generation's entries and used to
/// detect staleness of the source document via `source_checksum`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Versioned handle naming this generation's directory.
    pub generation_id: String,
    pub entry_count: usize,
    pub embedding_dimension: usize,
    pub build_timestamp: DateTime<Utc>,
    /// MD5 hex digest of the raw source document bytes.
    pub source_checksum: String,
}

// ============================================================================
// Serving: query results and context bundles
// ============================================================================

/// A ranked reference produced by index search.
///
/// Ordering contract: descending similarity score, ties broken by ascending
/// `chunk_id` so repeated searches are byte-for-byte reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub chunk_id: String,
    pub score: f32,
}

/// One element of the context bundle returned to retrieval callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub chunk_text: String,
    pub document_id: String,
    pub score: f32,
}
