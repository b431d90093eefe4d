//! Deterministic document chunking
//!
//! Splits a document into overlapping passages by sliding a fixed-size
//! character window, preferring to end each passage at a sentence or
//! paragraph boundary within a small tolerance before falling back to a hard
//! cut. The same (document, chunk_size, overlap) input always produces the
//! same chunk sequence, so index rebuilds are idempotent and verifiable.
//!
//! Coverage invariant: consecutive chunks share exactly `overlap` characters
//! and leave no gaps - the first chunk plus the post-overlap suffix of every
//! later chunk reconstructs the document.

use crate::types::Chunk;
use thiserror::Error;
use tracing::debug;

/// Chunking errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error(
        "invalid chunking parameters: chunk_size={chunk_size}, overlap={overlap} \
         (require chunk_size > 0 and overlap < chunk_size)"
    )]
    InvalidParams { chunk_size: usize, overlap: usize },

    #[error("document is empty or whitespace-only")]
    EmptyInput,
}

/// Splits documents into overlapping passages.
#[derive(Debug, Clone)]
pub struct ChunkingEngine {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingEngine {
    /// Create an engine, rejecting geometry the window algorithm cannot honor.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ChunkError::InvalidParams {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Configured passage length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Configured overlap between consecutive passages, in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into the ordered chunk sequence for `document_id`.
    ///
    /// The final chunk may be shorter than `chunk_size`; no chunk is ever
    /// empty.
    pub fn chunk(&self, document_id: &str, text: &str) -> Result<Vec<Chunk>, ChunkError> {
        if text.trim().is_empty() {
            return Err(ChunkError::EmptyInput);
        }

        // All window arithmetic runs over character offsets; the byte table
        // maps them back for slicing so multi-byte text never splits a char.
        let byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let total = byte_offsets.len();
        let byte_at = |char_pos: usize| -> usize {
            if char_pos == total {
                text.len()
            } else {
                byte_offsets[char_pos]
            }
        };
        let chars: Vec<char> = text.chars().collect();

        let tolerance = boundary_tolerance(self.chunk_size, self.overlap);
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut seq: u32 = 0;

        loop {
            let ideal_end = start + self.chunk_size;
            let end = if ideal_end >= total {
                total
            } else {
                select_end(&chars, start, ideal_end, tolerance, self.overlap)
            };

            chunks.push(Chunk {
                chunk_id: Chunk::make_id(document_id, seq),
                document_id: document_id.to_string(),
                sequence_index: seq,
                start,
                end,
                text: text[byte_at(start)..byte_at(end)].to_string(),
            });

            if end == total {
                break;
            }
            start = end - self.overlap;
            seq += 1;
        }

        debug!(
            document_id,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.overlap,
            "Document chunked"
        );
        Ok(chunks)
    }
}

/// How far before the hard cut the boundary search may reach.
///
/// Clamped so the window always advances past the shared overlap region,
/// which keeps every chunk non-empty and the walk terminating.
fn boundary_tolerance(chunk_size: usize, overlap: usize) -> usize {
    let tol = (chunk_size / 5).max(1);
    tol.min(chunk_size - overlap - 1)
}

/// Pick the chunk end: the latest boundary within `tolerance` characters
/// before the hard cut, else the hard cut itself.
fn select_end(
    chars: &[char],
    start: usize,
    ideal_end: usize,
    tolerance: usize,
    overlap: usize,
) -> usize {
    let floor = ideal_end.saturating_sub(tolerance).max(start + overlap + 1);
    for end in (floor..=ideal_end).rev() {
        if is_boundary(chars, end) {
            return end;
        }
    }
    ideal_end
}

/// A cut position right after sentence punctuation plus whitespace, or right
/// after a newline.
fn is_boundary(chars: &[char], pos: usize) -> bool {
    if pos == 0 {
        return false;
    }
    let prev = chars[pos - 1];
    if prev == '\n' {
        return true;
    }
    prev.is_whitespace() && pos >= 2 && matches!(chars[pos - 2], '.' | '!' | '?')
}
