//! One immutable index generation
//!
//! A generation is the unit of atomic swap: a complete entry set plus its
//! manifest, persisted under one directory and loaded fully into memory for
//! serving. Generations are copy-on-write - once built they are never
//! mutated, so any number of readers can score against one while a newer
//! generation is being staged.

use super::layout::IndexLayout;
use super::IndexError;
use crate::types::{IndexEntry, IndexManifest, QueryResult};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A complete, servable index generation.
pub struct Generation {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
    by_id: HashMap<String, usize>,
}

impl Generation {
    /// Assemble a generation from freshly built parts.
    pub fn from_parts(manifest: IndexManifest, entries: Vec<IndexEntry>) -> Self {
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.chunk_id.clone(), i))
            .collect();
        Self {
            manifest,
            entries,
            by_id,
        }
    }

    /// Load a persisted generation from its directory.
    ///
    /// Validates that the entry file matches the manifest's declared count and
    /// dimension, so a torn or foreign directory is rejected rather than
    /// served.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let manifest_text = fs::read_to_string(IndexLayout::manifest_path(dir))?;
        let manifest: IndexManifest = toml::from_str(&manifest_text)
            .map_err(|e| IndexError::Corrupt(format!("unreadable manifest: {e}")))?;

        let file = fs::File::open(IndexLayout::entries_path(dir))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::with_capacity(manifest.entry_count);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: IndexEntry = serde_json::from_str(&line).map_err(|e| {
                IndexError::Corrupt(format!("bad entry at line {}: {e}", line_no + 1))
            })?;
            if entry.vector.len() != manifest.embedding_dimension {
                return Err(IndexError::Corrupt(format!(
                    "entry {} has dimension {}, manifest declares {}",
                    entry.chunk_id,
                    entry.vector.len(),
                    manifest.embedding_dimension
                )));
            }
            entries.push(entry);
        }

        if entries.len() != manifest.entry_count {
            return Err(IndexError::Corrupt(format!(
                "entry file holds {} entries, manifest declares {}",
                entries.len(),
                manifest.entry_count
            )));
        }

        Ok(Self::from_parts(manifest, entries))
    }

    /// Write a generation's files into `dir`, fsyncing before returning.
    ///
    /// The caller stages `dir` outside the served tree and renames it in
    /// afterwards; by the time the rename happens every byte is durable.
    pub fn persist(
        dir: &Path,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;

        let entries_file = fs::File::create(IndexLayout::entries_path(dir))?;
        let mut writer = BufWriter::new(entries_file);
        for entry in entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| IndexError::Corrupt(format!("unencodable entry: {e}")))?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        let manifest_text = toml::to_string_pretty(manifest)
            .map_err(|e| IndexError::Corrupt(format!("unencodable manifest: {e}")))?;
        let mut manifest_file = fs::File::create(IndexLayout::manifest_path(dir))?;
        manifest_file.write_all(manifest_text.as_bytes())?;
        manifest_file.sync_all()?;
        Ok(())
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Look up an entry by chunk id.
    pub fn entry(&self, chunk_id: &str) -> Option<&IndexEntry> {
        self.by_id.get(chunk_id).map(|&i| &self.entries[i])
    }

    /// Rank all entries against `query` by cosine similarity.
    ///
    /// Returns min(k, entry_count) results ordered by descending score, ties
    /// broken by ascending chunk id. Scoring fans out across entries with
    /// rayon; the sort is a full deterministic ordering.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<QueryResult>, IndexError> {
        if self.entries.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        if query.len() != self.manifest.embedding_dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.embedding_dimension,
                got: query.len(),
            });
        }

        let mut results: Vec<QueryResult> = self
            .entries
            .par_iter()
            .map(|entry| QueryResult {
                chunk_id: entry.chunk_id.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        results.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(k.min(results.len()));
        Ok(results)
    }
}

/// Cosine similarity between two equal-length vectors.
///
/// A zero-norm vector scores 0.0 against everything.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
