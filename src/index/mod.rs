//! Durable vector index with atomically swapped generations
//!
//! The index owns every entry of its current generation. Builds are
//! copy-on-write: a new generation is staged under `staging/`, made durable,
//! renamed into `generations/`, recorded in the CURRENT pointer, and only
//! then swapped into the in-memory handle. Readers hold cheap `Arc` clones of
//! the active generation through an [`arc_swap::ArcSwapOption`], so serving
//! never blocks on a rebuild and a crash mid-build leaves the previous
//! generation fully servable.

pub mod generation;
pub mod layout;

pub use generation::Generation;
pub use layout::IndexLayout;

use crate::config::{BuildConflict, IndexConfig};
use crate::types::{IndexEntry, IndexManifest, QueryResult};
use arc_swap::ArcSwapOption;
use chrono::Utc;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Vector index errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index is empty - no generation has been built")]
    EmptyIndex,

    #[error("query vector dimension {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("another build is already in progress")]
    BuildInProgress,

    #[error("refusing to build a generation with no entries")]
    NoEntries,

    #[error("corrupt generation data: {0}")]
    Corrupt(String),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Monotonic suffix distinguishing builds within one timestamp tick.
static BUILD_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_generation_id() -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    let seq = BUILD_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("gen-{stamp}-{seq:04}")
}

/// Durable store of passage vectors with nearest-neighbor search.
pub struct VectorIndex {
    layout: IndexLayout,
    /// The currently active generation; None until the first successful build.
    active: ArcSwapOption<Generation>,
    /// Single-writer discipline: at most one build mutates the store at a time.
    build_lock: Mutex<()>,
    conflict: BuildConflict,
    max_generations: usize,
}

impl VectorIndex {
    /// Open an index rooted at the configured directory, loading the active
    /// generation named by CURRENT when one exists.
    ///
    /// Opening never creates directories - an index that was never built
    /// leaves no trace on disk. A damaged active generation is logged and
    /// skipped so serving can start (unbuilt) instead of crash-looping.
    pub fn open(config: &IndexConfig) -> Result<Self, IndexError> {
        let layout = IndexLayout::new(config.dir.clone());

        let active = match layout.read_current()? {
            Some(generation_id) => {
                match Generation::load(&layout.generation_dir(&generation_id)) {
                    Ok(generation) => {
                        info!(
                            generation = %generation_id,
                            entries = generation.entry_count(),
                            dimension = generation.manifest().embedding_dimension,
                            "Loaded active index generation"
                        );
                        Some(Arc::new(generation))
                    }
                    Err(e) => {
                        warn!(
                            generation = %generation_id,
                            error = %e,
                            "Active generation failed to load - starting unbuilt"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Self {
            layout,
            active: ArcSwapOption::new(active),
            build_lock: Mutex::new(()),
            conflict: config.build_conflict,
            max_generations: config.max_generations,
        })
    }

    /// Read-only handle to the active generation, if any.
    ///
    /// The returned `Arc` stays valid even if a newer generation swaps in
    /// while the caller is still scoring against it.
    pub fn active_generation(&self) -> Option<Arc<Generation>> {
        self.active.load_full()
    }

    /// Active generation's manifest, or None when never built.
    pub fn stats(&self) -> Option<IndexManifest> {
        self.active_generation().map(|g| g.manifest().clone())
    }

    /// Source checksum of the active generation, for rebuild-skip checks.
    pub fn active_checksum(&self) -> Option<String> {
        self.active_generation()
            .map(|g| g.manifest().source_checksum.clone())
    }

    /// Build a new generation from a complete entry set and swap it in.
    ///
    /// The write order is staging -> durable -> rename -> CURRENT -> memory
    /// swap; a failure or crash at any point before the rename leaves the
    /// previous generation untouched and servable. When the incoming
    /// `source_checksum` matches the active generation, the build is a no-op
    /// returning the existing manifest.
    pub async fn build(
        &self,
        entries: Vec<IndexEntry>,
        source_checksum: &str,
    ) -> Result<IndexManifest, IndexError> {
        let _guard = match self.conflict {
            BuildConflict::Reject => self
                .build_lock
                .try_lock()
                .map_err(|_| IndexError::BuildInProgress)?,
            BuildConflict::Queue => self.build_lock.lock().await,
        };

        if let Some(manifest) = self.stats() {
            if manifest.source_checksum == source_checksum {
                info!(
                    generation = %manifest.generation_id,
                    checksum = %source_checksum,
                    "Source unchanged - keeping active generation"
                );
                return Ok(manifest);
            }
        }

        if entries.is_empty() {
            return Err(IndexError::NoEntries);
        }
        let dimension = entries[0].vector.len();
        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    got: entry.vector.len(),
                });
            }
        }

        let generation_id = next_generation_id();
        let manifest = IndexManifest {
            generation_id: generation_id.clone(),
            entry_count: entries.len(),
            embedding_dimension: dimension,
            build_timestamp: Utc::now(),
            source_checksum: source_checksum.to_string(),
        };

        let staging = self.layout.staging_generation_dir(&generation_id);
        if let Err(e) = Generation::persist(&staging, &manifest, &entries) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        fs::create_dir_all(self.layout.generations_dir())?;
        let final_dir = self.layout.generation_dir(&generation_id);
        fs::rename(&staging, &final_dir)?;
        self.layout.write_current(&generation_id)?;

        let generation = Generation::from_parts(manifest.clone(), entries);
        self.active.store(Some(Arc::new(generation)));

        match self
            .layout
            .prune_generations(self.max_generations, &generation_id)
        {
            Ok(removed) if removed > 0 => {
                info!(removed, keep = self.max_generations, "Pruned old index generations");
            }
            Err(e) => warn!(error = %e, "Failed to prune old generations"),
            _ => {}
        }

        info!(
            generation = %generation_id,
            entries = manifest.entry_count,
            dimension,
            checksum = %source_checksum,
            "Index generation built and swapped in"
        );
        Ok(manifest)
    }

    /// Rank the active generation's entries against `query_vector`.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<QueryResult>, IndexError> {
        let generation = self.active_generation().ok_or(IndexError::EmptyIndex)?;
        generation.search(query_vector, k)
    }

    /// Drop the in-memory handle and delete every generation on disk.
    pub fn clear(&self) -> Result<(), IndexError> {
        self.active.store(None);
        self.layout.clear()?;
        info!(root = %self.layout.root().display(), "Index cleared");
        Ok(())
    }

    /// Directory this index persists under.
    pub fn root(&self) -> &std::path::Path {
        self.layout.root()
    }
}
