//! Read-only index statistics for health checks and the stats CLI mode
//!
//! A pure projection of the active generation's manifest. Holds no state of
//! its own - two reporters over the same index always agree.

use crate::index::VectorIndex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Whether the index can currently serve queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// An active generation exists and is servable.
    Ready,
    /// No generation has been built yet.
    Unbuilt,
}

/// Snapshot of the active generation for liveness and verification checks.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub status: IndexStatus,
    pub entry_count: usize,
    pub embedding_dimension: usize,
    pub generation_id: Option<String>,
    pub build_timestamp: Option<DateTime<Utc>>,
    pub source_checksum: Option<String>,
}

/// Read-only view over the index's current manifest.
#[derive(Clone)]
pub struct StatsReporter {
    index: Arc<VectorIndex>,
}

impl StatsReporter {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    /// Project the active manifest into a stats snapshot.
    pub fn report(&self) -> IndexStats {
        match self.index.stats() {
            Some(manifest) => IndexStats {
                status: IndexStatus::Ready,
                entry_count: manifest.entry_count,
                embedding_dimension: manifest.embedding_dimension,
                generation_id: Some(manifest.generation_id),
                build_timestamp: Some(manifest.build_timestamp),
                source_checksum: Some(manifest.source_checksum),
            },
            None => IndexStats {
                status: IndexStatus::Unbuilt,
                entry_count: 0,
                embedding_dimension: 0,
                generation_id: None,
                build_timestamp: None,
                source_checksum: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildConflict, IndexConfig};
    use crate::types::IndexEntry;

    fn open_index(dir: &std::path::Path) -> Arc<VectorIndex> {
        Arc::new(
            VectorIndex::open(&IndexConfig {
                dir: dir.to_path_buf(),
                max_generations: 2,
                build_conflict: BuildConflict::Reject,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_unbuilt_index_reports_unbuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let reporter = StatsReporter::new(open_index(tmp.path()));

        let stats = reporter.report();
        assert_eq!(stats.status, IndexStatus::Unbuilt);
        assert_eq!(stats.entry_count, 0);
        assert!(stats.generation_id.is_none());
    }

    #[tokio::test]
    async fn test_report_reflects_active_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_index(tmp.path());
        index
            .build(
                vec![IndexEntry {
                    chunk_id: "kb:000000".to_string(),
                    vector: vec![1.0, 2.0, 3.0],
                    chunk_text: "passage".to_string(),
                    document_id: "kb".to_string(),
                    sequence_index: 0,
                }],
                "checksum-a",
            )
            .await
            .unwrap();

        let stats = StatsReporter::new(Arc::clone(&index)).report();
        assert_eq!(stats.status, IndexStatus::Ready);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.embedding_dimension, 3);
        assert_eq!(stats.source_checksum.as_deref(), Some("checksum-a"));
    }
}
