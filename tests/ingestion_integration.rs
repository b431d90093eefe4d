//! Ingestion Integration Tests
//!
//! Tests the full lifecycle: chunk a knowledge-base file, embed it through a
//! deterministic in-process provider, build a generation, and retrieve
//! against it - plus the failure paths that must leave a previously built
//! generation fully servable.

use contexta::chunking::ChunkingEngine;
use contexta::config::{BuildConflict, IndexConfig};
use contexta::embedder::{EmbedError, Embedder};
use contexta::index::VectorIndex;
use contexta::ingest::{IngestError, IngestionPipeline};
use contexta::retrieval::RetrievalService;
use contexta::types::IndexEntry;

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const CHUNK_SIZE: usize = 40;
const OVERLAP: usize = 8;
const BATCH_SIZE: usize = 2;

/// Deterministic embedder: a byte-frequency profile of the text, with an
/// optional call number from which every request fails.
struct ProfileEmbedder {
    calls: AtomicUsize,
    fail_from_call: Option<usize>,
}

impl ProfileEmbedder {
    fn reliable() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_call: None,
        }
    }

    fn failing_from(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_call: Some(call),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn profile(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 16];
        for b in text.bytes() {
            v[(b % 16) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for ProfileEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(fail_from) = self.fail_from_call {
            if call >= fail_from {
                return Err(EmbedError::Exhausted {
                    attempts: 3,
                    message: "injected provider outage".to_string(),
                });
            }
        }
        Ok(texts.iter().map(|t| Self::profile(t)).collect())
    }

    fn max_batch_size(&self) -> usize {
        BATCH_SIZE
    }

    fn provider_name(&self) -> &'static str {
        "profile-test"
    }
}

fn open_index(dir: &Path) -> Arc<VectorIndex> {
    Arc::new(
        VectorIndex::open(&IndexConfig {
            dir: dir.join("index"),
            max_generations: 3,
            build_conflict: BuildConflict::Reject,
        })
        .unwrap(),
    )
}

fn make_pipeline(index: &Arc<VectorIndex>, embedder: Arc<ProfileEmbedder>) -> IngestionPipeline {
    IngestionPipeline::new(
        ChunkingEngine::new(CHUNK_SIZE, OVERLAP).unwrap(),
        embedder,
        Arc::clone(index),
        BATCH_SIZE,
    )
}

const KNOWLEDGE_BASE: &str = "The gateway device supports two radio bands. \
    The indoor sensor reports temperature and humidity every minute. \
    Battery life reaches two years on a single cell. \
    The outdoor camera requires wired power and a weatherproof mount. \
    Firmware updates install automatically overnight.";

/// End-to-end: ingest a file, then retrieve ranked passages from it.
#[tokio::test]
async fn test_ingest_file_then_retrieve() {
    let tmp = TempDir::new().unwrap();
    let kb_path = tmp.path().join("knowledge_base.txt");
    std::fs::write(&kb_path, KNOWLEDGE_BASE).unwrap();

    let index = open_index(tmp.path());
    let embedder = Arc::new(ProfileEmbedder::reliable());
    let pipeline = make_pipeline(&index, Arc::clone(&embedder));

    let report = pipeline
        .ingest_file(&kb_path, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!report.skipped);
    assert!(report.chunks_embedded > 2, "expected several chunks");
    assert_eq!(report.manifest.entry_count, report.chunks_embedded);

    // Durable layout: CURRENT names exactly one completed generation.
    let index_dir = tmp.path().join("index");
    assert!(index_dir.join("CURRENT").exists());
    let generations: Vec<_> = std::fs::read_dir(index_dir.join("generations"))
        .unwrap()
        .collect();
    assert_eq!(generations.len(), 1);

    // Document ids come from the file stem.
    let service = RetrievalService::new(embedder, Arc::clone(&index));
    let passages = service
        .retrieve("battery life on a single cell", 3)
        .await
        .unwrap();
    assert!(!passages.is_empty());
    assert!(passages.iter().all(|p| p.document_id == "knowledge_base"));
    for pair in passages.windows(2) {
        assert!(pair[0].score >= pair[1].score, "scores must be non-increasing");
    }
}

/// An embedding failure on the final batch must leave the previously active
/// generation queryable and swap nothing in.
#[tokio::test]
async fn test_embedding_failure_on_final_batch_preserves_active_generation() {
    let tmp = TempDir::new().unwrap();
    let index = open_index(tmp.path());

    // First ingestion succeeds.
    let good = Arc::new(ProfileEmbedder::reliable());
    let pipeline = make_pipeline(&index, Arc::clone(&good));
    let first = pipeline
        .ingest_text("kb", KNOWLEDGE_BASE, &CancellationToken::new())
        .await
        .unwrap();

    // Second ingestion (different content) dies on its final batch.
    let updated = format!("{KNOWLEDGE_BASE} A brand new appendix about the hub.");
    let chunker = ChunkingEngine::new(CHUNK_SIZE, OVERLAP).unwrap();
    let total_batches = chunker
        .chunk("kb", &updated)
        .unwrap()
        .chunks(BATCH_SIZE)
        .count();
    let flaky = Arc::new(ProfileEmbedder::failing_from(total_batches));
    let failing_pipeline = make_pipeline(&index, Arc::clone(&flaky));

    let err = failing_pipeline
        .ingest_text("kb", &updated, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Embed(EmbedError::Exhausted { .. })));
    assert_eq!(flaky.calls(), total_batches, "failure hit the final batch");

    // The first generation is still active on disk and in memory.
    let stats = index.stats().unwrap();
    assert_eq!(stats.generation_id, first.manifest.generation_id);
    let service = RetrievalService::new(good, Arc::clone(&index));
    let passages = service.retrieve("indoor sensor reports", 2).await.unwrap();
    assert_eq!(passages.len(), 2);

    // No second generation appeared and nothing lingers in staging.
    let index_dir = tmp.path().join("index");
    let generations: Vec<_> = std::fs::read_dir(index_dir.join("generations"))
        .unwrap()
        .collect();
    assert_eq!(generations.len(), 1);
    let staged: Vec<_> = match std::fs::read_dir(index_dir.join("staging")) {
        Ok(entries) => entries.collect(),
        Err(_) => Vec::new(),
    };
    assert!(staged.is_empty(), "staging must not retain partial builds");
}

/// Re-ingesting identical content skips embedding entirely.
#[tokio::test]
async fn test_rebuild_skip_avoids_embedding_work() {
    let tmp = TempDir::new().unwrap();
    let index = open_index(tmp.path());
    let embedder = Arc::new(ProfileEmbedder::reliable());
    let pipeline = make_pipeline(&index, Arc::clone(&embedder));
    let cancel = CancellationToken::new();

    let first = pipeline.ingest_text("kb", KNOWLEDGE_BASE, &cancel).await.unwrap();
    let calls_after_first = embedder.calls();

    let second = pipeline.ingest_text("kb", KNOWLEDGE_BASE, &cancel).await.unwrap();
    assert!(second.skipped);
    assert_eq!(second.manifest.generation_id, first.manifest.generation_id);
    assert_eq!(embedder.calls(), calls_after_first, "skip must not re-embed");
}

/// Rebuilding from the same document and parameters reproduces the same
/// entry count and the same chunk text at every sequence position.
#[tokio::test]
async fn test_rebuild_is_deterministic() {
    let tmp = TempDir::new().unwrap();

    let mut runs: Vec<Vec<(u32, String)>> = Vec::new();
    for run in 0..2 {
        let index = open_index(&tmp.path().join(format!("run-{run}")));
        let embedder = Arc::new(ProfileEmbedder::reliable());
        let pipeline = make_pipeline(&index, embedder);
        pipeline
            .ingest_text("kb", KNOWLEDGE_BASE, &CancellationToken::new())
            .await
            .unwrap();

        let generation = index.active_generation().unwrap();
        let mut texts: Vec<(u32, String)> = (0..generation.entry_count() as u32)
            .map(|seq| {
                let entry = generation
                    .entry(&contexta::types::Chunk::make_id("kb", seq))
                    .unwrap();
                (seq, entry.chunk_text.clone())
            })
            .collect();
        texts.sort_by_key(|(seq, _)| *seq);
        runs.push(texts);
    }

    assert_eq!(runs[0].len(), runs[1].len());
    assert_eq!(runs[0], runs[1]);
}

/// An empty knowledge-base file fails ingestion and creates no index
/// directory or manifest.
#[tokio::test]
async fn test_empty_file_creates_nothing() {
    let tmp = TempDir::new().unwrap();
    let kb_path = tmp.path().join("empty.txt");
    std::fs::write(&kb_path, "").unwrap();

    let index = open_index(tmp.path());
    let pipeline = make_pipeline(&index, Arc::new(ProfileEmbedder::reliable()));

    let err = pipeline
        .ingest_file(&kb_path, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Chunk(contexta::chunking::ChunkError::EmptyInput)
    ));

    let index_dir = tmp.path().join("index");
    assert!(!index_dir.join("CURRENT").exists());
    assert!(!index_dir.join("generations").exists());
    assert!(index.stats().is_none());
}

/// Retrieval with k larger than the index returns every entry, ranked.
#[tokio::test]
async fn test_retrieve_with_k_beyond_entry_count() {
    let tmp = TempDir::new().unwrap();
    let index = open_index(tmp.path());

    let entries = vec![
        IndexEntry {
            chunk_id: "kb:000000".to_string(),
            vector: ProfileEmbedder::profile("first passage"),
            chunk_text: "first passage".to_string(),
            document_id: "kb".to_string(),
            sequence_index: 0,
        },
        IndexEntry {
            chunk_id: "kb:000001".to_string(),
            vector: ProfileEmbedder::profile("second passage"),
            chunk_text: "second passage".to_string(),
            document_id: "kb".to_string(),
            sequence_index: 1,
        },
    ];
    index.build(entries, "two-entries").await.unwrap();

    let service = RetrievalService::new(Arc::new(ProfileEmbedder::reliable()), Arc::clone(&index));
    let passages = service.retrieve("first passage", 5).await.unwrap();
    assert_eq!(passages.len(), 2);
    assert_eq!(passages[0].chunk_text, "first passage");
    assert!(passages[0].score >= passages[1].score);
}

/// A reader holding the previous generation keeps serving it while a new
/// one is ingested and swapped in.
#[tokio::test]
async fn test_build_and_serve_run_concurrently() {
    let tmp = TempDir::new().unwrap();
    let index = open_index(tmp.path());
    let embedder = Arc::new(ProfileEmbedder::reliable());
    let pipeline = make_pipeline(&index, Arc::clone(&embedder));
    let cancel = CancellationToken::new();

    pipeline.ingest_text("kb", KNOWLEDGE_BASE, &cancel).await.unwrap();
    let held = index.active_generation().unwrap();
    let held_count = held.entry_count();

    let updated = format!("{KNOWLEDGE_BASE} Extra material that changes the checksum.");
    pipeline.ingest_text("kb", &updated, &cancel).await.unwrap();

    // The pinned snapshot is unchanged; fresh readers see the new generation.
    assert_eq!(held.entry_count(), held_count);
    let fresh = index.active_generation().unwrap();
    assert!(fresh.entry_count() >= held_count);
    assert_ne!(
        fresh.manifest().generation_id,
        held.manifest().generation_id
    );
}
