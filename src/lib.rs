//! Contexta: semantic context retrieval engine
//!
//! Retrieval of semantically relevant passages from a fixed knowledge base,
//! for consumption by a downstream model-serving protocol.
//!
//! ## Architecture
//!
//! - **ChunkingEngine**: deterministic overlapping passage splitting
//! - **Embedder**: boundary contract to the external embedding capability
//! - **VectorIndex**: durable generations with atomic swap and cosine top-k
//! - **RetrievalService**: query embedding plus ranked passage serving
//! - **StatsReporter**: read-only manifest projection for health checks
//!
//! Build phase: knowledge-base text -> chunk -> embed -> index build.
//! Serve phase: query text -> embed -> search -> ranked context bundle.

pub mod api;
pub mod chunking;
pub mod config;
pub mod embedder;
pub mod index;
pub mod ingest;
pub mod retrieval;
pub mod stats;
pub mod types;

// Re-export configuration
pub use config::ServiceConfig;

// Re-export commonly used types
pub use types::{Chunk, IndexEntry, IndexManifest, QueryResult, ScoredPassage};

// Re-export core components
pub use chunking::{ChunkError, ChunkingEngine};
pub use embedder::{EmbedError, Embedder, HttpEmbedder};
pub use index::{IndexError, VectorIndex};
pub use ingest::{IngestError, IngestReport, IngestionPipeline};
pub use retrieval::{RetrievalError, RetrievalService};
pub use stats::{IndexStats, IndexStatus, StatsReporter};
