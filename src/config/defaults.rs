//! System-wide default constants.
//!
//! Centralises the tunable values used when no configuration file is present.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Chunking
// ============================================================================

/// Passage length in characters.
pub const CHUNK_SIZE: usize = 500;

/// Characters shared between consecutive passages.
pub const OVERLAP: usize = 50;

// ============================================================================
// Embedding
// ============================================================================

/// Maximum texts submitted per embedding request.
pub const EMBEDDING_BATCH_SIZE: usize = 32;

/// Default OpenAI-compatible embeddings endpoint.
pub const EMBEDDING_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model identifier.
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Environment variable holding the provider API key.
pub const EMBEDDING_API_KEY_ENV: &str = "CONTEXTA_EMBEDDING_API_KEY";

/// Seconds before an embedding request times out.
///
/// A timed-out request counts as a retryable failure, never an
/// indefinite hang.
pub const EMBEDDING_TIMEOUT_SECS: u64 = 30;

/// Retry attempts for transient embedding failures.
pub const EMBEDDING_MAX_RETRIES: usize = 3;

/// Base delay for exponential retry backoff (milliseconds).
///
/// Attempt n sleeps `backoff_base_ms << n`, so 250 ms doubles to
/// 500 ms then 1 s across the default three attempts.
pub const EMBEDDING_BACKOFF_BASE_MS: u64 = 250;

// ============================================================================
// Retrieval
// ============================================================================

/// Passages returned when the caller does not override k.
pub const DEFAULT_K: usize = 3;

/// Maximum k accepted per request.
pub const MAX_K: usize = 12;

// ============================================================================
// Index
// ============================================================================

/// Directory holding index generations.
pub const INDEX_DIR: &str = "./contexta_index";

/// Completed generations kept on disk after a successful build.
///
/// The active generation is never pruned.
pub const MAX_GENERATIONS: usize = 4;

// ============================================================================
// Server
// ============================================================================

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8001";
