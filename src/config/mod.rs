//! Service Configuration Module
//!
//! Provides deployment configuration loaded from TOML files. Every tunable
//! maps to exactly one algorithm in the pipeline: chunking geometry, embedding
//! batching/retry policy, retrieval k bounds, index directory and build
//! conflict policy, and the server bind address.
//!
//! ## Loading Order
//!
//! 1. Explicit `--config` path from the CLI
//! 2. `CONTEXTA_CONFIG` environment variable (path to TOML file)
//! 3. `contexta.toml` in the current working directory
//! 4. Built-in defaults
//!
//! Each struct implements `Default` with values matching the built-in
//! constants, so a partial config file only overrides what it names.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors surfaced at startup, before any pipeline runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a retrieval deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Chunking geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Passage length in characters. Must be > 0.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive passages. Must be < chunk_size.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            overlap: defaults::OVERLAP,
        }
    }
}

/// Embedding provider endpoint and batching/retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible `/embeddings` endpoint URL.
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    /// Embedding model identifier sent to the provider.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Maximum texts per embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts before a transient failure becomes fatal.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::EMBEDDING_ENDPOINT.to_string(),
            model: defaults::EMBEDDING_MODEL.to_string(),
            api_key_env: defaults::EMBEDDING_API_KEY_ENV.to_string(),
            batch_size: defaults::EMBEDDING_BATCH_SIZE,
            timeout_secs: defaults::EMBEDDING_TIMEOUT_SECS,
            max_retries: defaults::EMBEDDING_MAX_RETRIES,
            backoff_base_ms: defaults::EMBEDDING_BACKOFF_BASE_MS,
        }
    }
}

/// Retrieval k bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages returned when the caller omits k.
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Upper bound on k per request.
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: defaults::DEFAULT_K,
            max_k: defaults::MAX_K,
        }
    }
}

/// What a second concurrent build attempt does while one is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConflict {
    /// Fail fast with a build-in-progress error.
    Reject,
    /// Wait for the in-flight build to finish, then run.
    Queue,
}

/// Index directory and generation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root directory for all index generations.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    /// Completed generations kept after a successful build.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Concurrent build conflict policy.
    #[serde(default = "default_build_conflict")]
    pub build_conflict: BuildConflict,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::INDEX_DIR),
            max_generations: defaults::MAX_GENERATIONS,
            build_conflict: BuildConflict::Reject,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, host:port.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl ServiceConfig {
    /// Load configuration, searching the standard locations.
    ///
    /// `explicit_path` wins when given; otherwise `CONTEXTA_CONFIG`, then
    /// `./contexta.toml`, then built-in defaults. The result is always
    /// validated.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = if let Some(path) = explicit_path {
            Self::load_from_file(path)?
        } else if let Ok(env_path) = std::env::var("CONTEXTA_CONFIG") {
            Self::load_from_file(Path::new(&env_path))?
        } else {
            let cwd_path = Path::new("contexta.toml");
            if cwd_path.exists() {
                Self::load_from_file(cwd_path)?
            } else {
                info!("No config file found - using built-in defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load and parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Reject configurations that would make the pipeline misbehave later.
    ///
    /// Invalid chunking geometry is a startup error, not a runtime surprise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be less than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if self.embedding.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "embedding.max_retries must be at least 1".to_string(),
            ));
        }
        if self.retrieval.default_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.default_k must be at least 1".to_string(),
            ));
        }
        if self.retrieval.max_k < self.retrieval.default_k {
            return Err(ConfigError::Invalid(format!(
                "retrieval.max_k ({}) must be >= retrieval.default_k ({})",
                self.retrieval.max_k, self.retrieval.default_k
            )));
        }
        if self.index.max_generations == 0 {
            return Err(ConfigError::Invalid(
                "index.max_generations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the embedding API key from the configured environment variable.
    ///
    /// Returns None when unset - local providers (e.g. an Ollama-compatible
    /// endpoint) accept unauthenticated requests.
    pub fn embedding_api_key(&self) -> Option<String> {
        match std::env::var(&self.embedding.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                warn!(
                    var = %self.embedding.api_key_env,
                    "Embedding API key env var unset or empty - sending unauthenticated requests"
                );
                None
            }
        }
    }
}

fn default_chunk_size() -> usize {
    defaults::CHUNK_SIZE
}
fn default_overlap() -> usize {
    defaults::OVERLAP
}
fn default_embedding_endpoint() -> String {
    defaults::EMBEDDING_ENDPOINT.to_string()
}
fn default_embedding_model() -> String {
    defaults::EMBEDDING_MODEL.to_string()
}
fn default_api_key_env() -> String {
    defaults::EMBEDDING_API_KEY_ENV.to_string()
}
fn default_batch_size() -> usize {
    defaults::EMBEDDING_BATCH_SIZE
}
fn default_timeout_secs() -> u64 {
    defaults::EMBEDDING_TIMEOUT_SECS
}
fn default_max_retries() -> usize {
    defaults::EMBEDDING_MAX_RETRIES
}
fn default_backoff_base_ms() -> u64 {
    defaults::EMBEDDING_BACKOFF_BASE_MS
}
fn default_k() -> usize {
    defaults::DEFAULT_K
}
fn default_max_k() -> usize {
    defaults::MAX_K
}
fn default_index_dir() -> PathBuf {
    PathBuf::from(defaults::INDEX_DIR)
}
fn default_max_generations() -> usize {
    defaults::MAX_GENERATIONS
}
fn default_build_conflict() -> BuildConflict {
    BuildConflict::Reject
}
fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}
