//! Contexta - Semantic Context Retrieval Engine
//!
//! Ingests a knowledge-base text file into a durable vector index and serves
//! ranked context passages over HTTP for a downstream model-serving protocol.
//!
//! # Usage
//!
//! ```bash
//! # Build the index from a knowledge base file
//! contexta ingest knowledge_base.txt
//!
//! # Serve retrieval queries
//! contexta serve
//!
//! # Inspect the active index generation without rebuilding
//! contexta stats
//!
//! # Delete every index generation
//! contexta clear --yes
//! ```
//!
//! # Environment Variables
//!
//! - `CONTEXTA_CONFIG`: path to the TOML config file (default: ./contexta.toml)
//! - `CONTEXTA_EMBEDDING_API_KEY`: embedding provider API key (name is
//!   configurable via `embedding.api_key_env`)
//! - `CONTEXTA_CORS_ORIGINS`: comma-separated allowed CORS origins
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use contexta::api::{create_app, ServiceState};
use contexta::chunking::ChunkingEngine;
use contexta::config::ServiceConfig;
use contexta::embedder::{Embedder, HttpEmbedder};
use contexta::index::VectorIndex;
use contexta::ingest::IngestionPipeline;
use contexta::retrieval::RetrievalService;
use contexta::stats::StatsReporter;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "contexta")]
#[command(about = "Semantic context retrieval engine")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Serve retrieval queries over HTTP
    Serve {
        /// Override the server address (default from config, e.g. "0.0.0.0:8001")
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Ingest a knowledge-base text file: chunk, embed and build the index
    Ingest {
        /// Path to the knowledge-base text file
        file: PathBuf,
    },

    /// Report the active index generation without rebuilding
    Stats,

    /// Delete every index generation and the active pointer
    Clear {
        /// Confirm the deletion (refused without this flag)
        #[arg(long)]
        yes: bool,
    },
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let config = ServiceConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command {
        SubCommand::Serve { addr } => serve(config, addr).await,
        SubCommand::Ingest { file } => ingest(config, &file).await,
        SubCommand::Stats => stats(config),
        SubCommand::Clear { yes } => clear(config, yes),
    }
}

/// Build the embedding provider from config plus the key env var.
fn build_embedder(config: &ServiceConfig) -> Result<Arc<dyn Embedder>> {
    let api_key = config.embedding_api_key();
    let embedder = HttpEmbedder::new(&config.embedding, api_key.as_deref())
        .context("failed to build embedding client")?;
    Ok(Arc::new(embedder))
}

// ============================================================================
// Subcommands
// ============================================================================

async fn serve(config: ServiceConfig, addr_override: Option<String>) -> Result<()> {
    let index = Arc::new(VectorIndex::open(&config.index).context("failed to open vector index")?);
    let embedder = build_embedder(&config)?;

    let state = ServiceState {
        retrieval: Arc::new(RetrievalService::new(embedder, Arc::clone(&index))),
        stats: StatsReporter::new(Arc::clone(&index)),
        default_k: config.retrieval.default_k,
        max_k: config.retrieval.max_k,
    };
    let app = create_app(state);

    let addr = addr_override.unwrap_or_else(|| config.server.addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    if index.stats().is_none() {
        tracing::warn!("Index is unbuilt - run `contexta ingest <file>` to populate it");
    }
    info!(addr = %addr, "Contexta retrieval server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn ingest(config: ServiceConfig, file: &std::path::Path) -> Result<()> {
    let index = Arc::new(VectorIndex::open(&config.index).context("failed to open vector index")?);
    let embedder = build_embedder(&config)?;
    let chunker = ChunkingEngine::new(config.chunking.chunk_size, config.chunking.overlap)
        .context("invalid chunking configuration")?;
    let pipeline = IngestionPipeline::new(
        chunker,
        embedder,
        Arc::clone(&index),
        config.embedding.batch_size,
    );

    // Ctrl-C cancels between embedding batches; the served index is
    // untouched either way.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let report = pipeline
        .ingest_file(file, &cancel)
        .await
        .with_context(|| format!("ingestion of {} failed", file.display()))?;

    if report.skipped {
        info!(
            generation = %report.manifest.generation_id,
            "Source unchanged - existing index generation kept"
        );
    } else {
        info!(
            generation = %report.manifest.generation_id,
            chunks = report.chunks_embedded,
            elapsed_ms = report.elapsed_ms,
            "Ingestion finished"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report.manifest)?);
    Ok(())
}

fn stats(config: ServiceConfig) -> Result<()> {
    let index = Arc::new(VectorIndex::open(&config.index).context("failed to open vector index")?);
    let report = StatsReporter::new(index).report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn clear(config: ServiceConfig, yes: bool) -> Result<()> {
    anyhow::ensure!(
        yes,
        "clearing deletes every index generation under {} - re-run with --yes to confirm",
        config.index.dir.display()
    );
    let index = VectorIndex::open(&config.index).context("failed to open vector index")?;
    index.clear().context("failed to clear index")?;
    info!(dir = %config.index.dir.display(), "Index cleared");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received - draining connections");
}
