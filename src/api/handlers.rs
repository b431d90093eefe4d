//! API route handlers
//!
//! Request handling for the retrieval endpoints:
//! - POST query: embed the query and return the ranked context bundle
//! - GET stats: active generation manifest projection
//! - GET health: process liveness from the stats reporter
//!
//! Serve-time failures are returned as structured envelope errors and never
//! terminate the process.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::index::IndexError;
use crate::retrieval::{RetrievalError, RetrievalService};
use crate::stats::{IndexStatus, StatsReporter};
use crate::types::ScoredPassage;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ServiceState {
    pub retrieval: Arc<RetrievalService>,
    pub stats: StatsReporter,
    /// k used when the request omits it.
    pub default_k: usize,
    /// Upper bound on requested k.
    pub max_k: usize,
}

// ============================================================================
// Request / response shapes
// ============================================================================

/// Body of POST /api/v1/query.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query_text: String,
    #[serde(default)]
    pub k: Option<usize>,
}

/// Ranked context bundle returned for a query.
#[derive(Debug, Serialize)]
pub struct QueryPayload {
    pub query_text: String,
    pub passages: Vec<ScoredPassage>,
    pub passages_found: usize,
}

/// Liveness payload for GET /health.
#[derive(Debug, Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    documents_indexed: usize,
    timestamp: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/query - retrieve ranked passages for a query.
pub async fn post_query(
    State(state): State<ServiceState>,
    Json(request): Json<QueryRequest>,
) -> Response {
    let k = request.k.unwrap_or(state.default_k).clamp(1, state.max_k);

    match state.retrieval.retrieve(&request.query_text, k).await {
        Ok(passages) => ApiResponse::ok(QueryPayload {
            query_text: request.query_text,
            passages_found: passages.len(),
            passages,
        }),
        Err(e) => retrieval_error_response(e),
    }
}

/// GET /api/v1/stats - active generation manifest projection.
pub async fn get_stats(State(state): State<ServiceState>) -> Response {
    ApiResponse::ok(state.stats.report())
}

/// GET /health - liveness check.
///
/// Always 200 while the process is up; an unbuilt index is reported in the
/// payload rather than as a failure, so orchestrators do not restart a
/// service that is merely waiting for its first ingestion.
pub async fn health_check(State(state): State<ServiceState>) -> Response {
    let stats = state.stats.report();
    let status = match stats.status {
        IndexStatus::Ready => "healthy",
        IndexStatus::Unbuilt => "awaiting_index",
    };
    Json(HealthPayload {
        status,
        service: "contexta",
        documents_indexed: stats.entry_count,
        timestamp: Utc::now().to_rfc3339(),
    })
    .into_response()
}

/// Map retrieval failures onto the envelope's structured error shape.
fn retrieval_error_response(err: RetrievalError) -> Response {
    match &err {
        RetrievalError::InvalidQuery => {
            ApiErrorResponse::bad_request("INVALID_QUERY", err.to_string())
        }
        RetrievalError::Index(IndexError::EmptyIndex) => ApiErrorResponse::service_unavailable(
            "EMPTY_INDEX",
            "no index generation has been built yet",
        ),
        RetrievalError::Index(IndexError::DimensionMismatch { .. }) => {
            warn!(error = %err, "Query embedding dimension does not match index");
            ApiErrorResponse::internal(err.to_string())
        }
        RetrievalError::Embed(_) => {
            warn!(error = %err, "Embedding provider failure during retrieval");
            ApiErrorResponse::bad_gateway("EMBEDDING_FAILED", err.to_string())
        }
        _ => {
            warn!(error = %err, "Retrieval failed");
            ApiErrorResponse::internal(err.to_string())
        }
    }
}
