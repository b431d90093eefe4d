//! API route definitions
//!
//! Organizes endpoints for the retrieval service:
//! - /api/v1/query - ranked context retrieval
//! - /api/v1/stats - index manifest projection
//! - /health - process liveness (root level, for container health checks)

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ServiceState};

/// Create all /api/v1 routes.
pub fn api_routes(state: ServiceState) -> Router {
    Router::new()
        .route("/query", post(handlers::post_query))
        .route("/stats", get(handlers::get_stats))
        .with_state(state)
}

/// Root-level liveness endpoint.
pub fn health_routes(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
