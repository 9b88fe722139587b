//! HTTP API route definitions.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{health, pause, pools, queue, ready, resume, status, trades, AppState};

/// Create the operator API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status and inspection
        .route("/api/v1/status", get(status))
        .route("/api/v1/chains/:chain_id/trades", get(trades))
        .route("/api/v1/chains/:chain_id/queue", get(queue))
        .route("/api/v1/chains/:chain_id/pools", get(pools))
        // Operator control
        .route("/api/v1/chains/:chain_id/pause", post(pause))
        .route("/api/v1/chains/:chain_id/resume", post(resume))
        .with_state(state)
}
