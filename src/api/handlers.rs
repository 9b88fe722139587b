//! HTTP API handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::coordinator::ChainHandle;
use crate::executor::{ExecutionRecord, ExecutorStats};
use crate::mirror::PoolState;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether all chains finished startup.
    pub ready: Arc<AtomicBool>,
    /// Per-chain handles.
    pub chains: Arc<HashMap<u64, ChainHandle>>,
}

impl AppState {
    /// Create app state over the given chain handles.
    pub fn new(chains: HashMap<u64, ChainHandle>) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            chains: Arc::new(chains),
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the engine is ready.
    pub ready: bool,
    /// Enabled chain ids.
    pub chains: Vec<u64>,
}

/// Per-chain block of the status response.
#[derive(Debug, Serialize)]
pub struct ChainStatus {
    /// Chain id.
    pub chain_id: u64,
    /// Pause flag.
    pub paused: bool,
    /// Pending opportunities.
    pub queue_len: usize,
    /// Mirrored pools.
    pub pools_mirrored: usize,
    /// Running loss in the current window, in wei.
    pub running_loss_wei: String,
    /// Executor counters.
    pub stats: ExecutorStats,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Per-chain details.
    pub chains: Vec<ChainStatus>,
}

/// One pending queue entry in the queue response.
#[derive(Debug, Serialize)]
pub struct QueueEntry {
    /// Ordered pool sequence identity.
    pub key: String,
    /// Cycle length.
    pub cycle_len: usize,
    /// Input amount in wei.
    pub input_amount: String,
    /// Quoted profit in wei.
    pub expected_profit: String,
    /// Confidence heuristic.
    pub confidence: f64,
    /// Detection time.
    pub detected_at: OffsetDateTime,
    /// Expiry time.
    pub expires_at: OffsetDateTime,
}

/// One pool in the pools response.
#[derive(Debug, Serialize)]
pub struct PoolEntry {
    /// Pool address.
    pub address: String,
    /// Dex identifier.
    pub dex: Option<String>,
    /// Mirrored snapshot.
    pub state: PoolState,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness handler - returns 200 once startup finished, 503 before.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let response = ReadyResponse {
        ready: state.is_ready(),
        chains: state.chains.keys().copied().collect(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - per-chain pause state, queue depth and counters.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let mut chains: Vec<ChainStatus> = state
        .chains
        .values()
        .map(|handle| ChainStatus {
            chain_id: handle.chain_id,
            paused: handle.paused.load(Ordering::SeqCst),
            queue_len: handle.queue.len(),
            pools_mirrored: handle.mirror.len(),
            running_loss_wei: handle
                .loss_tracker
                .lock()
                .expect("loss tracker lock poisoned")
                .running_loss()
                .to_string(),
            stats: handle.stats.read().expect("stats lock poisoned").clone(),
        })
        .collect();
    chains.sort_by_key(|c| c.chain_id);

    let status = if state.is_ready() { "running" } else { "starting" };
    Json(StatusResponse { status, chains })
}

/// Recent trades of one chain.
pub async fn trades(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> Result<Json<Vec<ExecutionRecord>>, StatusCode> {
    let handle = state.chains.get(&chain_id).ok_or(StatusCode::NOT_FOUND)?;
    let history = handle.history.lock().expect("history lock poisoned");
    Ok(Json(history.iter().cloned().collect()))
}

/// Pending opportunity queue of one chain.
pub async fn queue(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> Result<Json<Vec<QueueEntry>>, StatusCode> {
    let handle = state.chains.get(&chain_id).ok_or(StatusCode::NOT_FOUND)?;
    let entries = handle
        .queue
        .pending()
        .into_iter()
        .map(|o| QueueEntry {
            key: o.key(),
            cycle_len: o.cycle_len(),
            input_amount: o.input_amount.to_string(),
            expected_profit: o.expected_profit.to_string(),
            confidence: o.confidence,
            detected_at: o.detected_at,
            expires_at: o.expires_at,
        })
        .collect();
    Ok(Json(entries))
}

/// Mirrored pool snapshots of one chain.
pub async fn pools(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> Result<Json<Vec<PoolEntry>>, StatusCode> {
    let handle = state.chains.get(&chain_id).ok_or(StatusCode::NOT_FOUND)?;
    let entries = handle
        .mirror
        .snapshots()
        .into_iter()
        .map(|(address, pool_state)| PoolEntry {
            address: format!("{address:#x}"),
            dex: handle.registry.pool(&address).map(|p| p.dex.clone()),
            state: pool_state,
        })
        .collect();
    Ok(Json(entries))
}

/// Pause one chain: the pipeline stops dequeuing, in-flight work finishes.
pub async fn pause(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> Result<StatusCode, StatusCode> {
    let handle = state.chains.get(&chain_id).ok_or(StatusCode::NOT_FOUND)?;
    handle.paused.store(true, Ordering::SeqCst);
    info!(chain = chain_id, "chain paused by operator");
    Ok(StatusCode::NO_CONTENT)
}

/// Resume one chain: clears the loss accumulator and the pause flag.
pub async fn resume(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> Result<StatusCode, StatusCode> {
    let handle = state.chains.get(&chain_id).ok_or(StatusCode::NOT_FOUND)?;
    handle
        .loss_tracker
        .lock()
        .expect("loss tracker lock poisoned")
        .clear();
    handle.paused.store(false, Ordering::SeqCst);
    info!(chain = chain_id, "chain resumed by operator");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::new(HashMap::new());
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
