//! Health and infrastructure handlers
//!
//! Kubernetes probes, metrics, and the snapshot admin trigger. The service
//! stays ready while the breaker is open: reads keep flowing from the
//! fallback tiers, which is the whole point of them.

use axum::{extract::State, http::StatusCode, response::Json};

use super::state::AppState;
use super::types::SnapshotRebuildResponse;
use crate::errors::AppError;
use crate::metrics;

/// Health response for the main health endpoint
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub breaker_state: &'static str,
    pub pending_writes: usize,
}

/// Main health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let breaker = state.engine.health().state();
    let pending = state.engine.pending().len();

    Json(HealthResponse {
        status: if state.engine.health().is_healthy() {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        breaker_state: breaker.as_str(),
        pending_writes: pending,
    })
}

/// Liveness probe - process alive and not deadlocked
pub async fn health_live() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Readiness probe - can handle traffic. Degraded-but-serving (breaker
/// open, fallbacks active) still reports ready.
pub async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "version": env!("CARGO_PKG_VERSION"),
            "breakerState": state.engine.health().state().as_str(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> String {
    metrics::gather()
}

/// `POST /api/snapshot/rebuild` - manual dataset snapshot rebuild. Returns
/// zero groups when a rebuild is already in flight.
pub async fn snapshot_rebuild(
    State(state): State<AppState>,
) -> Result<Json<SnapshotRebuildResponse>, AppError> {
    let groups_written = state
        .engine
        .snapshot()
        .rebuild()
        .await
        .map_err(|e| AppError::StorageError(format!("{e:#}")))?;
    Ok(Json(SnapshotRebuildResponse { groups_written }))
}
