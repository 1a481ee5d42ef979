use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs currently holding a processing slot.
    pub active_jobs: usize,
    /// Jobs waiting for a slot.
    pub queue_length: usize,
    /// Sessions with an open WebSocket.
    pub connected_sessions: usize,
}

/// GET /health -- returns service health and queue load.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.queue.queue_status().await;

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_jobs: snapshot.active_jobs,
        queue_length: snapshot.queue_length,
        connected_sessions: state.hub.session_count(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
