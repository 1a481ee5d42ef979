//! Handlers for the `/queue` diagnostics resource.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue
///
/// Snapshot of queue length, active jobs, estimation coefficients, and the
/// queued jobs in FIFO order.
pub async fn get_queue_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let snapshot = state.queue.queue_status().await;
    Ok(Json(DataResponse { data: snapshot }))
}
