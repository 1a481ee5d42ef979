//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                       -> submit_job
/// POST   /claim                  -> claim_job
/// GET    /{session_id}           -> get_job
/// POST   /{session_id}/progress  -> report_progress
/// POST   /{session_id}/complete  -> complete_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/claim", post(jobs::claim_job))
        .route("/{session_id}", get(jobs::get_job))
        .route("/{session_id}/progress", post(jobs::report_progress))
        .route("/{session_id}/complete", post(jobs::complete_job))
}
