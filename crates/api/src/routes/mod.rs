pub mod health;
pub mod jobs;
pub mod queue;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws?sessionId=...                   WebSocket (session notifications)
///
/// /jobs                               submit (POST)
/// /jobs/claim                         claim next admitted job (POST, long-poll)
/// /jobs/{session_id}                  current job for session (GET)
/// /jobs/{session_id}/progress         relay converter progress (POST)
/// /jobs/{session_id}/complete         report converter outcome (POST)
///
/// /queue                              queue snapshot (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        // Jobs
        .nest("/jobs", jobs::router())
        // Queue diagnostics
        .nest("/queue", queue::router())
}
