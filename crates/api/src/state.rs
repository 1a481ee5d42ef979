use std::sync::Arc;

use markswift_events::SessionHub;
use markswift_worker::AdmissionQueue;

use crate::config::ServerConfig;
use crate::processor::ClaimQueue;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Admission-controlled conversion queue.
    pub queue: Arc<AdmissionQueue>,
    /// Session-keyed WebSocket connections; also the queue's notification sink.
    pub hub: Arc<SessionHub>,
    /// Admitted jobs waiting for, or held by, converter workers.
    pub claims: Arc<ClaimQueue>,
}
