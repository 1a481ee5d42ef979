//! In-process bus of queue lifecycle events backed by `tokio::sync::broadcast`.
//!
//! The admission queue publishes a [`QueueEvent`] for every submission,
//! admission, and completion. Subscribers (diagnostics, metrics, tests)
//! observe them independently of client notifications.

use markswift_core::job::JobStatus;
use markswift_core::types::{JobId, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// QueueEvent
// ---------------------------------------------------------------------------

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEventKind {
    Queued { file_count: u32, queue_length: usize },
    Admitted { file_count: u32, active_jobs: usize },
    Finished { status: JobStatus, duration_ms: u64 },
}

/// A job lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub job_id: JobId,
    pub session_id: SessionId,
    #[serde(flatten)]
    pub kind: QueueEventKind,
    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl QueueEvent {
    pub fn new(job_id: JobId, session_id: impl Into<SessionId>, kind: QueueEventKind) -> Self {
        Self {
            job_id,
            session_id: session_id.into(),
            kind,
            timestamp: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`QueueEvent`].
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: QueueEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
