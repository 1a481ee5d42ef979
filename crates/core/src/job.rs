//! Job record, status state machine, and terminal outcomes.
//!
//! A job moves strictly forward: `Queued -> Processing -> {Completed | Failed}`.
//! Only the status, queue position, and wait estimate ever change after
//! creation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, SessionId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns the set of statuses reachable from `self`.
    ///
    /// Terminal states return an empty slice.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[Self::Processing],
            Self::Processing => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A batch of documents submitted for conversion by one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub session_id: SessionId,
    pub file_count: u32,
    pub status: JobStatus,
    /// 1-based rank among queued jobs; `0` once admitted.
    pub queue_position: usize,
    /// Advisory wait estimate in milliseconds. Never used for correctness.
    pub estimated_wait_ms: u64,
    /// Diagnostics only; FIFO order is positional.
    pub enqueued_at: Timestamp,
}

impl Job {
    /// Create a new `Queued` job. Rejects empty batches.
    pub fn new(session_id: impl Into<SessionId>, file_count: u32) -> Result<Self, CoreError> {
        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return Err(CoreError::Validation("Session ID must not be empty".into()));
        }
        if file_count == 0 {
            return Err(CoreError::Validation(
                "A job must contain at least one file".into(),
            ));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4(),
            session_id,
            file_count,
            status: JobStatus::Queued,
            queue_position: 0,
            estimated_wait_ms: 0,
            enqueued_at: chrono::Utc::now(),
        })
    }

    /// Move the job to `to`, rejecting backwards or skipping transitions.
    pub fn transition(&mut self, to: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition(to) {
            return Err(CoreError::Conflict(format!(
                "Invalid transition for job {}: {} -> {}",
                self.id, self.status, to
            )));
        }
        // Every valid transition leaves the queue.
        self.status = to;
        self.queue_position = 0;
        self.estimated_wait_ms = 0;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Kind of artifact produced by a successful conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadType {
    Pdf,
    Zip,
}

/// Terminal result reported by the job processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum JobOutcome {
    Completed {
        download_url: String,
        download_type: DownloadType,
    },
    Failed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl JobOutcome {
    /// Shorthand for a failure without structured details.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            details: None,
        }
    }

    /// The terminal status this outcome maps to.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
