//! Session notification protocol.
//!
//! Every message pushed to a client is one [`Notification`] variant, framed
//! with the owning session id by [`Envelope`]. On the wire the variant name
//! becomes the `type` tag and fields are camelCase:
//!
//! ```json
//! {"sessionId":"s-1","type":"queue_update","jobId":"…","queuePosition":1, …}
//! ```

use serde::{Deserialize, Serialize};

use markswift_core::estimation::format_wait;
use markswift_core::job::{DownloadType, JobOutcome, JobStatus};
use markswift_core::types::JobId;

/// Message text sent when a socket is registered.
pub const CONNECTION_ACK_MESSAGE: &str = "WebSocket connection established.";

/// Message text sent when a job is admitted to processing.
pub const PROCESSING_STARTED_MESSAGE: &str = "Your files are now being processed.";

/// One message pushed to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Notification {
    ConnectionAck {
        message: String,
    },
    QueueUpdate {
        job_id: JobId,
        queue_position: usize,
        queue_length: usize,
        /// Human-readable wait, e.g. `"1 min 35 sec"`.
        estimated_wait_time: String,
        estimated_wait_time_ms: u64,
        message: String,
    },
    ProcessingStarted {
        job_id: JobId,
        message: String,
    },
    Status {
        progress: u8,
        message: String,
    },
    FileStatus {
        current_file: u32,
        total_files: u32,
        progress: u8,
        message: String,
    },
    FileComplete {
        current_file: u32,
        total_files: u32,
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Complete {
        download_url: String,
        download_type: DownloadType,
        message: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    /// Reply to a client `getStatus` request.
    CurrentStatus {
        status: Option<JobStatus>,
        job_id: Option<JobId>,
    },
}

impl Notification {
    pub fn connection_ack() -> Self {
        Self::ConnectionAck {
            message: CONNECTION_ACK_MESSAGE.to_string(),
        }
    }

    /// Queue position update with both raw and formatted wait.
    pub fn queue_update(
        job_id: JobId,
        queue_position: usize,
        queue_length: usize,
        estimated_wait_ms: u64,
    ) -> Self {
        Self::QueueUpdate {
            job_id,
            queue_position,
            queue_length,
            estimated_wait_time: format_wait(estimated_wait_ms),
            estimated_wait_time_ms: estimated_wait_ms,
            message: format!(
                "You are position {queue_position} of {queue_length} in the queue."
            ),
        }
    }

    pub fn processing_started(job_id: JobId) -> Self {
        Self::ProcessingStarted {
            job_id,
            message: PROCESSING_STARTED_MESSAGE.to_string(),
        }
    }

    /// The single terminal message for a finished job.
    pub fn from_outcome(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed {
                download_url,
                download_type,
            } => Self::Complete {
                download_url: download_url.clone(),
                download_type: *download_type,
                message: match download_type {
                    DownloadType::Pdf => "Conversion successful.".to_string(),
                    DownloadType::Zip => "Conversion successful. Files zipped.".to_string(),
                },
            },
            JobOutcome::Failed { message, details } => Self::Error {
                message: message.clone(),
                details: details.clone(),
            },
        }
    }

    /// Whether this is a processor progress message (`status`,
    /// `file_status`, `file_complete`) that may be relayed while a job runs.
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::FileStatus { .. } | Self::FileComplete { .. }
        )
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionAck { .. } => "connection_ack",
            Self::QueueUpdate { .. } => "queue_update",
            Self::ProcessingStarted { .. } => "processing_started",
            Self::Status { .. } => "status",
            Self::FileStatus { .. } => "file_status",
            Self::FileComplete { .. } => "file_complete",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::CurrentStatus { .. } => "current_status",
        }
    }
}

/// Inbound request from a client socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Ask for the session's current job status.
    GetStatus,
}

/// A notification framed with its session id for serialization.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<'a> {
    pub session_id: &'a str,
    #[serde(flatten)]
    pub notification: &'a Notification,
}

impl<'a> Envelope<'a> {
    pub fn new(session_id: &'a str, notification: &'a Notification) -> Self {
        Self {
            session_id,
            notification,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
