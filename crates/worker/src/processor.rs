//! The seam between the admission queue and the conversion backend.

use std::fmt;
use std::sync::Arc;

use markswift_core::job::{Job, JobOutcome};
use markswift_core::types::{JobId, SessionId};
use markswift_events::Notification;

use crate::queue::AdmissionQueue;

/// Failure to *start* a job. The queue fails the job and frees its slot.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Processor unavailable: {0}")]
    Unavailable(String),
}

/// Performs the conversion for admitted jobs.
///
/// `process` is called outside the queue lock and must return promptly:
/// implementations hand the job off (spawn a task, push to a channel) and
/// report back through the [`JobReporter`].
pub trait JobProcessor: Send + Sync {
    fn process(&self, job: Job, reporter: JobReporter) -> Result<(), ProcessorError>;

    /// Called once a job accepted by `process` has given up its slot, however
    /// it finished. Runs outside the queue lock and must not block.
    fn released(&self, _session_id: &str, _job_id: JobId) {}
}

/// Handle through which a processor reports progress and the final outcome
/// of one admitted job.
///
/// Progress is relayed only while the job still holds its slot; once the job
/// has finished (or the watchdog failed it) further reports are dropped.
/// Clones refer to the same job, and only the first `finish` releases it.
#[derive(Clone)]
pub struct JobReporter {
    queue: Arc<AdmissionQueue>,
    session_id: SessionId,
    job_id: JobId,
}

impl JobReporter {
    pub(crate) fn new(queue: Arc<AdmissionQueue>, job: &Job) -> Self {
        Self {
            queue,
            session_id: job.session_id.clone(),
            job_id: job.id,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the job still holds its processing slot.
    pub async fn is_current(&self) -> bool {
        self.queue.is_processing(&self.session_id, self.job_id).await
    }

    /// Relay a `status`, `file_status`, or `file_complete` message.
    ///
    /// Returns whether it was delivered to the session.
    pub async fn progress(&self, message: Notification) -> bool {
        self.queue
            .report_progress(&self.session_id, self.job_id, &message)
            .await
    }

    /// Convenience for a plain `status` message.
    pub async fn status(&self, progress: u8, message: impl Into<String>) -> bool {
        self.progress(Notification::Status {
            progress: progress.min(100),
            message: message.into(),
        })
        .await
    }

    /// Report the terminal outcome, releasing the job's slot.
    ///
    /// Returns `false` when the job no longer held a slot.
    pub async fn finish(self, outcome: JobOutcome) -> bool {
        self.queue
            .complete_job(&self.session_id, self.job_id, outcome)
            .await
    }
}

impl fmt::Debug for JobReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobReporter")
            .field("session_id", &self.session_id)
            .field("job_id", &self.job_id)
            .finish()
    }
}
