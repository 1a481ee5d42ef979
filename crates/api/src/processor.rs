//! HTTP-facing [`JobProcessor`]: admitted jobs wait on a claim channel until
//! an external converter worker picks them up.
//!
//! Workers long-poll `POST /api/v1/jobs/claim`, then report progress and the
//! outcome against the session id. The reporter for each claimed job is kept
//! here until the job gives up its slot.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use markswift_core::job::Job;
use markswift_core::types::{JobId, SessionId};
use markswift_events::Notification;
use markswift_worker::{JobProcessor, JobReporter, ProcessorError};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// An admitted job as handed to a converter worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedJob {
    pub job_id: JobId,
    pub session_id: SessionId,
    pub file_count: u32,
}

/// Admitted jobs not yet claimed, plus reporters of claimed ones.
///
/// `claimed` is only locked for map operations, never across an await.
pub struct ClaimQueue {
    sender: mpsc::UnboundedSender<(Job, JobReporter)>,
    pending: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Job, JobReporter)>>,
    claimed: Mutex<HashMap<SessionId, JobReporter>>,
}

impl ClaimQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            pending: tokio::sync::Mutex::new(receiver),
            claimed: Mutex::new(HashMap::new()),
        }
    }

    /// Wait up to `wait` for an admitted job that still holds its slot.
    ///
    /// Jobs finished before anyone claimed them (e.g. by the watchdog) are
    /// skipped. Concurrent claimants are served one at a time in arrival
    /// order.
    pub async fn claim(&self, wait: Duration) -> Option<ClaimedJob> {
        let deadline = Instant::now() + wait;
        let mut pending = self.pending.lock().await;

        loop {
            let (job, reporter) = tokio::time::timeout_at(deadline, pending.recv())
                .await
                .ok()??;

            // Insert before checking, so a release racing with the check
            // still finds the entry and removes it.
            let replaced = self
                .lock_claimed()
                .insert(job.session_id.clone(), reporter.clone());
            if let Some(stale) = replaced {
                tracing::debug!(
                    session_id = %job.session_id,
                    stale_job_id = %stale.job_id(),
                    "Replacing reporter of an earlier claim",
                );
            }

            if !reporter.is_current().await {
                self.forget(&job.session_id, job.id);
                tracing::debug!(
                    job_id = %job.id,
                    session_id = %job.session_id,
                    "Skipping admitted job that no longer holds its slot",
                );
                continue;
            }

            tracing::info!(
                job_id = %job.id,
                session_id = %job.session_id,
                file_count = job.file_count,
                "Job claimed by converter",
            );
            return Some(ClaimedJob {
                job_id: job.id,
                session_id: job.session_id,
                file_count: job.file_count,
            });
        }
    }

    /// Relay progress through the reporter of the session's claimed job.
    ///
    /// `None` when no claimed job for the session matches `job_id`;
    /// otherwise whether the message reached the session.
    pub async fn progress(
        &self,
        session_id: &str,
        job_id: JobId,
        message: Notification,
    ) -> Option<bool> {
        let reporter = self
            .lock_claimed()
            .get(session_id)
            .filter(|reporter| reporter.job_id() == job_id)
            .cloned()?;
        Some(reporter.progress(message).await)
    }

    /// Take the reporter of the session's claimed job if it matches `job_id`.
    pub fn take(&self, session_id: &str, job_id: JobId) -> Option<JobReporter> {
        let mut claimed = self.lock_claimed();
        match claimed.get(session_id) {
            Some(reporter) if reporter.job_id() == job_id => claimed.remove(session_id),
            _ => None,
        }
    }

    /// Number of claimed jobs still holding a slot.
    pub fn claimed_count(&self) -> usize {
        self.lock_claimed().len()
    }

    fn forget(&self, session_id: &str, job_id: JobId) -> bool {
        self.take(session_id, job_id).is_some()
    }

    fn lock_claimed(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, JobReporter>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ClaimQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProcessor for ClaimQueue {
    fn process(&self, job: Job, reporter: JobReporter) -> Result<(), ProcessorError> {
        let job_id = job.id;
        self.sender.send((job, reporter)).map_err(|_| {
            ProcessorError::Unavailable(format!("claim channel closed for job {job_id}"))
        })?;
        tracing::debug!(job_id = %job_id, "Job waiting for a converter");
        Ok(())
    }

    fn released(&self, session_id: &str, job_id: JobId) {
        if self.forget(session_id, job_id) {
            tracing::debug!(
                job_id = %job_id,
                session_id,
                "Dropped reporter of a released job",
            );
        }
    }
}
