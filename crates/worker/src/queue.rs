//! FIFO admission queue over a fixed pool of processing slots.
//!
//! All mutations (`submit`, `try_admit`, completion) take the state write
//! lock, so they are serialized with respect to each other. Processor calls
//! happen after the lock is released; sink calls happen under it but are
//! non-blocking by contract.
//!
//! Every mutation re-projects the wait of each queued job and pushes a
//! `queue_update` to its session.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use markswift_core::config::QueueConfig;
use markswift_core::error::CoreError;
use markswift_core::estimation::{
    project_wait_times, EstimationModel, HistoryEntry, RefreshOutcome,
};
use markswift_core::job::{Job, JobOutcome, JobStatus};
use markswift_core::types::{JobId, SessionId};
use markswift_events::{EventBus, Notification, NotificationSink, QueueEvent, QueueEventKind};
use serde::Serialize;
use tokio::sync::{oneshot, RwLock};
use tokio::time::Instant;

use crate::processor::{JobProcessor, JobReporter};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Returned by [`AdmissionQueue::submit`].
///
/// `job` is the record as enqueued, with its first position and wait.
/// `finished` resolves with the terminal outcome once the job completes or
/// fails. Status in between is only observable through notifications or
/// [`AdmissionQueue::status_of`].
#[derive(Debug)]
pub struct JobTicket {
    pub job: Job,
    pub finished: oneshot::Receiver<JobOutcome>,
}

/// One queued job in a [`QueueSnapshot`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSummary {
    pub session_id: SessionId,
    pub job_id: JobId,
    pub position: usize,
    pub file_count: u32,
    pub estimated_wait_ms: u64,
}

/// Point-in-time view of the queue for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub active_jobs: usize,
    pub max_concurrent_jobs: usize,
    pub per_file_ms: f64,
    pub base_overhead_ms: f64,
    pub history_len: usize,
    pub queued: Vec<QueuedSummary>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// An admitted job and when it started.
struct ActiveSlot {
    job: Job,
    started_at: Instant,
}

struct QueueState {
    queued: VecDeque<Job>,
    active: HashMap<SessionId, ActiveSlot>,
    estimation: EstimationModel,
    waiters: HashMap<JobId, oneshot::Sender<JobOutcome>>,
}

impl QueueState {
    fn holds_session(&self, session_id: &str) -> bool {
        self.active.contains_key(session_id)
            || self.queued.iter().any(|job| job.session_id == session_id)
    }
}

// ---------------------------------------------------------------------------
// AdmissionQueue
// ---------------------------------------------------------------------------

/// Admission-controlled job queue.
///
/// Constructed once per process and shared as `Arc<AdmissionQueue>`.
pub struct AdmissionQueue {
    max_concurrent_jobs: usize,
    state: RwLock<QueueState>,
    sink: Arc<dyn NotificationSink>,
    processor: Arc<dyn JobProcessor>,
    events: Arc<EventBus>,
}

impl AdmissionQueue {
    /// Build a queue from validated configuration.
    pub fn new(
        config: &QueueConfig,
        sink: Arc<dyn NotificationSink>,
        processor: Arc<dyn JobProcessor>,
        events: Arc<EventBus>,
    ) -> Result<Arc<Self>, CoreError> {
        config.validate()?;

        tracing::info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            history_capacity = config.history_capacity,
            default_per_file_ms = config.default_per_file_ms,
            default_base_overhead_ms = config.default_base_overhead_ms,
            "Admission queue initialized",
        );

        Ok(Arc::new(Self {
            max_concurrent_jobs: config.max_concurrent_jobs,
            state: RwLock::new(QueueState {
                queued: VecDeque::new(),
                active: HashMap::new(),
                estimation: EstimationModel::from_config(config),
                waiters: HashMap::new(),
            }),
            sink,
            processor,
            events,
        }))
    }

    // -- inbound operations --------------------------------------------------

    /// Append a job for `session_id` to the tail of the queue.
    ///
    /// Never fails for capacity. Fails on an empty batch, or with
    /// `Conflict` when the session already has a queued or running job.
    pub async fn submit(
        self: &Arc<Self>,
        session_id: impl Into<SessionId>,
        file_count: u32,
    ) -> Result<JobTicket, CoreError> {
        let job = Job::new(session_id, file_count)?;
        let job_id = job.id;
        let (tx, rx) = oneshot::channel();

        let enqueued = {
            let mut state = self.state.write().await;
            if state.holds_session(&job.session_id) {
                return Err(CoreError::Conflict(format!(
                    "Session {} already has a job in progress",
                    job.session_id
                )));
            }

            let queue_length = state.queued.len() + 1;
            tracing::info!(
                job_id = %job_id,
                session_id = %job.session_id,
                file_count,
                queue_length,
                "Job queued",
            );
            self.events.publish(QueueEvent::new(
                job_id,
                job.session_id.as_str(),
                QueueEventKind::Queued {
                    file_count,
                    queue_length,
                },
            ));

            let record = job.clone();
            state.queued.push_back(job);
            state.waiters.insert(job_id, tx);
            self.recompute_locked(&mut state);
            // The tail now carries the projected position and wait.
            state.queued.back().cloned().unwrap_or(record)
        };

        self.try_admit().await;

        Ok(JobTicket {
            job: enqueued,
            finished: rx,
        })
    }

    /// Current record of the session's job, queued or processing.
    ///
    /// `None` when the session has no live job; finished jobs are not
    /// retained.
    pub async fn status_of(&self, session_id: &str) -> Option<Job> {
        let state = self.state.read().await;
        state
            .queued
            .iter()
            .find(|job| job.session_id == session_id)
            .cloned()
            .or_else(|| state.active.get(session_id).map(|slot| slot.job.clone()))
    }

    /// Admit queued jobs while slots are free.
    ///
    /// Idempotent: with no free slot or no queued job this does nothing.
    /// Returns the number of jobs admitted.
    pub async fn try_admit(self: &Arc<Self>) -> usize {
        let mut admitted_total = 0;

        loop {
            let admitted = {
                let mut state = self.state.write().await;
                self.admit_locked(&mut state)
            };
            if admitted.is_empty() {
                break;
            }
            admitted_total += admitted.len();

            let mut released = false;
            for job in admitted {
                let session_id = job.session_id.clone();
                let job_id = job.id;
                let reporter = JobReporter::new(Arc::clone(self), &job);

                if let Err(e) = self.processor.process(job, reporter) {
                    tracing::error!(
                        job_id = %job_id,
                        session_id = %session_id,
                        error = %e,
                        "Processor failed to start job",
                    );
                    let mut state = self.state.write().await;
                    released |= self
                        .release_locked(
                            &mut state,
                            &session_id,
                            Some(job_id),
                            JobOutcome::failed(format!("Failed to start conversion: {e}")),
                        )
                        .is_some();
                }
            }

            // Capacity freed by start failures goes to the next queued job.
            if !released {
                break;
            }
        }

        admitted_total
    }

    /// Report the terminal outcome of the session's running job.
    ///
    /// Returns `false` (after logging) when the session holds no slot.
    pub async fn complete(self: &Arc<Self>, session_id: &str, outcome: JobOutcome) -> bool {
        self.finish(session_id, None, outcome).await
    }

    /// Like [`complete`](Self::complete), but only if the slot still belongs
    /// to `job_id`.
    pub async fn complete_job(
        self: &Arc<Self>,
        session_id: &str,
        job_id: JobId,
        outcome: JobOutcome,
    ) -> bool {
        self.finish(session_id, Some(job_id), outcome).await
    }

    /// Whether `job_id` still holds the session's processing slot.
    pub async fn is_processing(&self, session_id: &str, job_id: JobId) -> bool {
        self.state
            .read()
            .await
            .active
            .get(session_id)
            .is_some_and(|slot| slot.job.id == job_id)
    }

    /// Re-project every queued job's position and wait, and notify its session.
    pub async fn recompute_and_notify(&self) {
        let mut state = self.state.write().await;
        self.recompute_locked(&mut state);
    }

    /// Relay a processor progress message while the job is still running.
    pub async fn report_progress(
        &self,
        session_id: &str,
        job_id: JobId,
        message: &Notification,
    ) -> bool {
        if !message.is_progress() {
            tracing::warn!(
                session_id,
                job_id = %job_id,
                kind = message.kind(),
                "Rejected non-progress message from processor",
            );
            return false;
        }

        let state = self.state.read().await;
        match state.active.get(session_id) {
            Some(slot) if slot.job.id == job_id => self.sink.try_send(session_id, message),
            _ => {
                tracing::debug!(
                    session_id,
                    job_id = %job_id,
                    kind = message.kind(),
                    "Dropping progress for a job that is no longer processing",
                );
                false
            }
        }
    }

    /// Push the session's current state again, e.g. after a reconnect.
    ///
    /// Sends `queue_update` for a queued job or `processing_started` for a
    /// running one. Returns `false` if there is nothing to send or the
    /// delivery failed.
    pub async fn resend_state(&self, session_id: &str) -> bool {
        let state = self.state.read().await;

        if let Some(job) = state.queued.iter().find(|job| job.session_id == session_id) {
            let message = Notification::queue_update(
                job.id,
                job.queue_position,
                state.queued.len(),
                job.estimated_wait_ms,
            );
            return self.sink.try_send(session_id, &message);
        }

        match state.active.get(session_id) {
            Some(slot) => self
                .sink
                .try_send(session_id, &Notification::processing_started(slot.job.id)),
            None => false,
        }
    }

    // -- diagnostics -----------------------------------------------------------

    pub async fn queue_status(&self) -> QueueSnapshot {
        let state = self.state.read().await;
        QueueSnapshot {
            queue_length: state.queued.len(),
            active_jobs: state.active.len(),
            max_concurrent_jobs: self.max_concurrent_jobs,
            per_file_ms: state.estimation.per_file_ms(),
            base_overhead_ms: state.estimation.base_overhead_ms(),
            history_len: state.estimation.history_len(),
            queued: state
                .queued
                .iter()
                .map(|job| QueuedSummary {
                    session_id: job.session_id.clone(),
                    job_id: job.id,
                    position: job.queue_position,
                    file_count: job.file_count,
                    estimated_wait_ms: job.estimated_wait_ms,
                })
                .collect(),
        }
    }

    /// Queued jobs in FIFO order.
    pub async fn queued_jobs(&self) -> Vec<Job> {
        self.state.read().await.queued.iter().cloned().collect()
    }

    pub async fn active_count(&self) -> usize {
        self.state.read().await.active.len()
    }

    /// Retained completion history, oldest first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.state.read().await.estimation.history().copied().collect()
    }

    /// Running jobs that have held their slot for longer than `limit`.
    pub async fn overdue(&self, limit: Duration) -> Vec<(SessionId, JobId, Duration)> {
        let now = Instant::now();
        let state = self.state.read().await;
        state
            .active
            .iter()
            .filter_map(|(session_id, slot)| {
                let elapsed = now.saturating_duration_since(slot.started_at);
                (elapsed > limit).then(|| (session_id.clone(), slot.job.id, elapsed))
            })
            .collect()
    }

    // -- internals -------------------------------------------------------------

    async fn finish(
        self: &Arc<Self>,
        session_id: &str,
        job_id: Option<JobId>,
        outcome: JobOutcome,
    ) -> bool {
        let released = {
            let mut state = self.state.write().await;
            self.release_locked(&mut state, session_id, job_id, outcome)
        };
        if let Some(job_id) = released {
            self.processor.released(session_id, job_id);
        }
        self.try_admit().await;
        self.recompute_and_notify().await;
        released.is_some()
    }

    /// Pop queued jobs into free slots and announce them. The caller hands
    /// the returned jobs to the processor after dropping the lock.
    fn admit_locked(&self, state: &mut QueueState) -> Vec<Job> {
        let mut admitted = Vec::new();

        while state.active.len() < self.max_concurrent_jobs {
            let Some(mut job) = state.queued.pop_front() else {
                break;
            };
            if let Err(e) = job.transition(JobStatus::Processing) {
                tracing::error!(job_id = %job.id, error = %e, "Queued job could not be admitted");
                state.waiters.remove(&job.id);
                continue;
            }

            let delivered = self
                .sink
                .try_send(&job.session_id, &Notification::processing_started(job.id));
            let active_jobs = state.active.len() + 1;
            tracing::info!(
                job_id = %job.id,
                session_id = %job.session_id,
                file_count = job.file_count,
                active_jobs,
                max_concurrent_jobs = self.max_concurrent_jobs,
                delivered,
                "Job admitted",
            );
            self.events.publish(QueueEvent::new(
                job.id,
                job.session_id.as_str(),
                QueueEventKind::Admitted {
                    file_count: job.file_count,
                    active_jobs,
                },
            ));

            state.active.insert(
                job.session_id.clone(),
                ActiveSlot {
                    job: job.clone(),
                    started_at: Instant::now(),
                },
            );
            admitted.push(job);
        }

        if !admitted.is_empty() {
            self.recompute_locked(state);
        }
        admitted
    }

    /// Free the session's slot, fold its duration into the estimation model,
    /// and send the single terminal message. Returns the released job's id.
    fn release_locked(
        &self,
        state: &mut QueueState,
        session_id: &str,
        job_id: Option<JobId>,
        outcome: JobOutcome,
    ) -> Option<JobId> {
        let owns_slot = state
            .active
            .get(session_id)
            .is_some_and(|slot| job_id.map_or(true, |id| id == slot.job.id));
        if !owns_slot {
            tracing::warn!(
                session_id,
                job_id = ?job_id,
                "Completion reported for a session without a matching active job",
            );
            return None;
        }
        let ActiveSlot {
            mut job,
            started_at,
        } = state.active.remove(session_id)?;

        let duration_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        state.estimation.record_completion(duration_ms, job.file_count);
        match state.estimation.refresh() {
            RefreshOutcome::Updated {
                per_file_ms,
                base_overhead_ms,
            } => {
                tracing::debug!(per_file_ms, base_overhead_ms, "Estimation refreshed");
            }
            RefreshOutcome::Discarded {
                per_file_ms,
                base_overhead_ms,
            } => {
                tracing::warn!(
                    per_file_ms,
                    base_overhead_ms,
                    "Discarded invalid estimation update, keeping previous coefficients",
                );
            }
            RefreshOutcome::Empty => {}
        }

        let status = outcome.status();
        if let Err(e) = job.transition(status) {
            tracing::error!(job_id = %job.id, error = %e, "Unexpected terminal transition");
        }

        let delivered = self
            .sink
            .try_send(session_id, &Notification::from_outcome(&outcome));
        tracing::info!(
            job_id = %job.id,
            session_id,
            status = %status,
            duration_ms,
            delivered,
            active_jobs = state.active.len(),
            "Job finished",
        );
        self.events.publish(QueueEvent::new(
            job.id,
            session_id,
            QueueEventKind::Finished {
                status,
                duration_ms,
            },
        ));

        if let Some(waiter) = state.waiters.remove(&job.id) {
            let _ = waiter.send(outcome);
        }
        Some(job.id)
    }

    fn recompute_locked(&self, state: &mut QueueState) {
        let now = Instant::now();
        let estimation = &state.estimation;

        let active_remaining: Vec<f64> = state
            .active
            .values()
            .map(|slot| {
                let elapsed = now.saturating_duration_since(slot.started_at).as_millis() as f64;
                estimation.estimate_ms(slot.job.file_count) - elapsed
            })
            .collect();
        let queued_durations: Vec<f64> = state
            .queued
            .iter()
            .map(|job| estimation.estimate_ms(job.file_count))
            .collect();
        let waits = project_wait_times(
            self.max_concurrent_jobs,
            &active_remaining,
            &queued_durations,
        );

        let queue_length = state.queued.len();
        let mut undelivered = 0usize;
        for (idx, (job, wait_ms)) in state.queued.iter_mut().zip(waits).enumerate() {
            job.queue_position = idx + 1;
            job.estimated_wait_ms = wait_ms.round() as u64;

            let message = Notification::queue_update(
                job.id,
                job.queue_position,
                queue_length,
                job.estimated_wait_ms,
            );
            if !self.sink.try_send(&job.session_id, &message) {
                undelivered += 1;
            }
        }

        if undelivered > 0 {
            tracing::debug!(undelivered, queue_length, "Queue update not delivered to every session");
        }
    }
}
