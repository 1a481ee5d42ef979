//! Job timeout watchdog.
//!
//! The queue itself never times jobs out. This task runs beside it and
//! injects a `Failed` completion for any job that has held its slot longer
//! than the configured limit, so a hung processor cannot pin a slot forever.

use std::sync::Arc;
use std::time::Duration;

use markswift_core::job::JobOutcome;
use tokio_util::sync::CancellationToken;

use crate::queue::AdmissionQueue;

/// Run the watchdog loop until `cancel` is triggered.
///
/// Checks every `check_interval` for jobs running longer than `timeout`.
pub async fn run(
    queue: Arc<AdmissionQueue>,
    timeout: Duration,
    check_interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        timeout_ms = timeout.as_millis() as u64,
        interval_ms = check_interval.as_millis() as u64,
        "Job watchdog started",
    );

    let mut interval = tokio::time::interval(check_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job watchdog stopping");
                break;
            }
            _ = interval.tick() => {
                for (session_id, job_id, elapsed) in queue.overdue(timeout).await {
                    tracing::warn!(
                        session_id = %session_id,
                        job_id = %job_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Job exceeded timeout, failing it",
                    );
                    let outcome = JobOutcome::Failed {
                        message: format!(
                            "Conversion timed out after {} seconds.",
                            timeout.as_secs()
                        ),
                        details: Some(serde_json::json!({
                            "elapsedMs": elapsed.as_millis() as u64,
                        })),
                    };
                    queue.complete_job(&session_id, job_id, outcome).await;
                }
            }
        }
    }
}
