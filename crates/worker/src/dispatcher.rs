//! Periodic admission driver.
//!
//! Every mutation already calls [`AdmissionQueue::try_admit`]; this loop is
//! the safety net that admits work if an event-triggered call was missed.
//! Both paths serialize on the queue lock, so interleaving is harmless.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::queue::AdmissionQueue;

/// Background task that calls `try_admit` on a fixed interval.
pub struct AdmissionDriver {
    queue: Arc<AdmissionQueue>,
    poll_interval: Duration,
}

impl AdmissionDriver {
    pub fn new(queue: Arc<AdmissionQueue>, poll_interval: Duration) -> Self {
        Self {
            queue,
            poll_interval,
        }
    }

    /// Run the admission loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Admission driver started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Admission driver shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let admitted = self.queue.try_admit().await;
                    if admitted > 0 {
                        tracing::info!(admitted, "Periodic check admitted queued jobs");
                    }
                }
            }
        }
    }
}
