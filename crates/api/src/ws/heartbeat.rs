use std::sync::Arc;
use std::time::Duration;

use markswift_events::SessionHub;
use tokio_util::sync::CancellationToken;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that sends periodic Ping frames to every
/// connected session.
///
/// The task runs until `cancel` is triggered.
pub fn start_heartbeat(
    hub: Arc<SessionHub>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Heartbeat stopping");
                    break;
                }
                _ = interval.tick() => {
                    let count = hub.session_count();
                    tracing::debug!(count, "WebSocket heartbeat ping");
                    hub.ping_all();
                }
            }
        }
    })
}
