use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use markswift_core::config::QueueConfig;
use markswift_events::{EventBus, NotificationSink, QueueEvent, SessionHub};
use markswift_worker::{watchdog, AdmissionDriver, AdmissionQueue, JobProcessor};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use markswift_api::config::ServerConfig;
use markswift_api::processor::ClaimQueue;
use markswift_api::router::build_app_router;
use markswift_api::state::AppState;
use markswift_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "markswift_api=debug,markswift_worker=debug,markswift_events=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let queue_config = QueueConfig::from_env().expect("Invalid queue configuration");

    // --- Session hub ---
    let hub = Arc::new(SessionHub::new());

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // --- Admission queue ---
    let claims = Arc::new(ClaimQueue::new());
    let queue = AdmissionQueue::new(
        &queue_config,
        Arc::clone(&hub) as Arc<dyn NotificationSink>,
        Arc::clone(&claims) as Arc<dyn JobProcessor>,
        Arc::clone(&event_bus),
    )
    .expect("Failed to create admission queue");

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let driver = AdmissionDriver::new(Arc::clone(&queue), queue_config.poll_interval);
    let driver_cancel = cancel.clone();
    let driver_handle = tokio::spawn(async move {
        driver.run(driver_cancel).await;
    });

    let watchdog_handle = match queue_config.job_timeout {
        Some(timeout) => Some(tokio::spawn(watchdog::run(
            Arc::clone(&queue),
            timeout,
            queue_config.poll_interval,
            cancel.clone(),
        ))),
        None => {
            tracing::info!("Job timeout disabled, watchdog not started");
            None
        }
    };

    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&hub), cancel.clone());

    let events_handle = tokio::spawn(log_queue_events(event_bus.subscribe(), cancel.clone()));

    tracing::info!("Background services started (admission driver, watchdog, heartbeat)");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        queue,
        hub: Arc::clone(&hub),
        claims,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), driver_handle).await;
    if let Some(handle) = watchdog_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), events_handle).await;
    tracing::info!("Background services stopped");

    let session_count = hub.session_count();
    tracing::info!(session_count, "Closing remaining WebSocket sessions");
    hub.shutdown_all();

    tracing::info!("Graceful shutdown complete");
}

/// Log every queue lifecycle event until cancelled.
async fn log_queue_events(mut rx: broadcast::Receiver<QueueEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => {
                    tracing::debug!(
                        job_id = %event.job_id,
                        session_id = %event.session_id,
                        event = ?event.kind,
                        "Queue event",
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Queue event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
