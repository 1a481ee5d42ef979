//! Shared helpers for api integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use markswift_api::config::ServerConfig;
use markswift_api::processor::ClaimQueue;
use markswift_api::router::build_app_router;
use markswift_api::state::AppState;
use markswift_core::config::QueueConfig;
use markswift_events::{EventBus, NotificationSink, SessionHub};
use markswift_worker::{AdmissionQueue, JobProcessor};
use serde_json::Value;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults and a short claim window.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        claim_wait: Duration::from_millis(200),
    }
}

/// A router plus handles on the state behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// Build the full application with one processing slot.
pub fn build_test_app() -> TestApp {
    build_test_app_with(QueueConfig {
        max_concurrent_jobs: 1,
        ..QueueConfig::default()
    })
}

/// Build the full application router, with the same middleware stack
/// production uses, over a fresh queue.
pub fn build_test_app_with(queue_config: QueueConfig) -> TestApp {
    let config = test_config();
    let hub = Arc::new(SessionHub::new());
    let claims = Arc::new(ClaimQueue::new());
    let queue = AdmissionQueue::new(
        &queue_config,
        Arc::clone(&hub) as Arc<dyn NotificationSink>,
        Arc::clone(&claims) as Arc<dyn JobProcessor>,
        Arc::new(EventBus::default()),
    )
    .expect("valid queue config");

    let state = AppState {
        config: Arc::new(config.clone()),
        queue,
        hub,
        claims,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
