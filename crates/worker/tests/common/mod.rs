//! Shared fakes for admission queue tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use markswift_core::config::QueueConfig;
use markswift_core::job::Job;
use markswift_core::types::JobId;
use markswift_events::{EventBus, Notification, NotificationSink};
use markswift_worker::{AdmissionQueue, JobProcessor, JobReporter, ProcessorError};

/// Sink that records every delivered message; sessions can be taken offline.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, Notification)>>,
    offline: Mutex<HashSet<String>>,
}

impl RecordingSink {
    pub fn disconnect(&self, session_id: &str) {
        self.offline.lock().unwrap().insert(session_id.to_string());
    }

    pub fn messages_for(&self, session_id: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == session_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn kinds_for(&self, session_id: &str) -> Vec<&'static str> {
        self.messages_for(session_id)
            .iter()
            .map(Notification::kind)
            .collect()
    }

    pub fn last_for(&self, session_id: &str) -> Option<Notification> {
        self.messages_for(session_id).pop()
    }
}

impl NotificationSink for RecordingSink {
    fn try_send(&self, session_id: &str, message: &Notification) -> bool {
        if self.offline.lock().unwrap().contains(session_id) {
            return false;
        }
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), message.clone()));
        true
    }
}

/// Processor that parks admitted jobs so tests can finish them by hand.
#[derive(Default)]
pub struct RecordingProcessor {
    started: Mutex<Vec<Job>>,
    reporters: Mutex<Vec<JobReporter>>,
    released: Mutex<Vec<(String, JobId)>>,
    reject: AtomicBool,
}

impl RecordingProcessor {
    pub fn reject_all(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    pub fn started_sessions(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.session_id.clone())
            .collect()
    }

    pub fn released(&self) -> Vec<(String, JobId)> {
        self.released.lock().unwrap().clone()
    }

    pub fn take_reporter(&self, session_id: &str) -> JobReporter {
        let mut reporters = self.reporters.lock().unwrap();
        let idx = reporters
            .iter()
            .position(|r| r.session_id() == session_id)
            .unwrap_or_else(|| panic!("no reporter for {session_id}"));
        reporters.remove(idx)
    }
}

impl JobProcessor for RecordingProcessor {
    fn process(&self, job: Job, reporter: JobReporter) -> Result<(), ProcessorError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(ProcessorError::Unavailable("renderer offline".into()));
        }
        self.started.lock().unwrap().push(job);
        self.reporters.lock().unwrap().push(reporter);
        Ok(())
    }

    fn released(&self, session_id: &str, job_id: JobId) {
        self.released
            .lock()
            .unwrap()
            .push((session_id.to_string(), job_id));
    }
}

pub struct Harness {
    pub queue: Arc<AdmissionQueue>,
    pub sink: Arc<RecordingSink>,
    pub processor: Arc<RecordingProcessor>,
    pub events: Arc<EventBus>,
}

pub fn harness(config: QueueConfig) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let processor = Arc::new(RecordingProcessor::default());
    let events = Arc::new(EventBus::default());
    let queue = AdmissionQueue::new(
        &config,
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
        Arc::clone(&processor) as Arc<dyn JobProcessor>,
        Arc::clone(&events),
    )
    .expect("valid config");

    Harness {
        queue,
        sink,
        processor,
        events,
    }
}

/// Defaults: 5000 ms per file, 10000 ms overhead, history of 20.
pub fn config(max_concurrent_jobs: usize) -> QueueConfig {
    QueueConfig {
        max_concurrent_jobs,
        ..QueueConfig::default()
    }
}
