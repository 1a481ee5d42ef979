//! Behavioural tests for `AdmissionQueue`.
//!
//! Time-dependent tests run on a paused clock so elapsed-time math is exact.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{config, harness, RecordingProcessor, RecordingSink};
use markswift_core::config::QueueConfig;
use markswift_core::error::CoreError;
use markswift_core::estimation::HistoryEntry;
use markswift_core::job::{DownloadType, JobOutcome, JobStatus};
use markswift_events::{EventBus, Notification, QueueEventKind};
use markswift_worker::AdmissionQueue;

fn success() -> JobOutcome {
    JobOutcome::Completed {
        download_url: "/api/download/pdf/s/out.pdf".into(),
        download_type: DownloadType::Pdf,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn two_slots_admit_first_two_and_queue_third() {
    let h = harness(config(2));

    h.queue.submit("s1", 3).await.unwrap();
    h.queue.submit("s2", 2).await.unwrap();
    tokio::time::advance(Duration::from_secs(5)).await;
    let ticket = h.queue.submit("s3", 1).await.unwrap();

    assert_eq!(ticket.job.status, JobStatus::Queued);
    assert_eq!(ticket.job.queue_position, 1);
    assert_eq!(h.processor.started_sessions(), vec!["s1", "s2"]);
    assert_eq!(h.sink.kinds_for("s1"), vec!["queue_update", "processing_started"]);
    assert_eq!(h.sink.kinds_for("s2"), vec!["queue_update", "processing_started"]);

    let s3 = h.queue.status_of("s3").await.expect("s3 is queued");
    assert_eq!(s3.status, JobStatus::Queued);
    assert_eq!(s3.queue_position, 1);
    // remaining(s1) = 25000 - 5000, remaining(s2) = 20000 - 5000
    assert_eq!(s3.estimated_wait_ms, 15_000);

    assert_matches!(
        h.sink.last_for("s3"),
        Some(Notification::QueueUpdate { queue_position: 1, queue_length: 1, estimated_wait_time_ms: 15_000, .. })
    );
}

#[tokio::test(start_paused = true)]
async fn failed_completion_frees_slot_for_next_job() {
    let h = harness(config(2));

    let s1 = h.queue.submit("s1", 3).await.unwrap();
    h.queue.submit("s2", 2).await.unwrap();
    h.queue.submit("s3", 1).await.unwrap();

    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(h.queue.complete("s1", JobOutcome::failed("Conversion failed for all files.")).await);

    let s3 = h.queue.status_of("s3").await.expect("s3 is processing");
    assert_eq!(s3.status, JobStatus::Processing);
    assert_eq!(s3.queue_position, 0);
    assert_eq!(s3.estimated_wait_ms, 0);
    assert!(h.queue.queued_jobs().await.is_empty());
    assert_eq!(h.processor.started_sessions(), vec!["s1", "s2", "s3"]);

    assert_eq!(
        h.queue.history().await,
        vec![HistoryEntry { duration_ms: 8000, file_count: 3 }]
    );

    assert_eq!(h.sink.kinds_for("s1").last(), Some(&"error"));
    assert_matches!(s1.finished.await, Ok(JobOutcome::Failed { .. }));
    assert!(h.queue.status_of("s1").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn history_keeps_only_most_recent_entries() {
    let h = harness(QueueConfig {
        max_concurrent_jobs: 1,
        history_capacity: 2,
        ..QueueConfig::default()
    });

    for (i, secs) in [1u64, 2, 3].into_iter().enumerate() {
        let session = format!("s{i}");
        h.queue.submit(session.as_str(), 1).await.unwrap();
        tokio::time::advance(Duration::from_secs(secs)).await;
        assert!(h.queue.complete(&session, success()).await);
    }

    assert_eq!(
        h.queue.history().await,
        vec![
            HistoryEntry { duration_ms: 2000, file_count: 1 },
            HistoryEntry { duration_ms: 3000, file_count: 1 },
        ]
    );
}

#[tokio::test]
async fn unknown_session_status_is_none() {
    let h = harness(config(2));
    assert!(h.queue.status_of("never-submitted").await.is_none());
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn capacity_and_positions_hold_across_mutations() {
    let h = harness(config(2));

    let check = |active: usize, queued: &[markswift_core::job::Job]| {
        assert!(active <= 2, "active {active} exceeds capacity");
        for (i, job) in queued.iter().enumerate() {
            assert_eq!(job.queue_position, i + 1);
        }
    };

    for i in 0..6 {
        h.queue.submit(format!("s{i}"), 1 + i as u32).await.unwrap();
        check(h.queue.active_count().await, &h.queue.queued_jobs().await);
    }

    for i in 0..6 {
        h.queue.complete(&format!("s{i}"), success()).await;
        check(h.queue.active_count().await, &h.queue.queued_jobs().await);
    }

    assert_eq!(h.queue.active_count().await, 0);
    assert!(h.queue.queued_jobs().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn equal_jobs_get_non_decreasing_estimates() {
    let h = harness(config(1));

    for i in 0..5 {
        h.queue.submit(format!("s{i}"), 2).await.unwrap();
    }

    let queued = h.queue.queued_jobs().await;
    assert_eq!(queued.len(), 4);
    let waits: Vec<u64> = queued.iter().map(|j| j.estimated_wait_ms).collect();
    // One slot, each job projected at 2 * 5000 + 10000.
    assert_eq!(waits, vec![20_000, 40_000, 60_000, 80_000]);
}

#[tokio::test]
async fn try_admit_is_idempotent() {
    let h = harness(config(2));
    for i in 0..4 {
        h.queue.submit(format!("s{i}"), 1).await.unwrap();
    }

    assert_eq!(h.queue.try_admit().await, 0);
    assert_eq!(h.queue.try_admit().await, 0);
    assert_eq!(h.queue.active_count().await, 2);
    assert_eq!(h.processor.started_sessions().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_respect_capacity() {
    let h = harness(config(3));

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let queue = Arc::clone(&h.queue);
            tokio::spawn(async move { queue.submit(format!("s{i}"), 1).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.queue.active_count().await, 3);
    let queued = h.queue.queued_jobs().await;
    assert_eq!(queued.len(), 37);
    for (i, job) in queued.iter().enumerate() {
        assert_eq!(job.queue_position, i + 1);
    }
}

// ---------------------------------------------------------------------------
// Submission rules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_job_for_live_session_conflicts() {
    let h = harness(config(1));
    h.queue.submit("s1", 1).await.unwrap();

    assert_matches!(h.queue.submit("s1", 2).await, Err(CoreError::Conflict(_)));

    h.queue.complete("s1", success()).await;
    assert!(h.queue.submit("s1", 2).await.is_ok(), "finished sessions may resubmit");
}

#[tokio::test]
async fn empty_batch_rejected() {
    let h = harness(config(1));
    assert_matches!(h.queue.submit("s1", 0).await, Err(CoreError::Validation(_)));
    assert!(h.queue.status_of("s1").await.is_none());
}

#[test]
fn zero_capacity_config_rejected() {
    let result = AdmissionQueue::new(
        &config(0),
        Arc::new(RecordingSink::default()),
        Arc::new(RecordingProcessor::default()),
        Arc::new(EventBus::default()),
    );
    assert_matches!(result.err(), Some(CoreError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Completion and notification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn processor_start_failure_fails_job_and_releases_slot() {
    let h = harness(config(1));
    h.processor.reject_all();

    let ticket = h.queue.submit("s1", 2).await.unwrap();

    assert_eq!(h.queue.active_count().await, 0);
    assert_eq!(
        h.sink.kinds_for("s1"),
        vec!["queue_update", "processing_started", "error"]
    );
    assert_matches!(
        ticket.finished.await,
        Ok(JobOutcome::Failed { message, .. }) if message.contains("renderer offline")
    );
    assert_eq!(h.queue.history().await.len(), 1);
}

#[tokio::test]
async fn start_failure_moves_on_to_next_queued_job() {
    let h = harness(config(1));
    h.queue.submit("s1", 1).await.unwrap();
    h.queue.submit("s2", 1).await.unwrap();
    h.queue.submit("s3", 1).await.unwrap();

    h.processor.reject_all();
    h.queue.complete("s1", success()).await;

    // s2 and s3 both fail to start; nothing is left waiting.
    assert_eq!(h.queue.active_count().await, 0);
    assert!(h.queue.queued_jobs().await.is_empty());
    assert_eq!(h.sink.kinds_for("s3").last(), Some(&"error"));
}

#[tokio::test]
async fn terminal_message_sent_exactly_once() {
    let h = harness(config(1));
    h.queue.submit("s1", 1).await.unwrap();

    assert!(h.queue.complete("s1", success()).await);
    assert!(!h.queue.complete("s1", JobOutcome::failed("late")).await);

    let terminal = h
        .sink
        .kinds_for("s1")
        .into_iter()
        .filter(|k| *k == "complete" || *k == "error")
        .count();
    assert_eq!(terminal, 1);
}

#[tokio::test]
async fn progress_relayed_only_while_processing() {
    let h = harness(config(1));
    h.queue.submit("s1", 2).await.unwrap();
    let reporter = h.processor.take_reporter("s1");

    assert!(reporter.status(10, "Converter initialized.").await);
    assert!(
        reporter
            .progress(Notification::FileComplete {
                current_file: 1,
                total_files: 2,
                progress: 50,
                message: None,
            })
            .await
    );
    assert!(
        !reporter
            .progress(Notification::processing_started(reporter.job_id()))
            .await,
        "only progress kinds are relayed"
    );

    let job_id = reporter.job_id();
    assert!(reporter.finish(success()).await);

    assert!(
        !h.queue
            .report_progress(
                "s1",
                job_id,
                &Notification::Status { progress: 99, message: "late".into() }
            )
            .await
    );
    assert_eq!(
        h.sink.kinds_for("s1"),
        vec!["queue_update", "processing_started", "status", "file_complete", "complete"]
    );
}

#[tokio::test]
async fn stale_job_id_does_not_release_new_job() {
    let h = harness(config(1));
    h.queue.submit("s1", 1).await.unwrap();
    let old = h.processor.take_reporter("s1");
    let old_id = old.job_id();
    assert!(old.finish(success()).await);

    h.queue.submit("s1", 1).await.unwrap();

    assert!(!h.queue.complete_job("s1", old_id, JobOutcome::failed("stale")).await);
    assert_eq!(h.queue.active_count().await, 1);
}

#[tokio::test]
async fn processor_told_when_job_gives_up_slot() {
    let h = harness(config(1));
    let first = h.queue.submit("s1", 1).await.unwrap();
    h.queue.submit("s2", 1).await.unwrap();

    let reporter = h.processor.take_reporter("s1");
    assert!(reporter.is_current().await);

    // Failed from outside the processor, as the watchdog does.
    assert!(
        h.queue
            .complete_job("s1", first.job.id, JobOutcome::failed("timed out"))
            .await
    );
    assert!(!reporter.is_current().await);
    assert_eq!(h.processor.released(), vec![("s1".to_string(), first.job.id)]);

    // A rejected completion releases nothing.
    assert!(!reporter.finish(success()).await);
    assert_eq!(h.processor.released().len(), 1);
}

#[tokio::test]
async fn disconnected_session_does_not_block_admission() {
    let h = harness(config(1));
    h.sink.disconnect("s1");

    let ticket = h.queue.submit("s1", 1).await.unwrap();

    assert_eq!(h.queue.active_count().await, 1);
    assert!(h.sink.messages_for("s1").is_empty());
    assert_eq!(
        h.queue.status_of("s1").await.map(|j| j.id),
        Some(ticket.job.id)
    );
}

#[tokio::test]
async fn resend_state_replays_current_status() {
    let h = harness(config(1));
    h.queue.submit("s1", 1).await.unwrap();
    h.queue.submit("s2", 1).await.unwrap();

    assert!(h.queue.resend_state("s1").await);
    assert!(h.queue.resend_state("s2").await);
    assert!(!h.queue.resend_state("ghost").await);

    assert_matches!(h.sink.last_for("s1"), Some(Notification::ProcessingStarted { .. }));
    assert_matches!(
        h.sink.last_for("s2"),
        Some(Notification::QueueUpdate { queue_position: 1, .. })
    );
}

#[tokio::test(start_paused = true)]
async fn completion_history_updates_estimates() {
    let h = harness(config(1));
    h.queue.submit("s1", 3).await.unwrap();
    tokio::time::advance(Duration::from_secs(20)).await;
    h.queue.complete("s1", success()).await;

    let snapshot = h.queue.queue_status().await;
    assert_eq!(snapshot.history_len, 1);
    assert!((snapshot.base_overhead_ms - 6000.0).abs() < 1e-9);
    assert!((snapshot.per_file_ms - 14_000.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn lifecycle_events_published() {
    let h = harness(config(1));
    let mut rx = h.events.subscribe();

    h.queue.submit("s1", 2).await.unwrap();
    h.queue.complete("s1", success()).await;

    let kinds: Vec<QueueEventKind> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
    assert_matches!(kinds[0], QueueEventKind::Queued { file_count: 2, queue_length: 1 });
    assert_matches!(kinds[1], QueueEventKind::Admitted { active_jobs: 1, .. });
    assert_matches!(kinds[2], QueueEventKind::Finished { status: JobStatus::Completed, .. });
}

#[tokio::test]
async fn snapshot_lists_queued_jobs() {
    let h = harness(config(1));
    h.queue.submit("s1", 1).await.unwrap();
    h.queue.submit("s2", 4).await.unwrap();

    let snapshot = h.queue.queue_status().await;
    assert_eq!(snapshot.active_jobs, 1);
    assert_eq!(snapshot.queue_length, 1);
    assert_eq!(snapshot.max_concurrent_jobs, 1);
    assert_eq!(snapshot.queued[0].session_id, "s2");
    assert_eq!(snapshot.queued[0].position, 1);
    assert_eq!(snapshot.queued[0].file_count, 4);
}
