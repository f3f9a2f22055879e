use std::sync::atomic::Ordering;
use std::sync::Arc;

use skytrack_core::config::WindowMode;
use skytrack_core::{FetchError, RunStatus, StoreError};
use skytrack_ingest::{Fault, JobRunner, WindowPolicy};
use skytrack_ledger::RunLedger;
use skytrack_notify::metrics::{INGESTION_FAILURE, INGESTION_FAILURE_BY_CATEGORY, INGESTION_SUCCESS};
use skytrack_notify::traits::AlertKind;
use skytrack_notify::{IngestionNotifier, NotifySettings};

use crate::helpers::{base_dims, harness, harness_with, FakeSource, FakeStore, Fetch};

fn with_category(code: &str) -> Vec<(String, String)> {
    let mut dims = base_dims();
    dims.push(("ErrorCategory".to_string(), code.to_string()));
    dims
}

#[tokio::test]
async fn rate_limited_fetch_fails_the_run() {
    let h = harness(
        FakeSource::new(Fetch::Fail(FetchError::RateLimited { retry_after_secs: 60 })),
        FakeStore::ok("unused"),
    )
    .await;

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Failed);
    let message = run.error_message.clone().unwrap();
    assert!(message.contains("RATE_LIMIT"), "{message}");
    assert!(message.contains("60"), "{message}");
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);

    let stored = h.ledger.get(run.id.unwrap()).await.unwrap();
    assert_eq!(stored, run);

    let alerts = h.alerts.sent();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].fields["category"], "RATE_LIMIT");
    assert_eq!(h.metrics.counter(INGESTION_FAILURE_BY_CATEGORY, &with_category("RATE_LIMIT")), 1.0);
}

#[tokio::test]
async fn empty_snapshot_succeeds_without_writing() {
    let h = harness(FakeSource::new(Fetch::Records(0)), FakeStore::ok("unused")).await;

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.record_count, 0);
    assert!(run.artifact_location.is_none());
    assert!(run.error_message.is_none());
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.counter(INGESTION_SUCCESS, &base_dims()), 1.0);
    // Success alerts are opt-in.
    assert!(h.alerts.sent().is_empty());
}

#[tokio::test]
async fn stored_snapshot_records_location_and_count() {
    let h = harness(FakeSource::new(Fetch::Records(500)), FakeStore::ok("uri://bucket/key")).await;

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.record_count, 500);
    assert_eq!(run.artifact_location.as_deref(), Some("uri://bucket/key"));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.counter(INGESTION_SUCCESS, &base_dims()), 1.0);
    assert_eq!(h.metrics.counter(INGESTION_FAILURE, &base_dims()), 0.0);

    let stored = h.ledger.get(run.id.unwrap()).await.unwrap();
    assert_eq!(stored.artifact_location.as_deref(), Some("uri://bucket/key"));
}

#[tokio::test]
async fn flights_run_covers_the_aligned_window() {
    let mut h = harness(FakeSource::new(Fetch::Flights(12)), FakeStore::ok("uri://bucket/flights/key")).await;
    h.runner = h.runner.with_window_policy(WindowPolicy::from_mode(
        WindowMode::Aligned { span_secs: 3600 },
        300,
    ));

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.record_count, 12);
    assert_eq!(run.window_end - run.window_start, chrono::Duration::hours(1));
    assert_eq!(run.window_end.timestamp() % 300, 0);

    let windows = h.source.windows.lock().unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0], run.window());
}

#[tokio::test]
async fn success_alert_sent_once_when_enabled() {
    let settings = NotifySettings {
        notify_on_success: true,
        ..Default::default()
    };
    let h = harness_with(FakeSource::new(Fetch::Records(500)), FakeStore::ok("uri://bucket/key"), settings).await;

    h.runner.run_once().await;

    let alerts = h.alerts.sent();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Success);
    assert!(alerts[0].body.contains("Records: 500"));
}

#[tokio::test]
async fn storage_write_failure_is_classified() {
    let h = harness(
        FakeSource::new(Fetch::Records(10)),
        FakeStore::failing(StoreError::Write {
            location: "s3://bucket/key".into(),
            message: "AccessDenied".into(),
        }),
    )
    .await;

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.as_deref().unwrap().starts_with("[STORAGE_WRITE]"));
    assert!(run.artifact_location.is_none());

    let alerts = h.alerts.sent();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Failure);
    assert_eq!(alerts[0].fields["category"], "STORAGE_WRITE");
    assert_eq!(h.metrics.counter(INGESTION_FAILURE, &base_dims()), 1.0);
}

#[tokio::test]
async fn ledger_update_failure_after_success_is_surfaced() {
    let h = harness(FakeSource::new(Fetch::Records(500)), FakeStore::ok("uri://bucket/key")).await;
    h.ledger.fail_update.store(true, Ordering::SeqCst);

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.record_count, 500);
    assert!(run.artifact_location.is_none());
    let message = run.error_message.unwrap();
    assert!(message.contains("[PERSISTENCE]"), "{message}");
    assert!(message.contains("500 records at uri://bucket/key"), "{message}");
    assert!(message.contains("ledger update failed"), "{message}");
    assert!(message.contains("connection reset"), "{message}");

    let alerts = h.alerts.sent();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].fields["category"], "PERSISTENCE");
}

#[tokio::test]
async fn ledger_update_failure_after_fault_keeps_both_messages() {
    let h = harness(
        FakeSource::new(Fetch::Fail(FetchError::Timeout { timeout_secs: 30 })),
        FakeStore::ok("unused"),
    )
    .await;
    h.ledger.fail_update.store(true, Ordering::SeqCst);

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Failed);
    let message = run.error_message.unwrap();
    assert!(message.starts_with("[API_TIMEOUT] API request timed out after 30s"), "{message}");
    assert!(message.contains("also failed to update record: ledger unavailable: connection reset"), "{message}");
}

#[tokio::test]
async fn create_failure_returns_detached_run() {
    let h = harness(FakeSource::new(Fetch::Records(5)), FakeStore::ok("unused")).await;
    h.ledger.fail_create.store(true, Ordering::SeqCst);

    let run = h.runner.run_once().await;

    assert_eq!(run.id, None);
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("[PERSISTENCE] Failed to create tracking record"));
    assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ledger.updates.load(Ordering::SeqCst), 0);
    assert_eq!(h.alerts.sent().len(), 1);
}

#[tokio::test]
async fn unreachable_ledger_is_reported_as_service_error() {
    let h = harness(FakeSource::new(Fetch::Records(5)), FakeStore::ok("unused")).await;
    h.ledger.unreachable.store(true, Ordering::SeqCst);

    let run = h.runner.run_once().await;

    assert_eq!(run.id, None);
    assert_eq!(run.status, RunStatus::Failed);
    let message = run.error_message.unwrap();
    assert!(message.starts_with("[SERVICE] Service error: run ledger unreachable"), "{message}");
    assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.alerts.sent().len(), 1);
}

#[tokio::test]
async fn panicking_source_is_contained() {
    let h = harness(FakeSource::new(Fetch::Panic), FakeStore::ok("unused")).await;

    let run = h.runner.run_once().await;

    assert_eq!(run.status, RunStatus::Failed);
    let message = run.error_message.unwrap();
    assert!(message.starts_with("[UNEXPECTED]"), "{message}");
    assert!(message.contains("source blew up"), "{message}");
}

#[tokio::test]
async fn each_run_creates_one_record_and_one_terminal_update() {
    let h = harness(FakeSource::new(Fetch::Records(3)), FakeStore::ok("file:///tmp/a")).await;

    for _ in 0..3 {
        h.runner.run_once().await;
    }

    assert_eq!(h.ledger.creates.load(Ordering::SeqCst), 3);
    assert_eq!(h.ledger.updates.load(Ordering::SeqCst), 3);
    let runs = h.ledger.list_latest(10).await.unwrap();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    assert_eq!(h.ledger.list_by_status(RunStatus::Pending).await.unwrap().len(), 0);
}

#[tokio::test]
async fn construction_failure_emits_uniform_failed_run() {
    let notifier = IngestionNotifier::disabled();
    let window = skytrack_core::Window::instant(chrono::Utc::now());

    let run = JobRunner::construction_failure(
        Fault::Config(skytrack_core::ConfigError::Missing("S3_BUCKET".into())),
        window,
        &notifier,
    )
    .await;

    assert_eq!(run.id, None);
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.as_deref().unwrap().starts_with("[CONFIG]"));
}

#[tokio::test]
async fn disabled_notifier_does_not_change_result() {
    let h = harness(FakeSource::new(Fetch::Records(1)), FakeStore::ok("x")).await;
    let runner = JobRunner::new(
        h.ledger.clone(),
        h.source.clone(),
        h.store.clone(),
        Arc::new(IngestionNotifier::disabled()),
    );
    let run = runner.run_once().await;
    assert_eq!(run.status, RunStatus::Success);
}
