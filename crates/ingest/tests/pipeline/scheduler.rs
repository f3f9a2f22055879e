use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use skytrack_core::RunStatus;
use skytrack_ingest::{JobRunner, Scheduler, SchedulerOptions};
use skytrack_ledger::RunLedger;
use skytrack_notify::IngestionNotifier;

use crate::helpers::{FakeSource, FakeStore, Fetch, MemoryLedger};

#[tokio::test(start_paused = true)]
async fn overlapping_tick_is_skipped_and_cadence_resumes() {
    // Each run takes 90s against a 60s interval.
    let source = FakeSource::slow(Fetch::Records(2), Duration::from_secs(90));
    let ledger = Arc::new(MemoryLedger::default());
    let runner = JobRunner::new(
        ledger.clone(),
        source.clone(),
        FakeStore::ok("uri://bucket/key"),
        Arc::new(IngestionNotifier::disabled()),
    );

    let mut scheduler = Scheduler::new(
        Arc::new(runner),
        SchedulerOptions::new(Duration::from_secs(60), true),
    );
    scheduler.start().unwrap();

    // t=0 run starts, t=60 skipped, t=90 run ends, t=120 second run starts.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.stats().ticks_skipped(), 1);

    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    // Stop at t=150 waits for the second run (ends at t=210).
    scheduler.stop().await.unwrap();

    assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
    let stats = scheduler.stats();
    assert_eq!(stats.runs_started(), 2);
    assert_eq!(stats.runs_completed(), 2);
    assert_eq!(stats.ticks(), 3);
    assert_eq!(stats.ticks_skipped(), 1);

    let runs = ledger.list_latest(10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn failing_runs_keep_the_scheduler_alive() {
    let source = FakeSource::new(Fetch::Fail(skytrack_core::FetchError::Connection("refused".into())));
    let ledger = Arc::new(MemoryLedger::default());
    let runner = JobRunner::new(
        ledger.clone(),
        source.clone(),
        FakeStore::ok("unused"),
        Arc::new(IngestionNotifier::disabled()),
    );

    let mut scheduler = Scheduler::new(
        Arc::new(runner),
        SchedulerOptions::new(Duration::from_secs(60), true),
    );
    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_secs(130)).await;
    scheduler.stop().await.unwrap();

    assert_eq!(scheduler.stats().runs_failed(), 3);
    let failed = ledger.list_by_status(RunStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 3);
    assert!(failed[0].error_message.as_deref().unwrap().starts_with("[API_CONNECTION]"));
}
