//! One ingestion attempt, end to end.
//!
//! [`JobRunner::run`] creates a pending ledger record, fetches a snapshot,
//! stores it when non-empty, writes the terminal status, and notifies. It
//! never returns an error and never lets a collaborator panic escape: every
//! path ends in a terminal [`IngestionRun`], ledger-backed or synthesized.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{error, info, warn};

use skytrack_core::{
    ArtifactStore, Classification, DataSource, ErrorCategory, IngestionRun, RunPatch, RunStatus,
    Window,
};
use skytrack_ledger::RunLedger;
use skytrack_notify::{DispatchReport, IngestionNotifier};

use crate::classify::{classify, Fault};
use crate::window::WindowPolicy;

/// Anything a scheduler can drive.
#[async_trait::async_trait]
pub trait IngestJob: Send + Sync {
    /// Execute one attempt. Must always produce a terminal run.
    async fn run(&self) -> IngestionRun;
}

/// What a successful fetch/store produced.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Outcome {
    record_count: u64,
    location: Option<String>,
}

pub struct JobRunner {
    ledger: Arc<dyn RunLedger>,
    source: Arc<dyn DataSource>,
    store: Arc<dyn ArtifactStore>,
    notifier: Arc<IngestionNotifier>,
    window: WindowPolicy,
}

impl JobRunner {
    pub fn new(
        ledger: Arc<dyn RunLedger>,
        source: Arc<dyn DataSource>,
        store: Arc<dyn ArtifactStore>,
        notifier: Arc<IngestionNotifier>,
    ) -> Self {
        Self {
            ledger,
            source,
            store,
            notifier,
            window: WindowPolicy::default(),
        }
    }

    pub fn with_window_policy(mut self, window: WindowPolicy) -> Self {
        self.window = window;
        self
    }

    /// Emit the id-less Failed run for a collaborator that could not be built.
    ///
    /// Used when there is no ledger to record into; the failure is still
    /// classified and sent through `notifier` so consumers see one shape.
    pub async fn construction_failure(
        fault: Fault,
        window: Window,
        notifier: &IngestionNotifier,
    ) -> IngestionRun {
        let classification = classify(&fault);
        let run = IngestionRun::detached_failure(window, classification.summary());
        error!(error = %classification.summary(), "Ingestion could not start");
        let report = notifier.on_failure(&classification, &run, Duration::ZERO).await;
        log_report(&report);
        run
    }

    // ── Public API ──────────────────────────────────────────────────

    pub async fn run_once(&self) -> IngestionRun {
        let started = Instant::now();
        let window = self.window.current();

        info!(
            source = self.source.source_name(),
            ledger = self.ledger.backend_name(),
            window_start = %window.start(),
            window_end = %window.end(),
            "Ingestion run starting"
        );

        let pending = match self.ledger.create(&window, RunStatus::Pending).await {
            Ok(run) => run,
            Err(e) => {
                let classification = match Fault::from(e) {
                    Fault::Ledger(e) => Classification::new(
                        ErrorCategory::PersistenceError,
                        format!("Failed to create tracking record: {e}"),
                    ),
                    fault => classify(&fault),
                };
                let run = IngestionRun::detached_failure(window, classification.summary());
                error!(error = %classification.message, "Could not create run record, aborting attempt");
                self.notify_failure(&classification, &run, started.elapsed()).await;
                return run;
            }
        };
        // Ledger-created runs always carry an id.
        let id = pending.id.unwrap_or_default();

        let outcome = AssertUnwindSafe(self.execute(&window))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Fault::Panic(panic_message(&*panic))));

        match outcome {
            Ok(outcome) => self.finish_success(pending, id, outcome, started).await,
            Err(fault) => self.finish_failure(pending, id, fault, started).await,
        }
    }

    // ── Steps ───────────────────────────────────────────────────────

    async fn execute(&self, window: &Window) -> Result<Outcome, Fault> {
        let snapshot = self.source.fetch(window).await?;
        info!(records = snapshot.len(), "Snapshot fetched");

        if snapshot.is_empty() {
            return Ok(Outcome {
                record_count: 0,
                location: None,
            });
        }

        let artifact = self.store.store(&snapshot, window).await?;
        info!(
            records = artifact.record_count,
            location = %artifact.location,
            "Artifact stored"
        );
        Ok(Outcome {
            record_count: artifact.record_count,
            location: Some(artifact.location),
        })
    }

    async fn finish_success(
        &self,
        pending: IngestionRun,
        id: u64,
        outcome: Outcome,
        started: Instant,
    ) -> IngestionRun {
        let patch = RunPatch::success(outcome.record_count, outcome.location.clone());

        match self.ledger.update(id, &patch).await {
            Ok(run) => {
                let elapsed = started.elapsed();
                info!(
                    run_id = id,
                    records = run.record_count,
                    duration_ms = elapsed.as_millis() as u64,
                    "Ingestion run succeeded"
                );
                let report = self.notifier.on_success(&run, elapsed).await;
                log_report(&report);
                run
            }
            Err(e) => {
                // The data landed but the ledger does not know. Surface both.
                let location = outcome.location.as_deref().unwrap_or("no artifact written");
                let classification = Classification::new(
                    ErrorCategory::PersistenceError,
                    format!(
                        "Ingestion succeeded ({} records at {}) but ledger update failed: {}",
                        outcome.record_count, location, e
                    ),
                )
                .with_field("record_count", outcome.record_count)
                .with_field("location", location);

                let mut run = pending;
                run.apply(&RunPatch::partial(outcome.record_count, classification.summary()));
                error!(run_id = id, error = %e, "Ledger update failed after successful ingestion");
                self.notify_failure(&classification, &run, started.elapsed()).await;
                run
            }
        }
    }

    async fn finish_failure(
        &self,
        pending: IngestionRun,
        id: u64,
        fault: Fault,
        started: Instant,
    ) -> IngestionRun {
        let classification = classify(&fault);
        let summary = classification.summary();
        warn!(
            run_id = id,
            category = classification.category.code(),
            error = %classification.message,
            "Ingestion run failed"
        );

        let run = match self.ledger.update(id, &RunPatch::failed(summary.clone())).await {
            Ok(run) => run,
            Err(e) => {
                error!(run_id = id, error = %e, "Ledger update failed while recording failure");
                let mut run = pending;
                run.apply(&RunPatch::failed(format!(
                    "{summary} (also failed to update record: {e})"
                )));
                run
            }
        };

        self.notify_failure(&classification, &run, started.elapsed()).await;
        run
    }

    async fn notify_failure(&self, classification: &Classification, run: &IngestionRun, elapsed: Duration) {
        let report = self.notifier.on_failure(classification, run, elapsed).await;
        log_report(&report);
    }
}

#[async_trait::async_trait]
impl IngestJob for JobRunner {
    async fn run(&self) -> IngestionRun {
        self.run_once().await
    }
}

fn log_report(report: &DispatchReport) {
    if report.is_noop() {
        return;
    }
    if report.all_delivered() {
        tracing::debug!(
            metrics = report.metrics.len(),
            alerts = report.alerts.len(),
            "Notification dispatched"
        );
    } else {
        warn!(
            failures = report.failures(),
            alerts = report.alerts.len(),
            "Some notification sinks failed"
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
