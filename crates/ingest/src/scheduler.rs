//! Fixed-interval, single-flight driver for an [`IngestJob`].
//!
//! `Idle -> Running` on [`Scheduler::start`], `Running -> Stopped` on
//! [`Scheduler::stop`] (or a termination signal). A tick that fires while
//! the previous run is still in flight is skipped, never queued. Stopping
//! prevents new ticks and waits for the in-flight run to finish.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use skytrack_core::RunStatus;

use crate::job_runner::IngestJob;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("interval must be positive")]
    ZeroInterval,

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),

    #[error("scheduler task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub interval: Duration,
    /// Run immediately on start instead of waiting one interval.
    pub run_on_start: bool,
}

impl SchedulerOptions {
    pub fn new(interval: Duration, run_on_start: bool) -> Self {
        Self {
            interval,
            run_on_start,
        }
    }
}

/// Counters shared between the scheduler handle and its driver task.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl SchedulerStats {
    /// Timer ticks observed, whether they started a run or were skipped.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn runs_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn runs_completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Ticks dropped because a run was still in flight.
    pub fn ticks_skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Completed runs whose terminal status was not Success.
    pub fn runs_failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn runs_panicked(&self) -> u64 {
        self.panicked.load(Ordering::SeqCst)
    }
}

pub struct Scheduler {
    job: Arc<dyn IngestJob>,
    options: SchedulerOptions,
    state: SchedulerState,
    stats: Arc<SchedulerStats>,
    shutdown: Option<watch::Sender<bool>>,
    driver: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(job: Arc<dyn IngestJob>, options: SchedulerOptions) -> Self {
        Self {
            job,
            options,
            state: SchedulerState::Idle,
            stats: Arc::new(SchedulerStats::default()),
            shutdown: None,
            driver: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    // ── Public API ──────────────────────────────────────────────────

    /// Start ticking. Allowed from `Idle` or `Stopped`.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.state == SchedulerState::Running {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.options.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let (tx, rx) = watch::channel(false);
        let job = Arc::clone(&self.job);
        let stats = Arc::clone(&self.stats);
        let options = self.options;

        info!(
            interval_secs = options.interval.as_secs(),
            run_on_start = options.run_on_start,
            "Scheduler started"
        );

        self.driver = Some(tokio::spawn(drive(job, options, stats, rx)));
        self.shutdown = Some(tx);
        self.state = SchedulerState::Running;
        Ok(())
    }

    /// Stop ticking and wait for any in-flight run to finish.
    pub async fn stop(&mut self) -> Result<(), SchedulerError> {
        if self.state != SchedulerState::Running {
            return Err(SchedulerError::NotRunning);
        }
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        self.state = SchedulerState::Stopped;

        if let Some(driver) = self.driver.take() {
            driver
                .await
                .map_err(|e| SchedulerError::Join(e.to_string()))?;
        }
        info!(
            ticks = self.stats.ticks(),
            runs = self.stats.runs_completed(),
            skipped = self.stats.ticks_skipped(),
            "Scheduler stopped"
        );
        Ok(())
    }

    /// Start, run until SIGINT/SIGTERM, then stop gracefully.
    pub async fn run_until_signal(&mut self) -> Result<(), SchedulerError> {
        self.start()?;
        let signal = shutdown_signal().await;
        if let Err(e) = &signal {
            error!(error = %e, "Signal handler failed, stopping scheduler");
        } else {
            info!("Shutdown signal received");
        }
        self.stop().await?;
        signal.map_err(SchedulerError::from)
    }
}

// ── Driver ──────────────────────────────────────────────────────────

async fn drive(
    job: Arc<dyn IngestJob>,
    options: SchedulerOptions,
    stats: Arc<SchedulerStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = if options.run_on_start {
        interval(options.interval)
    } else {
        interval_at(Instant::now() + options.interval, options.interval)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                stats.ticks.fetch_add(1, Ordering::SeqCst);
                if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                    stats.skipped.fetch_add(1, Ordering::SeqCst);
                    warn!("Previous run still in flight, skipping tick");
                    continue;
                }
                in_flight = Some(tokio::spawn(execute(Arc::clone(&job), Arc::clone(&stats))));
            }
        }
    }

    if let Some(handle) = in_flight {
        if !handle.is_finished() {
            info!("Waiting for in-flight run to finish");
        }
        if let Err(e) = handle.await {
            error!(error = %e, "In-flight run task failed");
        }
    }
}

async fn execute(job: Arc<dyn IngestJob>, stats: Arc<SchedulerStats>) {
    stats.started.fetch_add(1, Ordering::SeqCst);
    match AssertUnwindSafe(job.run()).catch_unwind().await {
        Ok(run) => {
            stats.completed.fetch_add(1, Ordering::SeqCst);
            if run.status == RunStatus::Success {
                info!(run_id = ?run.id, records = run.record_count, "Scheduled run finished");
            } else {
                stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    run_id = ?run.id,
                    status = %run.status,
                    error = run.error_message.as_deref().unwrap_or(""),
                    "Scheduled run finished unsuccessfully"
                );
            }
        }
        Err(_) => {
            stats.panicked.fetch_add(1, Ordering::SeqCst);
            error!("Scheduled run panicked; scheduler continues");
        }
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            _ = sigterm.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
