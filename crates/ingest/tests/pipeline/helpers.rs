use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use skytrack_core::{
    ArtifactStore, DataSource, FetchError, Flight, IngestionRun, RunId, RunPatch, RunStatus,
    Snapshot, StateVector, StoreError, StoredArtifact, Window,
};
use skytrack_ingest::JobRunner;
use skytrack_ledger::{FileRunLedger, LedgerError, RunLedger};
use skytrack_notify::traits::NotifyError;
use skytrack_notify::{Alert, AlertSink, IngestionNotifier, MetricsRegistry, NotifySettings};

// ── Source ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Fetch {
    Records(usize),
    Flights(usize),
    Fail(FetchError),
    Panic,
}

pub struct FakeSource {
    behavior: Fetch,
    delay: Duration,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub windows: Mutex<Vec<Window>>,
}

impl FakeSource {
    pub fn new(behavior: Fetch) -> Arc<Self> {
        Self::slow(behavior, Duration::ZERO)
    }

    pub fn slow(behavior: Fetch, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            windows: Mutex::new(Vec::new()),
        })
    }
}

pub fn states(n: usize) -> Vec<StateVector> {
    (0..n)
        .map(|i| StateVector {
            icao24: format!("{i:06x}"),
            origin_country: "India".into(),
            last_contact: 1_700_000_000,
            ..Default::default()
        })
        .collect()
}

pub fn flights(n: usize) -> Vec<Flight> {
    (0..n)
        .map(|i| Flight {
            icao24: format!("{i:06x}"),
            first_seen: 1_767_265_200,
            last_seen: 1_767_268_800,
            ..Default::default()
        })
        .collect()
}

#[async_trait::async_trait]
impl DataSource for FakeSource {
    async fn fetch(&self, window: &Window) -> Result<Snapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().push(*window);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.behavior {
            Fetch::Records(n) => Ok(Snapshot::new(Utc::now(), states(*n))),
            Fetch::Flights(n) => Ok(Snapshot::flights(window.end(), flights(*n))),
            Fetch::Fail(e) => Err(e.clone()),
            Fetch::Panic => panic!("source blew up"),
        }
    }

    fn source_name(&self) -> &str {
        "fake"
    }
}

// ── Store ───────────────────────────────────────────────────────────

pub struct FakeStore {
    result: Result<String, StoreError>,
    pub calls: AtomicUsize,
}

impl FakeStore {
    pub fn ok(location: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(location.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: StoreError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl ArtifactStore for FakeStore {
    async fn store(&self, snapshot: &Snapshot, _window: &Window) -> Result<StoredArtifact, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map(|location| StoredArtifact {
            location,
            record_count: snapshot.len() as u64,
        })
    }
}

// ── Ledgers ─────────────────────────────────────────────────────────

/// Wraps a real ledger and can be told to fail creates or updates.
pub struct FlakyLedger {
    inner: Arc<dyn RunLedger>,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    /// Fail creates as if the database pool could not hand out a connection.
    pub unreachable: AtomicBool,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: Arc<dyn RunLedger>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl RunLedger for FlakyLedger {
    async fn create(&self, window: &Window, status: RunStatus) -> Result<IngestionRun, LedgerError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("disk full".into()));
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(LedgerError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.create(window, status).await
    }

    async fn update(&self, id: RunId, patch: &RunPatch) -> Result<IngestionRun, LedgerError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("connection reset".into()));
        }
        self.inner.update(id, patch).await
    }

    async fn get(&self, id: RunId) -> Result<IngestionRun, LedgerError> {
        self.inner.get(id).await
    }

    async fn list_latest(&self, limit: usize) -> Result<Vec<IngestionRun>, LedgerError> {
        self.inner.list_latest(limit).await
    }

    async fn list_by_status(&self, status: RunStatus) -> Result<Vec<IngestionRun>, LedgerError> {
        self.inner.list_by_status(status).await
    }

    async fn list_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<IngestionRun>, LedgerError> {
        self.inner.list_by_time_range(start, end).await
    }

    fn backend_name(&self) -> &str {
        "flaky"
    }
}

/// Purely in-memory ledger for paused-clock tests.
#[derive(Default)]
pub struct MemoryLedger {
    runs: Mutex<Vec<IngestionRun>>,
}

#[async_trait::async_trait]
impl RunLedger for MemoryLedger {
    async fn create(&self, window: &Window, status: RunStatus) -> Result<IngestionRun, LedgerError> {
        let mut runs = self.runs.lock().unwrap();
        let run = IngestionRun::new(runs.len() as RunId + 1, *window, status, Utc::now());
        runs.push(run.clone());
        Ok(run)
    }

    async fn update(&self, id: RunId, patch: &RunPatch) -> Result<IngestionRun, LedgerError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or(LedgerError::NotFound(id))?;
        run.apply(patch);
        Ok(run.clone())
    }

    async fn get(&self, id: RunId) -> Result<IngestionRun, LedgerError> {
        let runs = self.runs.lock().unwrap();
        runs.iter().find(|r| r.id == Some(id)).cloned().ok_or(LedgerError::NotFound(id))
    }

    async fn list_latest(&self, limit: usize) -> Result<Vec<IngestionRun>, LedgerError> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }

    async fn list_by_status(&self, status: RunStatus) -> Result<Vec<IngestionRun>, LedgerError> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.iter().rev().filter(|r| r.status == status).cloned().collect())
    }

    async fn list_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<IngestionRun>, LedgerError> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .iter()
            .rev()
            .filter(|r| r.window().is_within(start, end))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

// ── Alerts ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingAlertSink {
    pub alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn sent(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub runner: JobRunner,
    pub ledger: Arc<FlakyLedger>,
    pub source: Arc<FakeSource>,
    pub store: Arc<FakeStore>,
    pub alerts: Arc<RecordingAlertSink>,
    pub metrics: Arc<MetricsRegistry>,
    _dir: tempfile::TempDir,
}

pub async fn harness(source: Arc<FakeSource>, store: Arc<FakeStore>) -> Harness {
    harness_with(source, store, NotifySettings::default()).await
}

pub async fn harness_with(
    source: Arc<FakeSource>,
    store: Arc<FakeStore>,
    settings: NotifySettings,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let file = FileRunLedger::open(dir.path().join("runs.json")).await.unwrap();
    let ledger = FlakyLedger::new(Arc::new(file));
    let alerts = Arc::new(RecordingAlertSink::default());
    let metrics = Arc::new(MetricsRegistry::new());

    let notifier = IngestionNotifier::new(settings)
        .with_metric_sink(metrics.clone())
        .with_alert_sink(alerts.clone());

    let runner = JobRunner::new(ledger.clone(), source.clone(), store.clone(), Arc::new(notifier));

    Harness {
        runner,
        ledger,
        source,
        store,
        alerts,
        metrics,
        _dir: dir,
    }
}

/// Dimensions the default notifier settings attach to every metric.
pub fn base_dims() -> Vec<(String, String)> {
    vec![
        ("Environment".to_string(), "development".to_string()),
        ("Service".to_string(), "ingestion-service".to_string()),
    ]
}
