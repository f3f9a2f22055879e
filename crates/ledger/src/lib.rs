//! Durable record of ingestion runs.
//!
//! Two backends implement [`RunLedger`]: [`FileRunLedger`] keeps a single
//! JSON document on local disk, [`PgRunLedger`] stores rows in PostgreSQL.

pub mod error;
pub mod file;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use skytrack_core::config::{LedgerBackend, LedgerConfig, PostgresConfig};
use skytrack_core::{IngestionRun, RunId, RunPatch, RunStatus, Window};

pub use error::LedgerError;
pub use file::FileRunLedger;
pub use postgres::PgRunLedger;

/// Store of run records. Every write is durable before the call returns.
#[async_trait::async_trait]
pub trait RunLedger: Send + Sync {
    /// Insert a new run with a fresh monotonic id and the current timestamp.
    async fn create(&self, window: &Window, status: RunStatus) -> Result<IngestionRun, LedgerError>;

    /// Apply a partial patch. Terminal runs are immutable.
    async fn update(&self, id: RunId, patch: &RunPatch) -> Result<IngestionRun, LedgerError>;

    async fn get(&self, id: RunId) -> Result<IngestionRun, LedgerError>;

    /// Up to `limit` runs, newest `created_at` first.
    async fn list_latest(&self, limit: usize) -> Result<Vec<IngestionRun>, LedgerError>;

    async fn list_by_status(&self, status: RunStatus) -> Result<Vec<IngestionRun>, LedgerError>;

    /// Runs whose window lies entirely inside `[start, end]`, newest first.
    async fn list_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<IngestionRun>, LedgerError>;

    fn backend_name(&self) -> &str;
}

/// Open the ledger selected by configuration.
pub async fn open(
    config: &LedgerConfig,
    postgres: &PostgresConfig,
) -> Result<Arc<dyn RunLedger>, LedgerError> {
    let kind = config
        .backend_kind()
        .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
    match kind {
        LedgerBackend::File => Ok(Arc::new(FileRunLedger::open(&config.path).await?)),
        LedgerBackend::Postgres => Ok(Arc::new(PgRunLedger::connect(postgres).await?)),
    }
}

/// Reject any patch on a run that already reached a terminal status.
pub(crate) fn check_transition(run: &IngestionRun) -> Result<(), LedgerError> {
    if run.status.is_terminal() {
        return Err(LedgerError::AlreadyTerminal {
            id: run.id.unwrap_or_default(),
            status: run.status,
        });
    }
    Ok(())
}
