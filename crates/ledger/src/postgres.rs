//! PostgreSQL-backed run ledger.
//!
//! The `ingestion_runs` table is created on connect if it does not exist.
//! Status is stored as its lowercase storage string.

use chrono::{DateTime, Utc};
use skytrack_core::config::PostgresConfig;
use skytrack_core::{IngestionRun, RunId, RunPatch, RunStatus, Window};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::{check_transition, LedgerError, RunLedger};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS ingestion_runs (
        id                BIGSERIAL PRIMARY KEY,
        created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
        window_start      TIMESTAMPTZ NOT NULL,
        window_end        TIMESTAMPTZ NOT NULL,
        artifact_location TEXT,
        record_count      BIGINT NOT NULL DEFAULT 0,
        status            TEXT NOT NULL DEFAULT 'pending',
        error_message     TEXT,
        CONSTRAINT ingestion_runs_window_order CHECK (window_start <= window_end)
    )",
    "CREATE INDEX IF NOT EXISTS idx_ingestion_runs_created_at ON ingestion_runs (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_ingestion_runs_status ON ingestion_runs (status)",
];

const COLUMNS: &str =
    "id, created_at, window_start, window_end, artifact_location, record_count, status, error_message";

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: i64,
    created_at: DateTime<Utc>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    artifact_location: Option<String>,
    record_count: i64,
    status: String,
    error_message: Option<String>,
}

impl TryFrom<RunRow> for IngestionRun {
    type Error = LedgerError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status = RunStatus::from_storage_str(&row.status)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        Ok(IngestionRun {
            id: Some(row.id as RunId),
            created_at: row.created_at,
            window_start: row.window_start,
            window_end: row.window_end,
            artifact_location: row.artifact_location,
            record_count: row.record_count.max(0) as u64,
            status,
            error_message: row.error_message,
        })
    }
}

fn convert(rows: Vec<RunRow>) -> Result<Vec<IngestionRun>, LedgerError> {
    rows.into_iter().map(IngestionRun::try_from).collect()
}

pub struct PgRunLedger {
    pool: PgPool,
}

impl PgRunLedger {
    pub async fn connect(config: &PostgresConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!(host = %config.host, database = %config.database, "Connected to PostgreSQL run ledger");
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and make sure the schema exists.
    pub async fn with_pool(pool: PgPool) -> Result<Self, LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl RunLedger for PgRunLedger {
    async fn create(&self, window: &Window, status: RunStatus) -> Result<IngestionRun, LedgerError> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "INSERT INTO ingestion_runs (window_start, window_end, status)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        ))
        .bind(window.start())
        .bind(window.end())
        .bind(status.as_storage_str())
        .fetch_one(&self.pool)
        .await?;
        debug!(run_id = row.id, status = %status, "Run created");
        row.try_into()
    }

    async fn update(&self, id: RunId, patch: &RunPatch) -> Result<IngestionRun, LedgerError> {
        // Only pending rows match, so the terminal transition is a single
        // conditional write and two writers cannot both complete a run.
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "UPDATE ingestion_runs SET
                status            = COALESCE($2, status),
                artifact_location = COALESCE($3, artifact_location),
                record_count      = COALESCE($4, record_count),
                error_message     = COALESCE($5, error_message)
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        ))
        .bind(id as i64)
        .bind(patch.status.map(|s| s.as_storage_str()))
        .bind(patch.artifact_location.as_deref())
        .bind(patch.record_count.map(|c| c as i64))
        .bind(patch.error_message.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                debug!(run_id = id, "Run updated");
                row.try_into()
            }
            None => {
                // Either missing or already terminal; report which.
                let current = self.get(id).await?;
                check_transition(&current)?;
                Err(LedgerError::Unavailable(format!("update of run {id} was not applied")))
            }
        }
    }

    async fn get(&self, id: RunId) -> Result<IngestionRun, LedgerError> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {COLUMNS} FROM ingestion_runs WHERE id = $1"
        ))
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(LedgerError::NotFound(id))?.try_into()
    }

    async fn list_latest(&self, limit: usize) -> Result<Vec<IngestionRun>, LedgerError> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {COLUMNS} FROM ingestion_runs ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn list_by_status(&self, status: RunStatus) -> Result<Vec<IngestionRun>, LedgerError> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {COLUMNS} FROM ingestion_runs WHERE status = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(status.as_storage_str())
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn list_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<IngestionRun>, LedgerError> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {COLUMNS} FROM ingestion_runs
             WHERE window_start >= $1 AND window_end <= $2
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}
