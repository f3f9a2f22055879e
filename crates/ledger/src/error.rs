use skytrack_core::{RunId, RunStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("run {0} not found")]
    NotFound(RunId),

    #[error("run {id} is already {status} and can no longer be updated")]
    AlreadyTerminal { id: RunId, status: RunStatus },

    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serialization(String),

    #[error("unsupported ledger schema version {found} (expected <= {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// True when the backing database could not be reached at all, as
    /// opposed to rejecting or failing a specific statement.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            LedgerError::Database(
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
            )
        )
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
