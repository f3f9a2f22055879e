use crate::error::{FetchError, StoreError};
use crate::record::Snapshot;
use crate::run::Window;

/// Upstream feed of state vectors.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, window: &Window) -> Result<Snapshot, FetchError>;

    /// Short name used in logs.
    fn source_name(&self) -> &str;
}

/// Where a stored batch ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub location: String,
    pub record_count: u64,
}

/// Durable columnar storage for fetched batches.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, snapshot: &Snapshot, window: &Window) -> Result<StoredArtifact, StoreError>;
}
