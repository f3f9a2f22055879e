use async_trait::async_trait;
use chrono::{DateTime, Utc};
use object_store::path::Path;
use object_store::PutPayload;
use tracing::{info, warn};

use skytrack_core::{ArtifactStore, Config, DataKind, Snapshot, StoreError, StoredArtifact, Window};

use crate::backend::StorageBackend;
use crate::encode::encode_snapshot;
use crate::error::StorageError;

/// Object key for a `kind` batch captured at `capture_time`:
/// `{prefix}/{kind}/year=YYYY/month=MM/day=DD/YYYYMMDD_HHMMSS.parquet`.
pub fn object_key(prefix: &str, kind: DataKind, capture_time: DateTime<Utc>) -> String {
    let partition = format!(
        "{kind}/{}",
        capture_time.format("year=%Y/month=%m/day=%d/%Y%m%d_%H%M%S.parquet")
    );
    if prefix.is_empty() {
        partition.to_string()
    } else {
        format!("{prefix}/{partition}")
    }
}

/// Writes snapshots as Parquet objects under a key prefix.
pub struct ParquetArtifactStore {
    backend: StorageBackend,
    prefix: String,
}

impl ParquetArtifactStore {
    pub fn new(backend: StorageBackend, prefix: &str) -> Self {
        Self {
            backend,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let backend = StorageBackend::from_config(config)?;
        Ok(Self::new(backend, &config.aws.s3_prefix))
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl ArtifactStore for ParquetArtifactStore {
    async fn store(&self, snapshot: &Snapshot, _window: &Window) -> Result<StoredArtifact, StoreError> {
        let bytes = encode_snapshot(snapshot).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let size = bytes.len();

        let key = Path::from(object_key(&self.prefix, snapshot.kind(), snapshot.capture_time));
        let location = self.backend.location(&key);

        if let Err(e) = self.backend.store().put(&key, PutPayload::from(bytes)).await {
            warn!(%location, error = %e, "Artifact upload failed");
            return Err(StoreError::Write {
                location,
                message: e.to_string(),
            });
        }

        info!(
            %location,
            backend = self.backend.kind(),
            data_type = %snapshot.kind(),
            records = snapshot.len(),
            bytes = size,
            "Artifact written"
        );
        Ok(StoredArtifact {
            location,
            record_count: snapshot.len() as u64,
        })
    }
}
