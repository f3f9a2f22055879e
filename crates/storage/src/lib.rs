//! Artifact storage for captured snapshots of state vectors or flights.
//!
//! Snapshots are encoded as Zstd-compressed Parquet ([`encode`]) and written
//! through `object_store` to S3, the local filesystem, or memory
//! ([`backend`]). [`ParquetArtifactStore`] ties the two together behind
//! [`skytrack_core::ArtifactStore`].

pub mod backend;
pub mod encode;
pub mod error;
pub mod store;

pub use backend::StorageBackend;
pub use encode::{encode_snapshot, flight_schema, schema_for, snapshot_to_record_batch, state_schema};
pub use error::{ParquetError, StorageError};
pub use store::{object_key, ParquetArtifactStore};
