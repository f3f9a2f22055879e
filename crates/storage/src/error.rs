use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

/// Errors that can occur while encoding a snapshot as Parquet.
#[derive(Debug, Error)]
pub enum ParquetError {
    /// Failed to build Arrow arrays from the state vectors.
    #[error("Arrow conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Failed to write the Parquet buffer.
    #[error("Parquet write error: {0}")]
    Write(#[from] parquet::errors::ParquetError),
}
