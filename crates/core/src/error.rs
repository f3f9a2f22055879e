use thiserror::Error;

/// Failures raised by a [`DataSource`](crate::DataSource) fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status_code}: {body}")]
    Api { status_code: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Failures raised by an [`ArtifactStore`](crate::ArtifactStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("artifact store not configured: {0}")]
    NotConfigured(String),

    #[error("write to {location} failed: {message}")]
    Write { location: String, message: String },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("window start {start} is after window end {end}")]
    InvertedWindow { start: String, end: String },

    #[error("unknown run status {0:?}")]
    UnknownStatus(String),
}
