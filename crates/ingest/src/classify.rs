//! Pure mapping from run faults to [`Classification`]s.

use skytrack_core::{Classification, ConfigError, ErrorCategory, FetchError, StoreError};
use skytrack_ledger::LedgerError;

/// Upstream bodies are cut to this many characters in messages.
const MAX_BODY_CHARS: usize = 500;

/// Anything that can end a run early, tagged by where it came from.
#[derive(Debug)]
pub enum Fault {
    Fetch(FetchError),
    Store(StoreError),
    Ledger(LedgerError),
    Config(ConfigError),
    /// A backing service could not be reached.
    Service(String),
    /// A collaborator panicked.
    Panic(String),
    Other { type_name: String, message: String },
}

impl Fault {
    /// Wrap an arbitrary error, keeping its concrete type name.
    pub fn other<E: std::error::Error>(error: &E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Fault::Other {
            type_name: short.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<FetchError> for Fault {
    fn from(e: FetchError) -> Self {
        Fault::Fetch(e)
    }
}

impl From<StoreError> for Fault {
    fn from(e: StoreError) -> Self {
        Fault::Store(e)
    }
}

impl From<LedgerError> for Fault {
    fn from(e: LedgerError) -> Self {
        if e.is_connectivity() {
            Fault::Service(format!("run ledger unreachable: {e}"))
        } else {
            Fault::Ledger(e)
        }
    }
}

impl From<ConfigError> for Fault {
    fn from(e: ConfigError) -> Self {
        Fault::Config(e)
    }
}

/// Classify a fault. Total and deterministic.
pub fn classify(fault: &Fault) -> Classification {
    match fault {
        Fault::Fetch(FetchError::RateLimited { retry_after_secs }) => Classification::new(
            ErrorCategory::RateLimit {
                retry_after_seconds: *retry_after_secs,
            },
            format!("API rate limit exceeded. Retry after {retry_after_secs}s"),
        )
        .with_field("retry_after_seconds", retry_after_secs),

        Fault::Fetch(FetchError::Timeout { timeout_secs }) => Classification::new(
            ErrorCategory::Timeout,
            format!("API request timed out after {timeout_secs}s"),
        )
        .with_field("timeout_seconds", timeout_secs),

        Fault::Fetch(FetchError::Connection(msg)) => Classification::new(
            ErrorCategory::ConnectionFailure,
            format!("Failed to connect to upstream API: {msg}"),
        ),

        Fault::Fetch(FetchError::Api { status_code, body }) => Classification::new(
            ErrorCategory::RemoteApiError {
                status_code: *status_code,
            },
            format!("Upstream API error (HTTP {status_code}): {}", truncate(body)),
        )
        .with_field("status_code", status_code),

        Fault::Fetch(FetchError::Decode(msg)) => Classification::new(
            ErrorCategory::SerializationError,
            format!("Malformed upstream response: {msg}"),
        ),

        Fault::Store(StoreError::NotConfigured(msg)) => Classification::new(
            ErrorCategory::StorageConfigError,
            format!("Artifact storage not configured: {msg}"),
        ),

        Fault::Store(StoreError::Write { location, message }) => Classification::new(
            ErrorCategory::StorageWriteError,
            format!("Failed to write artifact ({location}): {message}"),
        )
        .with_field("location", location),

        Fault::Store(StoreError::Serialization(msg)) => Classification::new(
            ErrorCategory::SerializationError,
            format!("Failed to encode artifact: {msg}"),
        ),

        Fault::Ledger(e) => Classification::new(
            ErrorCategory::PersistenceError,
            format!("Run ledger error: {e}"),
        ),

        Fault::Config(e) => Classification::new(
            ErrorCategory::ConfigError,
            format!("Configuration error: {e}"),
        ),

        Fault::Service(msg) => {
            Classification::new(ErrorCategory::ServiceError, format!("Service error: {msg}"))
        }

        Fault::Panic(msg) => Classification::new(
            ErrorCategory::Unexpected,
            format!("Unexpected error (panic): {msg}"),
        ),

        Fault::Other { type_name, message } => Classification::new(
            ErrorCategory::Unexpected,
            format!("Unexpected error ({type_name}): {message}"),
        )
        .with_field("type_name", type_name),
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_BODY_CHARS).collect();
        format!("{cut}...")
    }
}
