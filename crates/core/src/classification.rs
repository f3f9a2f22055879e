//! Closed taxonomy of run failures.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit { retry_after_seconds: u64 },
    Timeout,
    ConnectionFailure,
    RemoteApiError { status_code: u16 },
    StorageConfigError,
    StorageWriteError,
    SerializationError,
    PersistenceError,
    ConfigError,
    ServiceError,
    Unexpected,
}

impl ErrorCategory {
    /// Stable code used in ledger messages and metric dimensions.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit { .. } => "RATE_LIMIT",
            ErrorCategory::Timeout => "API_TIMEOUT",
            ErrorCategory::ConnectionFailure => "API_CONNECTION",
            ErrorCategory::RemoteApiError { .. } => "API_ERROR",
            ErrorCategory::StorageConfigError => "STORAGE_CONFIG",
            ErrorCategory::StorageWriteError => "STORAGE_WRITE",
            ErrorCategory::SerializationError => "SERIALIZATION",
            ErrorCategory::PersistenceError => "PERSISTENCE",
            ErrorCategory::ConfigError => "CONFIG",
            ErrorCategory::ServiceError => "SERVICE",
            ErrorCategory::Unexpected => "UNEXPECTED",
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            ErrorCategory::StorageConfigError
                | ErrorCategory::StorageWriteError
                | ErrorCategory::SerializationError
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of classifying a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl Classification {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    /// `[CODE] message`, the form written to the ledger.
    pub fn summary(&self) -> String {
        format!("[{}] {}", self.category.code(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prefixes_code() {
        let c = Classification::new(ErrorCategory::RateLimit { retry_after_seconds: 60 }, "slow down");
        assert_eq!(c.summary(), "[RATE_LIMIT] slow down");
    }

    #[test]
    fn storage_categories() {
        assert!(ErrorCategory::StorageWriteError.is_storage());
        assert!(ErrorCategory::SerializationError.is_storage());
        assert!(!ErrorCategory::PersistenceError.is_storage());
    }
}
