//! Run records tracked by the ledger.
//!
//! A run moves from [`RunStatus::Pending`] to exactly one terminal status.
//! The storage form of the status is a lowercase string, pinned by
//! [`STATUS_SCHEMA_VERSION`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Ledger-assigned identifier. Monotonic per ledger.
pub type RunId = u64;

/// Version of the status <-> string mapping below. Bump when a variant is
/// added or a storage string changes.
pub const STATUS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RunStatus {
    Pending,
    Success,
    Failed,
    Partial,
}

impl RunStatus {
    pub const ALL: [RunStatus; 4] = [
        RunStatus::Pending,
        RunStatus::Success,
        RunStatus::Failed,
        RunStatus::Partial,
    ];

    pub fn as_storage_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Partial => "partial",
        }
    }

    pub fn from_storage_str(s: &str) -> Result<Self, ModelError> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "partial" => Ok(RunStatus::Partial),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_storage_str())
    }
}

impl FromStr for RunStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_storage_str(s)
    }
}

impl TryFrom<String> for RunStatus {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_storage_str(&s)
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_storage_str().to_string()
    }
}

// ── Window ────────────────────────────────────────────────────

/// Time range a run targets. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ModelError> {
        if start > end {
            return Err(ModelError::InvertedWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Zero-width window for a point-in-time snapshot.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True when this window lies entirely inside `[start, end]`.
    pub fn is_within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start >= start && self.end <= end
    }
}

// ── Run record ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRun {
    /// `None` only for runs synthesized after the ledger refused to create one.
    pub id: Option<RunId>,
    pub created_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub artifact_location: Option<String>,
    pub record_count: u64,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

impl IngestionRun {
    pub fn new(id: RunId, window: Window, status: RunStatus, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Some(id),
            created_at,
            window_start: window.start(),
            window_end: window.end(),
            artifact_location: None,
            record_count: 0,
            status,
            error_message: None,
        }
    }

    /// A Failed run that was never persisted.
    pub fn detached_failure(window: Window, message: impl Into<String>) -> Self {
        Self {
            id: None,
            created_at: Utc::now(),
            window_start: window.start(),
            window_end: window.end(),
            artifact_location: None,
            record_count: 0,
            status: RunStatus::Failed,
            error_message: Some(message.into()),
        }
    }

    pub fn window(&self) -> Window {
        Window {
            start: self.window_start,
            end: self.window_end.max(self.window_start),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update. Fields left `None` in the patch are retained.
    pub fn apply(&mut self, patch: &RunPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(location) = &patch.artifact_location {
            self.artifact_location = Some(location.clone());
        }
        if let Some(count) = patch.record_count {
            self.record_count = count;
        }
        if let Some(message) = &patch.error_message {
            self.error_message = Some(message.clone());
        }
    }
}

/// Partial update for a run; `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub artifact_location: Option<String>,
    pub record_count: Option<u64>,
    pub error_message: Option<String>,
}

impl RunPatch {
    /// Location is only recorded when something was written.
    pub fn success(record_count: u64, artifact_location: Option<String>) -> Self {
        Self {
            status: Some(RunStatus::Success),
            artifact_location: artifact_location.filter(|_| record_count > 0),
            record_count: Some(record_count),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn partial(record_count: u64, message: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Partial),
            record_count: Some(record_count),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.artifact_location.is_none()
            && self.record_count.is_none()
            && self.error_message.is_none()
    }
}
