//! Sink traits and shared error types.

use std::collections::BTreeMap;

/// Errors that can occur during alert delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metric publish failed: {0}")]
    Metrics(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// Metric dimensions, e.g. `[("Environment", "prod")]`.
pub type Dimensions = Vec<(String, String)>;

/// Counter and duration sink. Implementations swallow their own failures.
///
/// Recording is synchronous; sinks that publish remotely buffer data points
/// and deliver them in the background.
#[async_trait::async_trait]
pub trait MetricSink: Send + Sync {
    fn increment(&self, name: &str, value: f64, dimensions: &Dimensions);

    fn observe(&self, name: &str, value: f64, unit: &str, dimensions: &Dimensions);

    fn sink_name(&self) -> &str;

    /// Wait until everything recorded so far has been delivered.
    async fn flush(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Failure,
    Success,
    Recovery,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Failure => "failure",
            AlertKind::Success => "success",
            AlertKind::Recovery => "recovery",
        }
    }
}

/// A rendered alert ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub subject: String,
    pub body: String,
    /// Short key/value facts (environment, category, run id, ...).
    pub fields: BTreeMap<String, String>,
}

/// Human-facing alert channel.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook", "email").
    fn channel_name(&self) -> &str;
}

/// Result of delivering to a single sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
