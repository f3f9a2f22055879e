//! Outcome notification for ingestion runs.
//!
//! This crate provides:
//! - `MetricSink` and `AlertSink` traits for pluggable outcome sinks
//! - An in-process metrics registry and a tracing-backed metric sink
//! - A batching Amazon CloudWatch metric sink
//! - Webhook (Slack-compatible) and SMTP email alert sinks
//! - Minijinja rendering of alert subjects and bodies
//! - `IngestionNotifier`, which fans one outcome out to every sink in isolation

pub mod cloudwatch;
pub mod dispatcher;
pub mod email;
pub mod metrics;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use cloudwatch::CloudWatchMetricSink;
pub use dispatcher::{DispatchReport, IngestionNotifier, NotifySettings};
pub use metrics::{MetricsRegistry, TracingMetricSink};
pub use traits::{Alert, AlertSink, DispatchResult, MetricSink, NotifyError};
