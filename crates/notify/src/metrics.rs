//! Metric sinks for run outcomes.
//!
//! [`MetricsRegistry`] keeps counters and duration summaries in process so
//! callers (and tests) can inspect them. [`TracingMetricSink`] emits every
//! data point as a structured log event.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::traits::{Dimensions, MetricSink};

// ── Metric names ─────────────────────────────────────────────────────

pub const INGESTION_SUCCESS: &str = "IngestionSuccess";
pub const INGESTION_FAILURE: &str = "IngestionFailure";
pub const INGESTION_FAILURE_BY_CATEGORY: &str = "IngestionFailureByCategory";
pub const INGESTION_RECORD_COUNT: &str = "IngestionRecordCount";
pub const INGESTION_DURATION: &str = "IngestionDuration";

/// Render `name{k=v,...}` with dimensions in sorted order.
pub fn metric_key(name: &str, dimensions: &Dimensions) -> String {
    if dimensions.is_empty() {
        return name.to_string();
    }
    let mut dims: Vec<_> = dimensions.iter().map(|(k, v)| format!("{k}={v}")).collect();
    dims.sort();
    format!("{name}{{{}}}", dims.join(","))
}

// ── In-process registry ──────────────────────────────────────────────

/// Running summary of observed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
    pub unit: String,
}

impl Summary {
    fn record(&mut self, value: f64, unit: &str) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.unit = unit.to_string();
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, f64>,
    pub summaries: BTreeMap<String, Summary>,
}

#[derive(Debug, Default)]
struct Inner {
    counters: BTreeMap<String, f64>,
    summaries: BTreeMap<String, Summary>,
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inner: Mutex<Inner>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        // A poisoned lock only means another recorder panicked mid-update;
        // counters remain usable.
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Current value of a counter, 0 when never incremented.
    pub fn counter(&self, name: &str, dimensions: &Dimensions) -> f64 {
        let key = metric_key(name, dimensions);
        self.with_inner(|i| i.counters.get(&key).copied().unwrap_or(0.0))
    }

    pub fn summary(&self, name: &str, dimensions: &Dimensions) -> Option<Summary> {
        let key = metric_key(name, dimensions);
        self.with_inner(|i| i.summaries.get(&key).cloned())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.with_inner(|i| MetricsSnapshot {
            counters: i.counters.clone(),
            summaries: i.summaries.clone(),
        })
    }
}

impl MetricSink for MetricsRegistry {
    fn increment(&self, name: &str, value: f64, dimensions: &Dimensions) {
        let key = metric_key(name, dimensions);
        self.with_inner(|i| *i.counters.entry(key).or_insert(0.0) += value);
    }

    fn observe(&self, name: &str, value: f64, unit: &str, dimensions: &Dimensions) {
        let key = metric_key(name, dimensions);
        self.with_inner(|i| i.summaries.entry(key).or_default().record(value, unit));
    }

    fn sink_name(&self) -> &str {
        "registry"
    }
}

// ── Tracing sink ─────────────────────────────────────────────────────

/// Logs each metric at info level under the `skytrack::metrics` target.
#[derive(Debug, Default)]
pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn increment(&self, name: &str, value: f64, dimensions: &Dimensions) {
        tracing::info!(
            target: "skytrack::metrics",
            metric = %metric_key(name, dimensions),
            value,
            kind = "counter",
            "metric"
        );
    }

    fn observe(&self, name: &str, value: f64, unit: &str, dimensions: &Dimensions) {
        tracing::info!(
            target: "skytrack::metrics",
            metric = %metric_key(name, dimensions),
            value,
            unit,
            kind = "observation",
            "metric"
        );
    }

    fn sink_name(&self) -> &str {
        "tracing"
    }
}
