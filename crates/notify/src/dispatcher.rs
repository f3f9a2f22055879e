//! Fans run outcomes out to metric and alert sinks.
//!
//! Every sink is invoked in isolation: an error or panic in one sink is
//! logged and recorded in the [`DispatchReport`], and the remaining sinks
//! still run. Nothing here ever fails the caller.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use skytrack_core::config::NotifyConfig;
use skytrack_core::{Classification, IngestionRun};

use crate::metrics::{
    INGESTION_DURATION, INGESTION_FAILURE, INGESTION_FAILURE_BY_CATEGORY, INGESTION_RECORD_COUNT,
    INGESTION_SUCCESS,
};
use crate::templating::{AlertContext, AlertRenderer};
use crate::traits::{Alert, AlertKind, AlertSink, Dimensions, DispatchResult, MetricSink};

/// Labels and opt-ins applied to every outcome.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub environment: String,
    pub service_name: String,
    /// Success alerts are suppressed unless this is set.
    pub notify_on_success: bool,
    /// Alert on the first success after a failure.
    pub notify_on_recovery: bool,
}

impl NotifySettings {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            service_name: config.service_name.clone(),
            notify_on_success: config.notify_on_success,
            notify_on_recovery: config.notify_on_recovery,
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            environment: "development".into(),
            service_name: "ingestion-service".into(),
            notify_on_success: false,
            notify_on_recovery: false,
        }
    }
}

/// Per-sink outcomes of one notification.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub metrics: Vec<DispatchResult>,
    pub alerts: Vec<DispatchResult>,
    /// Alert kind that was sent, if any.
    pub alert_kind: Option<AlertKind>,
}

impl DispatchReport {
    pub fn failures(&self) -> usize {
        self.metrics.iter().chain(&self.alerts).filter(|r| !r.success).count()
    }

    pub fn all_delivered(&self) -> bool {
        self.failures() == 0
    }

    /// True when no sink was invoked at all.
    pub fn is_noop(&self) -> bool {
        self.metrics.is_empty() && self.alerts.is_empty()
    }
}

pub struct IngestionNotifier {
    settings: NotifySettings,
    renderer: AlertRenderer,
    metric_sinks: Vec<Arc<dyn MetricSink>>,
    alert_sinks: Vec<Arc<dyn AlertSink>>,
    last_failed: AtomicBool,
}

impl IngestionNotifier {
    pub fn new(settings: NotifySettings) -> Self {
        Self {
            settings,
            renderer: AlertRenderer::new(),
            metric_sinks: Vec::new(),
            alert_sinks: Vec::new(),
            last_failed: AtomicBool::new(false),
        }
    }

    /// Notifier with no sinks; every call is a silent no-op.
    pub fn disabled() -> Self {
        Self::new(NotifySettings::default())
    }

    pub fn with_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sinks.push(sink);
        self
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    pub fn with_renderer(mut self, renderer: AlertRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn settings(&self) -> &NotifySettings {
        &self.settings
    }

    pub fn sink_count(&self) -> (usize, usize) {
        (self.metric_sinks.len(), self.alert_sinks.len())
    }

    // ── Public API ───────────────────────────────────────────────────

    pub async fn on_success(&self, run: &IngestionRun, duration: Duration) -> DispatchReport {
        let base = self.base_dimensions();
        let secs = duration.as_secs_f64();

        let metrics = self.emit_metrics(|sink| {
            sink.increment(INGESTION_SUCCESS, 1.0, &base);
            sink.observe(INGESTION_RECORD_COUNT, run.record_count as f64, "Count", &base);
            sink.observe(INGESTION_DURATION, secs, "Seconds", &with_dim(&base, "Status", "success"));
        });

        let recovered = self.last_failed.swap(false, Ordering::SeqCst);
        let kind = if recovered && self.settings.notify_on_recovery {
            Some(AlertKind::Recovery)
        } else if self.settings.notify_on_success {
            Some(AlertKind::Success)
        } else {
            None
        };

        let alerts = match kind {
            Some(kind) => {
                let ctx = self.context(kind, run, None, secs);
                self.deliver(ctx).await
            }
            None => Vec::new(),
        };

        DispatchReport {
            metrics,
            alert_kind: kind.filter(|_| !alerts.is_empty()),
            alerts,
        }
    }

    pub async fn on_failure(
        &self,
        classification: &Classification,
        run: &IngestionRun,
        duration: Duration,
    ) -> DispatchReport {
        self.last_failed.store(true, Ordering::SeqCst);
        let base = self.base_dimensions();
        let code = classification.category.code();
        let secs = duration.as_secs_f64();

        let metrics = self.emit_metrics(|sink| {
            sink.increment(INGESTION_FAILURE, 1.0, &base);
            sink.increment(
                INGESTION_FAILURE_BY_CATEGORY,
                1.0,
                &with_dim(&base, "ErrorCategory", code),
            );
            sink.observe(INGESTION_DURATION, secs, "Seconds", &with_dim(&base, "Status", "failed"));
        });

        let ctx = self.context(AlertKind::Failure, run, Some(classification), secs);
        let alerts = self.deliver(ctx).await;

        DispatchReport {
            metrics,
            alert_kind: (!alerts.is_empty()).then_some(AlertKind::Failure),
            alerts,
        }
    }

    /// Drain buffered metric sinks. Call before the process exits.
    pub async fn flush(&self) {
        for sink in &self.metric_sinks {
            if AssertUnwindSafe(sink.flush()).catch_unwind().await.is_err() {
                tracing::warn!(sink = sink.sink_name(), "Metric sink panicked while flushing");
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn base_dimensions(&self) -> Dimensions {
        vec![
            ("Environment".to_string(), self.settings.environment.clone()),
            ("Service".to_string(), self.settings.service_name.clone()),
        ]
    }

    fn emit_metrics(&self, record: impl Fn(&dyn MetricSink)) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(self.metric_sinks.len());
        for sink in &self.metric_sinks {
            let start = Instant::now();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| record(sink.as_ref())));
            let duration_ms = start.elapsed().as_millis() as u64;
            let error = outcome.err().map(|p| panic_message(&*p));
            if let Some(e) = &error {
                tracing::warn!(sink = sink.sink_name(), error = %e, "Metric sink panicked");
            }
            results.push(DispatchResult {
                channel: sink.sink_name().to_string(),
                success: error.is_none(),
                error,
                duration_ms,
            });
        }
        results
    }

    fn context(
        &self,
        kind: AlertKind,
        run: &IngestionRun,
        classification: Option<&Classification>,
        duration_secs: f64,
    ) -> AlertContext {
        AlertContext {
            kind,
            environment: self.settings.environment.clone(),
            service: self.settings.service_name.clone(),
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            run_id: run.id,
            category: classification.map(|c| c.category.code().to_string()),
            message: classification
                .map(|c| c.message.clone())
                .or_else(|| run.error_message.clone()),
            record_count: run.record_count,
            artifact_location: run.artifact_location.clone(),
            duration_secs,
            fields: classification.map(|c| c.fields.clone()).unwrap_or_default(),
        }
    }

    fn render(&self, ctx: &AlertContext) -> Alert {
        match self.renderer.render(ctx) {
            Ok(alert) => alert,
            Err(e) => {
                tracing::warn!(error = %e, kind = ctx.kind.as_str(), "Alert template failed, sending plain alert");
                fallback_alert(ctx)
            }
        }
    }

    async fn deliver(&self, ctx: AlertContext) -> Vec<DispatchResult> {
        if self.alert_sinks.is_empty() {
            tracing::debug!(kind = ctx.kind.as_str(), "No alert sinks configured");
            return Vec::new();
        }
        let alert = self.render(&ctx);

        let mut results = Vec::with_capacity(self.alert_sinks.len());
        for sink in &self.alert_sinks {
            let start = Instant::now();
            let outcome = AssertUnwindSafe(sink.send(&alert)).catch_unwind().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(format!("sink panicked: {}", panic_message(&*panic))),
            };

            match &error {
                None => tracing::info!(
                    channel = sink.channel_name(),
                    kind = alert.kind.as_str(),
                    duration_ms,
                    "Alert delivered"
                ),
                Some(e) => tracing::warn!(
                    channel = sink.channel_name(),
                    kind = alert.kind.as_str(),
                    error = %e,
                    duration_ms,
                    "Alert delivery failed"
                ),
            }

            results.push(DispatchResult {
                channel: sink.channel_name().to_string(),
                success: error.is_none(),
                error,
                duration_ms,
            });
        }
        results
    }
}

fn with_dim(base: &Dimensions, key: &str, value: &str) -> Dimensions {
    let mut dims = base.clone();
    dims.push((key.to_string(), value.to_string()));
    dims
}

fn fallback_alert(ctx: &AlertContext) -> Alert {
    let env = ctx.environment.to_uppercase();
    let subject = match (ctx.kind, &ctx.category) {
        (AlertKind::Failure, Some(cat)) => format!("[{env}] Ingestion Failed: {cat}"),
        (AlertKind::Failure, None) => format!("[{env}] Ingestion Failed"),
        (AlertKind::Success, _) => format!("[{env}] Ingestion Succeeded"),
        (AlertKind::Recovery, _) => format!("[{env}] Ingestion Recovered"),
    };
    Alert {
        kind: ctx.kind,
        subject,
        body: ctx.message.clone().unwrap_or_default(),
        fields: ctx.fields.clone(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
