//! Builds the runner's collaborators from [`Config`].
//!
//! Nothing here is global: every collaborator is constructed once and
//! passed into [`JobRunner::new`].

use std::sync::Arc;

use tracing::{info, warn};

use skytrack_core::{Config, ConfigError};
use skytrack_ingest::{Fault, JobRunner, WindowPolicy};
use skytrack_notify::email::EmailAlertSink;
use skytrack_notify::webhook::WebhookAlertSink;
use skytrack_notify::{CloudWatchMetricSink, IngestionNotifier, NotifySettings, TracingMetricSink};
use skytrack_source::OpenSkySource;
use skytrack_storage::ParquetArtifactStore;

/// Notifier with every sink the configuration enables.
///
/// Alert sinks that cannot be built are skipped with a warning; a broken
/// alert channel never stops ingestion.
pub async fn notifier(config: &Config) -> IngestionNotifier {
    let mut notifier = IngestionNotifier::new(NotifySettings::from_config(&config.notify));

    if config.notify.metrics_enabled {
        notifier = notifier.with_metric_sink(Arc::new(TracingMetricSink));
        if config.notify.cloudwatch_enabled {
            let sink = CloudWatchMetricSink::connect(&config.notify, &config.aws).await;
            notifier = notifier.with_metric_sink(Arc::new(sink));
        }
    }

    if let Some(url) = &config.notify.webhook_url {
        match WebhookAlertSink::new(url) {
            Ok(sink) => notifier = notifier.with_alert_sink(Arc::new(sink)),
            Err(e) => warn!(error = %e, "Webhook alerts disabled"),
        }
    }

    match EmailAlertSink::from_notify_config(&config.notify) {
        Some(Ok(sink)) => {
            info!(recipients = sink.recipient_count(), "Email alerts enabled");
            notifier = notifier.with_alert_sink(Arc::new(sink));
        }
        Some(Err(e)) => warn!(error = %e, "Email alerts disabled"),
        None => {}
    }

    let (metric_sinks, alert_sinks) = notifier.sink_count();
    info!(metric_sinks, alert_sinks, "Notifier ready");
    notifier
}

/// Window policy selected by `SCHEDULER_WINDOW`.
pub fn window_policy(config: &Config) -> Result<WindowPolicy, Fault> {
    let mode = config.scheduler.window_mode()?;
    Ok(WindowPolicy::from_mode(mode, config.scheduler.interval_secs))
}

/// Build the job runner. Any failure is reported as a configuration fault.
pub async fn runner(config: &Config, notifier: Arc<IngestionNotifier>) -> Result<JobRunner, Fault> {
    config.validate()?;
    let window = window_policy(config)?;

    let ledger = skytrack_ledger::open(&config.ledger, &config.postgres)
        .await
        .map_err(|e| construction("run ledger", e))?;

    let source = OpenSkySource::new(&config.source)
        .map_err(|e| construction("data source", e))?
        .with_kind(config.source.data_kind()?);

    let store = ParquetArtifactStore::from_config(config).map_err(|e| construction("artifact store", e))?;

    info!(
        ledger = ledger.backend_name(),
        storage = store.backend().kind(),
        auth = source.credentials().label(),
        data_type = %source.kind(),
        "Collaborators ready"
    );

    Ok(JobRunner::new(ledger, Arc::new(source), Arc::new(store), notifier).with_window_policy(window))
}

fn construction(what: &str, error: impl std::fmt::Display) -> Fault {
    Fault::Config(ConfigError::Other(format!("failed to initialize {what}: {error}")))
}
