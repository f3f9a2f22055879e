//! Amazon CloudWatch metric sink.
//!
//! Recording a metric only queues a [`MetricPoint`]; a background task sends
//! queued points with `PutMetricData` in batches of at most [`MAX_BATCH`].
//! Publish failures are logged and the points dropped, so a CloudWatch
//! outage never reaches the ingestion path.

use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_cloudwatch::config::{Credentials, Region};
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use skytrack_core::config::{AwsConfig, NotifyConfig};

use crate::traits::{Dimensions, MetricSink, NotifyError};

/// Data points per `PutMetricData` request.
pub const MAX_BATCH: usize = 20;

/// One queued data point.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub dimensions: Dimensions,
    pub timestamp: DateTime<Utc>,
}

/// Sends a batch of points to a metrics backend.
#[async_trait::async_trait]
pub trait MetricPublisher: Send + Sync {
    async fn publish(&self, namespace: &str, points: &[MetricPoint]) -> Result<(), NotifyError>;
}

// ── AWS publisher ────────────────────────────────────────────────────

/// [`MetricPublisher`] backed by the CloudWatch API.
pub struct CloudWatchPublisher {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchPublisher {
    /// Build a client for `region`. Static keys from `aws` take precedence
    /// over the default credential chain.
    pub async fn connect(region: &str, aws: &AwsConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_cloudwatch::config::Builder::from(&shared);
        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "skytrack-static",
            ));
        }

        Self {
            client: aws_sdk_cloudwatch::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait::async_trait]
impl MetricPublisher for CloudWatchPublisher {
    async fn publish(&self, namespace: &str, points: &[MetricPoint]) -> Result<(), NotifyError> {
        let data = points.iter().map(to_datum).collect::<Result<Vec<_>, _>>()?;
        self.client
            .put_metric_data()
            .namespace(namespace)
            .set_metric_data(Some(data))
            .send()
            .await
            .map_err(|e| NotifyError::Metrics(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

/// Convert a queued point into the SDK's datum type.
pub fn to_datum(point: &MetricPoint) -> Result<MetricDatum, NotifyError> {
    let dimensions = point
        .dimensions
        .iter()
        .map(|(name, value)| {
            Dimension::builder().name(name).value(value).build()
        })
        .collect::<Vec<_>>();

    Ok(MetricDatum::builder()
        .metric_name(&point.name)
        .value(point.value)
        .unit(StandardUnit::from(point.unit.as_str()))
        .timestamp(AwsDateTime::from_millis(point.timestamp.timestamp_millis()))
        .set_dimensions(Some(dimensions))
        .build())
}

// ── Sink ─────────────────────────────────────────────────────────────

enum Command {
    Put(MetricPoint),
    Flush(oneshot::Sender<()>),
}

/// Queues metrics for a background CloudWatch publisher.
///
/// Must be created inside a tokio runtime. The publisher task ends when the
/// sink is dropped.
pub struct CloudWatchMetricSink {
    namespace: String,
    tx: mpsc::UnboundedSender<Command>,
}

impl CloudWatchMetricSink {
    pub fn new(namespace: impl Into<String>, publisher: Arc<dyn MetricPublisher>) -> Self {
        let namespace = namespace.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(publish_loop(namespace.clone(), publisher, rx));
        Self { namespace, tx }
    }

    /// Sink configured from `NOTIFY_CLOUDWATCH_*`, falling back to the AWS region.
    pub async fn connect(notify: &NotifyConfig, aws: &AwsConfig) -> Self {
        let region = notify.cloudwatch_region.as_deref().unwrap_or(&aws.region);
        let publisher = CloudWatchPublisher::connect(region, aws).await;
        info!(namespace = %notify.cloudwatch_namespace, region, "CloudWatch metrics enabled");
        Self::new(notify.cloudwatch_namespace.clone(), Arc::new(publisher))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn record(&self, name: &str, value: f64, unit: &str, dimensions: &Dimensions) {
        let point = MetricPoint {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            dimensions: dimensions.clone(),
            timestamp: Utc::now(),
        };
        if self.tx.send(Command::Put(point)).is_err() {
            warn!(metric = name, "CloudWatch publisher has stopped, dropping data point");
        }
    }
}

#[async_trait::async_trait]
impl MetricSink for CloudWatchMetricSink {
    fn increment(&self, name: &str, value: f64, dimensions: &Dimensions) {
        self.record(name, value, "Count", dimensions);
    }

    fn observe(&self, name: &str, value: f64, unit: &str, dimensions: &Dimensions) {
        self.record(name, value, unit, dimensions);
    }

    fn sink_name(&self) -> &str {
        "cloudwatch"
    }

    async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn publish_loop(
    namespace: String,
    publisher: Arc<dyn MetricPublisher>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(first) = rx.recv().await {
        let mut points = Vec::new();
        let mut acks = Vec::new();
        let mut next = Some(first);
        while let Some(command) = next.take() {
            match command {
                Command::Put(point) => points.push(point),
                Command::Flush(ack) => acks.push(ack),
            }
            next = rx.try_recv().ok();
        }

        for batch in points.chunks(MAX_BATCH) {
            match publisher.publish(&namespace, batch).await {
                Ok(()) => debug!(%namespace, points = batch.len(), "Published metrics"),
                Err(e) => warn!(%namespace, points = batch.len(), error = %e, "CloudWatch publish failed"),
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
}
