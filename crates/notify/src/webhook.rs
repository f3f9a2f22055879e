//! Slack-compatible webhook alert sink.
//!
//! Posts alerts as Block Kit JSON (header, field section, message body,
//! timestamp context). Any endpoint accepting the Slack incoming-webhook
//! format works.

use std::time::Duration;

use serde_json::{json, Value};

use crate::traits::{Alert, AlertKind, AlertSink, NotifyError};

/// Delivers alerts as JSON over HTTP POST.
///
/// Environment variable references (`${VAR_NAME}`) in the URL are resolved
/// at construction time.
#[derive(Debug)]
pub struct WebhookAlertSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlertSink {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let url = resolve_env_vars(url)?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config(format!("webhook url must be http(s): {url}")));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { url, client })
    }

    /// Build the Block Kit payload for an alert.
    pub fn payload(alert: &Alert) -> Value {
        let icon = match alert.kind {
            AlertKind::Failure => "\u{1f6a8}",
            AlertKind::Success => "\u{2705}",
            AlertKind::Recovery => "\u{1f49a}",
        };

        let fields: Vec<Value> = alert
            .fields
            .iter()
            .map(|(k, v)| json!({ "type": "mrkdwn", "text": format!("*{}:*\n{}", k, v) }))
            .collect();

        let mut blocks = vec![json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("{icon} {}", alert.subject), "emoji": true }
        })];
        if !fields.is_empty() {
            blocks.push(json!({ "type": "section", "fields": fields }));
        }
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("```{}```", alert.body) }
        }));

        json!({ "text": alert.subject, "blocks": blocks })
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(alert))
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            return Err(NotifyError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(%status, body = %body_text, "webhook returned non-2xx status");
            return Err(NotifyError::Config(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(status = %status, kind = alert.kind.as_str(), "webhook alert delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                NotifyError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
