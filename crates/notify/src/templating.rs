//! Minijinja rendering for alert subjects and bodies.
//!
//! Each alert kind has a subject and a body template. Defaults mirror the
//! plain-text alerts operators already receive; both can be overridden.
//! A fresh [`minijinja::Environment`] is built per render call.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::traits::{Alert, AlertKind, NotifyError};

pub const FAILURE_SUBJECT: &str = "[{{ environment | upper }}] Ingestion Failed: {{ category }}";

pub const FAILURE_BODY: &str = "\
Ingestion job failed

Environment: {{ environment }}
Service: {{ service }}
Timestamp: {{ timestamp }}
Error Category: {{ category }}
Record ID: {% if run_id is none %}N/A{% else %}{{ run_id }}{% endif %}
Duration: {{ duration_secs | round(1) }}s

Error Message:
{{ message }}
{%- for key, value in fields | items %}
{{ key }}: {{ value }}
{%- endfor %}";

pub const SUCCESS_SUBJECT: &str = "[{{ environment | upper }}] Ingestion Succeeded";

pub const SUCCESS_BODY: &str = "\
Ingestion job completed

Environment: {{ environment }}
Service: {{ service }}
Timestamp: {{ timestamp }}
Record ID: {% if run_id is none %}N/A{% else %}{{ run_id }}{% endif %}
Records: {{ record_count }}
Location: {{ artifact_location or \"N/A\" }}
Duration: {{ duration_secs | round(1) }}s";

pub const RECOVERY_SUBJECT: &str = "[{{ environment | upper }}] Ingestion Recovered";

pub const RECOVERY_BODY: &str = "\
Ingestion service has recovered and is running normally.

Environment: {{ environment }}
Service: {{ service }}
Timestamp: {{ timestamp }}
Records: {{ record_count }}";

/// Values available to alert templates.
#[derive(Debug, Clone, Serialize)]
pub struct AlertContext {
    pub kind: AlertKind,
    pub environment: String,
    pub service: String,
    /// `YYYY-MM-DD HH:MM:SS UTC`
    pub timestamp: String,
    pub run_id: Option<u64>,
    pub category: Option<String>,
    pub message: Option<String>,
    pub record_count: u64,
    pub artifact_location: Option<String>,
    pub duration_secs: f64,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct TemplatePair {
    subject: String,
    body: String,
}

/// Renders [`Alert`]s from an [`AlertContext`].
#[derive(Debug, Clone)]
pub struct AlertRenderer {
    failure: TemplatePair,
    success: TemplatePair,
    recovery: TemplatePair,
}

impl AlertRenderer {
    pub fn new() -> Self {
        Self {
            failure: TemplatePair {
                subject: FAILURE_SUBJECT.into(),
                body: FAILURE_BODY.into(),
            },
            success: TemplatePair {
                subject: SUCCESS_SUBJECT.into(),
                body: SUCCESS_BODY.into(),
            },
            recovery: TemplatePair {
                subject: RECOVERY_SUBJECT.into(),
                body: RECOVERY_BODY.into(),
            },
        }
    }

    /// Replace the templates for one alert kind. Syntax is checked up front.
    pub fn with_templates(
        mut self,
        kind: AlertKind,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let pair = TemplatePair {
            subject: subject.into(),
            body: body.into(),
        };
        Self::validate(&pair.subject)?;
        Self::validate(&pair.body)?;
        match kind {
            AlertKind::Failure => self.failure = pair,
            AlertKind::Success => self.success = pair,
            AlertKind::Recovery => self.recovery = pair,
        }
        Ok(self)
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("upper", upper_filter);
        env
    }

    /// Render a template string with the given context.
    pub fn render_str(template_str: &str, ctx: &AlertContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template parses without evaluating it.
    pub fn validate(template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    pub fn render(&self, ctx: &AlertContext) -> Result<Alert, NotifyError> {
        let pair = match ctx.kind {
            AlertKind::Failure => &self.failure,
            AlertKind::Success => &self.success,
            AlertKind::Recovery => &self.recovery,
        };

        let mut fields = BTreeMap::new();
        fields.insert("environment".to_string(), ctx.environment.clone());
        fields.insert("service".to_string(), ctx.service.clone());
        fields.insert(
            "run_id".to_string(),
            ctx.run_id.map(|id| id.to_string()).unwrap_or_else(|| "N/A".into()),
        );
        if let Some(category) = &ctx.category {
            fields.insert("category".to_string(), category.clone());
        }
        if ctx.kind != AlertKind::Failure {
            fields.insert("record_count".to_string(), ctx.record_count.to_string());
        }

        Ok(Alert {
            kind: ctx.kind,
            subject: Self::render_str(&pair.subject, ctx)?,
            body: Self::render_str(&pair.body, ctx)?,
            fields,
        })
    }
}

impl Default for AlertRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}
