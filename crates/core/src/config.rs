use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::record::DataKind;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn profiled_env_f64(profile: &str, key: &str) -> Option<f64> {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub aws: AwsConfig,
    pub ledger: LedgerConfig,
    pub postgres: PostgresConfig,
    pub scheduler: SchedulerConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SKYTRACK_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SKYTRACK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            source: SourceConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            ledger: LedgerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "SCHEDULER_INTERVAL_SECONDS".into(),
                value: "0".into(),
                reason: "interval must be positive".into(),
            });
        }
        let window = self.scheduler.window_mode()?;
        if self.source.data_kind()? == DataKind::Flights && window == WindowMode::Snapshot {
            return Err(ConfigError::Invalid {
                key: "SCHEDULER_WINDOW".into(),
                value: self.scheduler.window.clone(),
                reason: "flights ingestion needs an \"aligned\" window".into(),
            });
        }
        self.ledger.backend_kind()?;
        if self.source.bbox.lamin > self.source.bbox.lamax || self.source.bbox.lomin > self.source.bbox.lomax {
            return Err(ConfigError::Invalid {
                key: "OPENSKY_BBOX".into(),
                value: format!("{:?}", self.source.bbox),
                reason: "min bound exceeds max bound".into(),
            });
        }
        if self.ledger.backend_kind()? == LedgerBackend::Postgres && !self.postgres.is_configured() {
            return Err(ConfigError::Missing("PG_USERNAME".into()));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  source:      url={}, auth={}, data_type={}", self.source.base_url, self.source.auth_label(), self.source.data_type);
        tracing::info!("  storage:     data_dir={}", self.storage.data_dir.display());
        tracing::info!("  aws:         region={}, bucket={}", self.aws.region, self.aws.s3_bucket.as_deref().unwrap_or("(none)"));
        tracing::info!("  ledger:      backend={}, path={}", self.ledger.backend, self.ledger.path.display());
        tracing::info!("  scheduler:   interval={}s, run_on_start={}, window={}", self.scheduler.interval_secs, self.scheduler.run_on_start, self.scheduler.window);
        tracing::info!("  notify:      env={}, webhook={}, email={}, cloudwatch={}", self.notify.environment, self.notify.webhook_url.is_some(), self.notify.smtp_host.is_some(), self.notify.cloudwatch_enabled);
    }

    /// Return a redacted view (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "source": {
                "base_url": self.source.base_url,
                "auth": self.source.auth_label(),
                "timeout_secs": self.source.timeout_secs,
                "data_type": self.source.data_type,
            },
            "storage": { "data_dir": self.storage.data_dir },
            "aws": {
                "region": self.aws.region,
                "s3_bucket": self.aws.s3_bucket,
                "configured": self.aws.is_configured(),
            },
            "ledger": { "backend": self.ledger.backend, "path": self.ledger.path },
            "postgres": {
                "host": self.postgres.host,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "scheduler": {
                "interval_secs": self.scheduler.interval_secs,
                "run_on_start": self.scheduler.run_on_start,
                "window": self.scheduler.window,
            },
            "notify": {
                "environment": self.notify.environment,
                "service_name": self.notify.service_name,
                "webhook": self.notify.webhook_url.is_some(),
                "email": self.notify.smtp_host.is_some(),
                "on_success": self.notify.notify_on_success,
                "cloudwatch": self.notify.cloudwatch_enabled,
                "cloudwatch_namespace": self.notify.cloudwatch_namespace,
            },
        })
    }
}

// ── Source (OpenSky) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

impl Default for BoundingBox {
    /// Greater Mumbai area.
    fn default() -> Self {
        Self {
            lamin: 18.0,
            lomin: 71.5,
            lamax: 20.0,
            lomax: 74.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub auth_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub bbox: BoundingBox,
    /// "states" or "flights"
    pub data_type: String,
}

impl SourceConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = BoundingBox::default();
        Self {
            base_url: profiled_env_or(p, "OPENSKY_BASE_URL", "https://opensky-network.org/api"),
            auth_url: profiled_env_or(
                p,
                "OPENSKY_AUTH_URL",
                "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token",
            ),
            client_id: profiled_env_opt(p, "OPENSKY_CLIENT_ID"),
            client_secret: profiled_env_opt(p, "OPENSKY_CLIENT_SECRET"),
            username: profiled_env_opt(p, "OPENSKY_USERNAME"),
            password: profiled_env_opt(p, "OPENSKY_PASSWORD"),
            timeout_secs: profiled_env_u64(p, "OPENSKY_TIMEOUT_SECONDS", 30),
            bbox: BoundingBox {
                lamin: profiled_env_f64(p, "OPENSKY_BBOX_LAMIN").unwrap_or(d.lamin),
                lomin: profiled_env_f64(p, "OPENSKY_BBOX_LOMIN").unwrap_or(d.lomin),
                lamax: profiled_env_f64(p, "OPENSKY_BBOX_LAMAX").unwrap_or(d.lamax),
                lomax: profiled_env_f64(p, "OPENSKY_BBOX_LOMAX").unwrap_or(d.lomax),
            },
            data_type: profiled_env_or(p, "INGEST_DATA_TYPE", "states").to_lowercase(),
        }
    }

    pub fn data_kind(&self) -> Result<DataKind, ConfigError> {
        self.data_type.parse().map_err(|_| ConfigError::Invalid {
            key: "INGEST_DATA_TYPE".into(),
            value: self.data_type.clone(),
            reason: "expected \"states\" or \"flights\"".into(),
        })
    }

    pub fn has_oauth(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    pub fn has_basic_auth(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn auth_label(&self) -> &'static str {
        if self.has_oauth() {
            "oauth2"
        } else if self.has_basic_auth() {
            "basic"
        } else {
            "anonymous"
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for local artifacts when S3 is not configured.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }
}

// ── AWS / S3 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "ap-south-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            s3_bucket: profiled_env_opt(p, "S3_BUCKET"),
            s3_prefix: profiled_env_or(p, "S3_PREFIX", "raw"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_key_id.is_some() && self.s3_bucket.is_some()
    }
}

// ── Run ledger ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    File,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// "file" or "postgres"
    pub backend: String,
    pub path: PathBuf,
}

impl LedgerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "LEDGER_BACKEND", "file").to_lowercase(),
            path: PathBuf::from(profiled_env_or(p, "LEDGER_PATH", "data/ingestion-runs.json")),
        }
    }

    pub fn backend_kind(&self) -> Result<LedgerBackend, ConfigError> {
        match self.backend.as_str() {
            "file" => Ok(LedgerBackend::File),
            "postgres" => Ok(LedgerBackend::Postgres),
            other => Err(ConfigError::Invalid {
                key: "LEDGER_BACKEND".into(),
                value: other.into(),
                reason: "expected \"file\" or \"postgres\"".into(),
            }),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "skytrack"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 5),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// How each run picks its time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// start = end = now
    Snapshot,
    /// end rounded down to the interval, start = end - span
    Aligned { span_secs: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub run_on_start: bool,
    /// "snapshot" or "aligned"
    pub window: String,
    pub fetch_window_secs: u64,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let interval_secs = profiled_env_u64(p, "SCHEDULER_INTERVAL_SECONDS", 60);
        let flights = profiled_env_opt(p, "INGEST_DATA_TYPE")
            .is_some_and(|v| v.eq_ignore_ascii_case("flights"));
        let default_window = if flights { "aligned" } else { "snapshot" };
        Self {
            interval_secs,
            run_on_start: profiled_env_bool(p, "SCHEDULER_RUN_ON_START", true),
            window: profiled_env_or(p, "SCHEDULER_WINDOW", default_window).to_lowercase(),
            fetch_window_secs: profiled_env_u64(p, "SCHEDULER_FETCH_WINDOW_SECONDS", interval_secs),
        }
    }

    pub fn window_mode(&self) -> Result<WindowMode, ConfigError> {
        match self.window.as_str() {
            "snapshot" => Ok(WindowMode::Snapshot),
            "aligned" => Ok(WindowMode::Aligned {
                span_secs: self.fetch_window_secs,
            }),
            other => Err(ConfigError::Invalid {
                key: "SCHEDULER_WINDOW".into(),
                value: other.into(),
                reason: "expected \"snapshot\" or \"aligned\"".into(),
            }),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub environment: String,
    pub service_name: String,
    pub notify_on_success: bool,
    pub notify_on_recovery: bool,
    pub metrics_enabled: bool,
    pub webhook_url: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_tls: bool,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub cloudwatch_enabled: bool,
    pub cloudwatch_namespace: String,
    /// Falls back to `AWS_REGION` when unset.
    pub cloudwatch_region: Option<String>,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            environment: profiled_env_or(p, "NOTIFY_ENVIRONMENT", "development"),
            service_name: profiled_env_or(p, "NOTIFY_SERVICE_NAME", "ingestion-service"),
            notify_on_success: profiled_env_bool(p, "NOTIFY_ON_SUCCESS", false),
            notify_on_recovery: profiled_env_bool(p, "NOTIFY_ON_RECOVERY", false),
            metrics_enabled: profiled_env_bool(p, "NOTIFY_METRICS", true),
            webhook_url: profiled_env_opt(p, "NOTIFY_WEBHOOK_URL"),
            smtp_host: profiled_env_opt(p, "NOTIFY_SMTP_HOST"),
            smtp_port: profiled_env_u16(p, "NOTIFY_SMTP_PORT", 587),
            smtp_tls: profiled_env_bool(p, "NOTIFY_SMTP_TLS", true),
            smtp_from: profiled_env_opt(p, "NOTIFY_SMTP_FROM"),
            smtp_to: profiled_env_opt(p, "NOTIFY_SMTP_TO")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            cloudwatch_enabled: profiled_env_bool(p, "NOTIFY_CLOUDWATCH", false),
            cloudwatch_namespace: profiled_env_or(p, "NOTIFY_CLOUDWATCH_NAMESPACE", "Skytrack/Ingestion"),
            cloudwatch_region: profiled_env_opt(p, "NOTIFY_CLOUDWATCH_REGION"),
        }
    }

    pub fn email_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from.is_some() && !self.smtp_to.is_empty()
    }
}
