use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use skytrack_core::config::SourceConfig;

/// Tokens are refreshed this long before the issuer says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Used when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// How requests to the upstream API are authenticated.
#[derive(Clone)]
pub enum Credentials {
    /// OAuth2 client-credentials grant against `auth_url`.
    OAuth {
        auth_url: String,
        client_id: String,
        client_secret: String,
    },
    Basic {
        username: String,
        password: String,
    },
    Anonymous,
}

impl Credentials {
    /// OAuth wins over basic auth when both are configured.
    pub fn from_config(config: &SourceConfig) -> Self {
        if let (Some(id), Some(secret)) = (&config.client_id, &config.client_secret) {
            return Credentials::OAuth {
                auth_url: config.auth_url.clone(),
                client_id: id.clone(),
                client_secret: secret.clone(),
            };
        }
        match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Credentials::Basic {
                username: user.clone(),
                password: pass.clone(),
            },
            _ => Credentials::Anonymous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Credentials::OAuth { .. } => "oauth2",
            Credentials::Basic { .. } => "basic",
            Credentials::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::OAuth { auth_url, client_id, .. } => f
                .debug_struct("OAuth")
                .field("auth_url", auth_url)
                .field("client_id", client_id)
                .field("client_secret", &"***")
                .finish(),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Lazily fetched, cached OAuth2 bearer token.
///
/// A failed token request is not fatal: the caller proceeds without a
/// token for that request and the next call tries again.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a valid token, requesting a new one if none is cached or the
    /// cached one is about to expire.
    pub async fn bearer(
        &self,
        client: &reqwest::Client,
        auth_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Option<String> {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Some(token.value.clone());
            }
        }

        match request_token(client, auth_url, client_id, client_secret).await {
            Ok(token) => {
                let value = token.value.clone();
                *slot = Some(token);
                Some(value)
            }
            Err(reason) => {
                warn!(%reason, "OAuth2 token request failed, continuing unauthenticated");
                *slot = None;
                None
            }
        }
    }

    /// Drop the cached token, e.g. after the API rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

async fn request_token(
    client: &reqwest::Client,
    auth_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<CachedToken, String> {
    let response = client
        .post(auth_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("token endpoint returned {status}: {body}"));
    }

    let parsed: TokenResponse = response.json().await.map_err(|e| e.to_string())?;
    let value = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "token response missing access_token".to_string())?;
    let ttl = parsed
        .expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_TTL);

    info!(ttl_secs = ttl.as_secs(), "Obtained OAuth2 access token");
    Ok(CachedToken {
        value,
        expires_at: Instant::now() + ttl,
    })
}
