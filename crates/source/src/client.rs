use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use tracing::{debug, info, warn};

use skytrack_core::config::{BoundingBox, SourceConfig};
use skytrack_core::{DataKind, DataSource, FetchError, Snapshot, Window};

use crate::auth::{Credentials, TokenCache};
use crate::decode::{decode_flights, decode_states};

/// OpenSky sends its own header alongside (or instead of) `Retry-After`.
const OPENSKY_RETRY_HEADER: &str = "x-rate-limit-retry-after-seconds";

/// Assumed back-off when a 429 carries no usable retry hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Longest interval `/flights/all` answers in one request.
pub const MAX_FLIGHTS_SPAN_SECS: i64 = 2 * 60 * 60;

pub struct OpenSkySource {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    tokens: TokenCache,
    bbox: BoundingBox,
    timeout_secs: u64,
    kind: DataKind,
}

impl OpenSkySource {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("skytrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Connection(format!("failed to build HTTP client: {e}")))?;

        let credentials = Credentials::from_config(config);
        info!(
            base_url = %config.base_url,
            auth = credentials.label(),
            timeout_secs = config.timeout_secs,
            "OpenSky source initialized"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            tokens: TokenCache::new(),
            bbox: config.bbox,
            timeout_secs: config.timeout_secs,
            kind: DataKind::States,
        })
    }

    /// Fetch `kind` instead of state vectors.
    pub fn with_kind(mut self, kind: DataKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn states_url(&self) -> String {
        format!("{}/states/all", self.base_url)
    }

    pub fn flights_url(&self) -> String {
        format!("{}/flights/all", self.base_url)
    }

    fn states_query(&self, window: &Window) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("lamin", self.bbox.lamin.to_string()),
            ("lomin", self.bbox.lomin.to_string()),
            ("lamax", self.bbox.lamax.to_string()),
            ("lomax", self.bbox.lomax.to_string()),
        ];
        // Historical lookups need an account; anonymous callers only get "now".
        if window.start() < window.end() && !matches!(self.credentials, Credentials::Anonymous) {
            params.push(("time", window.end().timestamp().to_string()));
        }
        params
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::OAuth {
                auth_url,
                client_id,
                client_secret,
            } => match self
                .tokens
                .bearer(&self.client, auth_url, client_id, client_secret)
                .await
            {
                Some(token) => request.bearer_auth(token),
                None => request,
            },
            Credentials::Basic { username, password } => request.basic_auth(username, Some(password)),
            Credentials::Anonymous => request,
        }
    }

    fn map_transport(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if error.is_connect() {
            FetchError::Connection(error.to_string())
        } else if error.is_decode() {
            FetchError::Decode(error.to_string())
        } else {
            FetchError::Connection(error.to_string())
        }
    }

    async fn fetch_states(&self, window: &Window) -> Result<Snapshot, FetchError> {
        let url = self.states_url();
        debug!(%url, auth = self.credentials.label(), "Requesting state vectors");

        let body = self.get(&url, &self.states_query(window)).await?;
        let snapshot = decode_states(&body)?;
        debug!(records = snapshot.len(), capture_time = %snapshot.capture_time, "Decoded state vectors");
        Ok(snapshot)
    }

    async fn fetch_flights(&self, window: &Window) -> Result<Snapshot, FetchError> {
        let url = self.flights_url();
        let (begin, end) = (window.start().timestamp(), window.end().timestamp());
        if end - begin > MAX_FLIGHTS_SPAN_SECS {
            warn!(begin, end, max_secs = MAX_FLIGHTS_SPAN_SECS, "Flights window exceeds the API limit");
        }
        debug!(%url, begin, end, auth = self.credentials.label(), "Requesting flights");

        let query = [("begin", begin.to_string()), ("end", end.to_string())];
        let body = self.get(&url, &query).await?;
        let snapshot = decode_flights(&body, window.end())?;
        debug!(records = snapshot.len(), "Decoded flights");
        Ok(snapshot)
    }

    /// Authorized GET returning the body of a 200 response.
    async fn get(&self, url: &str, query: &[(&'static str, String)]) -> Result<String, FetchError> {
        let request = self.client.get(url).query(query);
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = retry_after(response.headers());
            warn!(retry_after_secs, "OpenSky rate limit hit");
            return Err(FetchError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        let body = response.text().await.map_err(|e| self.map_transport(e))?;
        if status != StatusCode::OK {
            return Err(FetchError::Api {
                status_code: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl DataSource for OpenSkySource {
    async fn fetch(&self, window: &Window) -> Result<Snapshot, FetchError> {
        match self.kind {
            DataKind::States => self.fetch_states(window).await,
            DataKind::Flights => self.fetch_flights(window).await,
        }
    }

    fn source_name(&self) -> &str {
        "opensky"
    }
}

fn retry_after(headers: &HeaderMap) -> u64 {
    [RETRY_AFTER.as_str(), OPENSKY_RETRY_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn retry_after_prefers_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("42"));
        headers.insert(OPENSKY_RETRY_HEADER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), 42);
    }

    #[test]
    fn retry_after_reads_opensky_header() {
        let mut headers = HeaderMap::new();
        headers.insert(OPENSKY_RETRY_HEADER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), 7);
    }

    #[test]
    fn retry_after_defaults_when_unparseable() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), DEFAULT_RETRY_AFTER_SECS);
        assert_eq!(retry_after(&HeaderMap::new()), DEFAULT_RETRY_AFTER_SECS);
    }
}
