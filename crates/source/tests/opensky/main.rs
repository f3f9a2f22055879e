use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::json;

use skytrack_core::config::{BoundingBox, SourceConfig};
use skytrack_core::{DataKind, DataSource, FetchError, Window};
use skytrack_source::OpenSkySource;

#[derive(Default)]
struct Seen {
    queries: Mutex<Vec<HashMap<String, String>>>,
    auth_headers: Mutex<Vec<Option<String>>>,
    token_requests: AtomicUsize,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(base: &str) -> SourceConfig {
    SourceConfig {
        base_url: format!("{base}/api"),
        auth_url: format!("{base}/token"),
        client_id: None,
        client_secret: None,
        username: None,
        password: None,
        timeout_secs: 5,
        bbox: BoundingBox::default(),
        data_type: "states".into(),
    }
}

fn now() -> Window {
    Window::instant(Utc::now())
}

fn body() -> serde_json::Value {
    json!({
        "time": 1_700_000_000,
        "states": [
            ["800c5a", "AIC101  ", "India", 1699999995, 1699999999, 72.87, 19.09, 1524.0,
             false, 120.5, 270.0, -3.2, null, 1600.2, "1234", false, 0],
            ["8013f2", "IGO22", "India", 1699999995, 1699999999, 72.80, 19.00, 900.0,
             false, 90.0, 90.0, 1.0, null, 950.0, null, false, 0]
        ]
    })
}

async fn states(
    State(seen): State<Arc<Seen>>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    seen.queries.lock().unwrap().push(q);
    seen.auth_headers.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    Json(body())
}

async fn token(State(seen): State<Arc<Seen>>, Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
    seen.token_requests.fetch_add(1, Ordering::SeqCst);
    if form.get("grant_type").map(String::as_str) != Some("client_credentials")
        || form.get("client_secret").map(String::as_str) != Some("s3cret")
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" })));
    }
    (StatusCode::OK, Json(json!({ "access_token": "tok-1", "expires_in": 1800 })))
}

fn opensky(seen: Arc<Seen>) -> Router {
    Router::new()
        .route("/api/states/all", get(states))
        .route("/token", post(token))
        .with_state(seen)
}

#[tokio::test]
async fn fetch_sends_bounding_box_and_decodes_states() {
    let seen = Arc::new(Seen::default());
    let base = serve(opensky(seen.clone())).await;
    let source = OpenSkySource::new(&config(&base)).unwrap();

    let snapshot = source.fetch(&now()).await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.states()[0].callsign.as_deref(), Some("AIC101"));
    assert_eq!(snapshot.capture_time.timestamp(), 1_700_000_000);

    let queries = seen.queries.lock().unwrap();
    assert_eq!(queries[0]["lamin"], "18");
    assert_eq!(queries[0]["lomin"], "71.5");
    assert_eq!(queries[0]["lamax"], "20");
    assert_eq!(queries[0]["lomax"], "74");
    assert!(!queries[0].contains_key("time"));
    assert_eq!(seen.auth_headers.lock().unwrap()[0], None);
}

#[tokio::test]
async fn oauth_token_is_fetched_once_and_reused() {
    let seen = Arc::new(Seen::default());
    let base = serve(opensky(seen.clone())).await;
    let mut cfg = config(&base);
    cfg.client_id = Some("skytrack".into());
    cfg.client_secret = Some("s3cret".into());
    let source = OpenSkySource::new(&cfg).unwrap();

    source.fetch(&now()).await.unwrap();
    source.fetch(&now()).await.unwrap();

    assert_eq!(seen.token_requests.load(Ordering::SeqCst), 1);
    let headers = seen.auth_headers.lock().unwrap();
    assert_eq!(headers.len(), 2);
    assert!(headers.iter().all(|h| h.as_deref() == Some("Bearer tok-1")));
}

#[tokio::test]
async fn rejected_token_request_falls_back_to_anonymous() {
    let seen = Arc::new(Seen::default());
    let base = serve(opensky(seen.clone())).await;
    let mut cfg = config(&base);
    cfg.client_id = Some("skytrack".into());
    cfg.client_secret = Some("wrong".into());
    let source = OpenSkySource::new(&cfg).unwrap();

    let snapshot = source.fetch(&now()).await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(seen.auth_headers.lock().unwrap()[0], None);
}

#[tokio::test]
async fn basic_auth_and_historical_time_are_sent() {
    let seen = Arc::new(Seen::default());
    let base = serve(opensky(seen.clone())).await;
    let mut cfg = config(&base);
    cfg.username = Some("pilot".into());
    cfg.password = Some("pw".into());
    let source = OpenSkySource::new(&cfg).unwrap();

    let end = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let window = Window::new(end - chrono::Duration::minutes(5), end).unwrap();
    source.fetch(&window).await.unwrap();

    let auth = seen.auth_headers.lock().unwrap()[0].clone().unwrap();
    assert!(auth.starts_with("Basic "), "{auth}");
    assert_eq!(seen.queries.lock().unwrap()[0]["time"], end.timestamp().to_string());
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let router = Router::new().route(
        "/api/states/all",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "42")], "slow down") }),
    );
    let base = serve(router).await;
    let source = OpenSkySource::new(&config(&base)).unwrap();

    let err = source.fetch(&now()).await.unwrap_err();
    assert_eq!(err, FetchError::RateLimited { retry_after_secs: 42 });
}

#[tokio::test]
async fn non_200_is_an_api_error_with_body() {
    let router = Router::new().route(
        "/api/states/all",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance window") }),
    );
    let base = serve(router).await;
    let source = OpenSkySource::new(&config(&base)).unwrap();

    let err = source.fetch(&now()).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::Api {
            status_code: 503,
            body: "maintenance window".into()
        }
    );
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let router = Router::new().route(
        "/api/states/all",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(body())
        }),
    );
    let base = serve(router).await;
    let mut cfg = config(&base);
    cfg.timeout_secs = 1;
    let source = OpenSkySource::new(&cfg).unwrap();

    let err = source.fetch(&now()).await.unwrap_err();
    assert_eq!(err, FetchError::Timeout { timeout_secs: 1 });
}

#[tokio::test]
async fn refused_connection_is_a_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = OpenSkySource::new(&config(&format!("http://{addr}"))).unwrap();

    let err = source.fetch(&now()).await.unwrap_err();
    assert!(matches!(err, FetchError::Connection(_)), "{err:?}");
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let router = Router::new().route("/api/states/all", get(|| async { "<html>oops</html>" }));
    let base = serve(router).await;
    let source = OpenSkySource::new(&config(&base)).unwrap();

    let err = source.fetch(&now()).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)), "{err:?}");
}

async fn flights(
    State(seen): State<Arc<Seen>>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    seen.queries.lock().unwrap().push(q);
    Json(json!([
        {"icao24": "800c5a", "firstSeen": 1_767_265_200, "estDepartureAirport": "VABB",
         "lastSeen": 1_767_268_800, "estArrivalAirport": "VIDP", "callsign": "AIC101  ",
         "estDepartureAirportHorizDistance": 1200, "estDepartureAirportVertDistance": 30,
         "estArrivalAirportHorizDistance": 900, "estArrivalAirportVertDistance": 25,
         "departureAirportCandidatesCount": 1, "arrivalAirportCandidatesCount": 2}
    ]))
}

#[tokio::test]
async fn flights_fetch_sends_window_bounds() {
    let seen = Arc::new(Seen::default());
    let router = Router::new()
        .route("/api/flights/all", get(flights))
        .with_state(seen.clone());
    let base = serve(router).await;
    let source = OpenSkySource::new(&config(&base)).unwrap().with_kind(DataKind::Flights);

    let end = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let window = Window::new(end - chrono::Duration::hours(1), end).unwrap();
    let snapshot = source.fetch(&window).await.unwrap();

    assert_eq!(snapshot.kind(), DataKind::Flights);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.capture_time, end);
    assert_eq!(snapshot.flight_records()[0].callsign.as_deref(), Some("AIC101"));

    let queries = seen.queries.lock().unwrap();
    assert_eq!(queries[0]["begin"], (end.timestamp() - 3600).to_string());
    assert_eq!(queries[0]["end"], end.timestamp().to_string());
    assert!(!queries[0].contains_key("lamin"));
}

#[tokio::test]
async fn flights_not_found_is_an_api_error() {
    let router = Router::new().route(
        "/api/flights/all",
        get(|| async { (StatusCode::NOT_FOUND, "[]") }),
    );
    let base = serve(router).await;
    let source = OpenSkySource::new(&config(&base)).unwrap().with_kind(DataKind::Flights);

    let end = Utc::now();
    let window = Window::new(end - chrono::Duration::minutes(10), end).unwrap();
    let err = source.fetch(&window).await.unwrap_err();
    assert_eq!(err, FetchError::Api { status_code: 404, body: "[]".into() });
}
