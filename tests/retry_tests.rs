//! Client pipeline behavior against scripted servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Method;
use serde_json::{Value, json};
use tokenrelay::client::{ClientConfig, ClientError, RefreshError, Session, SessionEvent};
use tokio::net::TcpListener;
use url::Url;

const STALE: &str = "stale-token";
const FRESH: &str = "fresh-token";

#[derive(Clone, Default)]
struct Mock {
    refresh_calls: Arc<AtomicUsize>,
    refresh_fails: Arc<AtomicBool>,
    rejected_hits: Arc<AtomicUsize>,
    limited_hits: Arc<AtomicUsize>,
    flaky_hits: Arc<AtomicUsize>,
    mixed_hits: Arc<AtomicUsize>,
    logout_fails: Arc<AtomicBool>,
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn login() -> Json<Value> {
    Json(json!({ "access": STALE }))
}

async fn refresh(State(mock): State<Mock>) -> Response {
    mock.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    if mock.refresh_fails.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Not authenticated" })))
            .into_response();
    }
    Json(json!({ "access": FRESH })).into_response()
}

async fn logout(State(mock): State<Mock>) -> StatusCode {
    if mock.logout_fails.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

/// 200 only with the fresh token.
async fn data(headers: HeaderMap) -> Response {
    if bearer(&headers) == Some(FRESH) {
        Json(json!({ "ok": true })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid or expired token" })))
            .into_response()
    }
}

/// 401 no matter what.
async fn rejected(State(mock): State<Mock>) -> Response {
    mock.rejected_hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid or expired token" }))).into_response()
}

/// 429 no matter what.
async fn limited(State(mock): State<Mock>) -> Response {
    mock.limited_hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "0.1")],
        Json(json!({ "error": "Too many requests" })),
    )
        .into_response()
}

/// 429 on the first hit, 200 afterwards.
async fn flaky(State(mock): State<Mock>) -> Response {
    if mock.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "0.1")],
            Json(json!({ "error": "Too many requests" })),
        )
            .into_response();
    }
    Json(json!({ "ok": true })).into_response()
}

/// 401, then 429, then 401 again.
async fn mixed(State(mock): State<Mock>) -> Response {
    match mock.mixed_hits.fetch_add(1, Ordering::SeqCst) {
        1 => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "0.1")],
            Json(json!({ "error": "Too many requests" })),
        )
            .into_response(),
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid or expired token" })))
            .into_response(),
    }
}

async fn echo(headers: HeaderMap) -> Json<Value> {
    Json(json!({ "authorization": bearer(&headers) }))
}

async fn start_mock() -> (Mock, SocketAddr) {
    let mock = Mock::default();
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/api/data", get(data).post(data))
        .route("/api/rejected", get(rejected))
        .route("/api/limited", get(limited).post(limited))
        .route("/api/flaky", get(flaky))
        .route("/api/mixed", get(mixed))
        .route("/api/echo", get(echo))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, addr)
}

async fn logged_in_session(addr: SocketAddr) -> Session {
    let base_url = Url::parse(&format!("http://{}", addr)).unwrap();
    let session = Session::new(ClientConfig::new(base_url)).unwrap();
    session.login("alice@example.com", "irrelevant").await.unwrap();
    assert_eq!(session.access_token().unwrap().as_str(), STALE);
    session
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let (mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.get_json::<Value>("/api/data").await })
        })
        .collect();

    for handle in handles {
        let body = handle.await.unwrap().unwrap();
        assert_eq!(body["ok"], true);
    }

    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.access_token().unwrap().as_str(), FRESH);
}

#[tokio::test]
async fn test_json_body_is_resubmitted_after_refresh() {
    let (mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let body: Value = session
        .send_json(Method::POST, "/api/data", &json!({ "title": "hello" }))
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_401_is_not_retried() {
    let (mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;
    let mut events = session.subscribe();

    let result = session.get_json::<Value>("/api/rejected").await;

    assert!(matches!(result, Err(ClientError::SessionExpired)));
    assert_eq!(mock.rejected_hits.load(Ordering::SeqCst), 2);
    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(session.access_token().is_none());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
}

#[tokio::test]
async fn test_failed_refresh_expires_session() {
    let (mock, addr) = start_mock().await;
    mock.refresh_fails.store(true, Ordering::SeqCst);
    let session = logged_in_session(addr).await;
    let mut events = session.subscribe();

    let result = session.get_json::<Value>("/api/data").await;

    assert!(matches!(result, Err(ClientError::SessionExpired)));
    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(session.access_token().is_none());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
}

#[tokio::test]
async fn test_refresh_endpoint_401_does_not_recurse() {
    let (mock, addr) = start_mock().await;
    mock.refresh_fails.store(true, Ordering::SeqCst);
    let session = logged_in_session(addr).await;

    // Through the pipeline.
    let request = session.request(Method::POST, "/auth/refresh").unwrap();
    let result = session.send(request).await;
    assert!(matches!(result, Err(ClientError::SessionExpired)));
    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 1);

    // Directly.
    let result = session.ensure_fresh_access_token().await;
    assert!(matches!(
        result,
        Err(RefreshError::Rejected(status)) if status == StatusCode::UNAUTHORIZED
    ));
    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_429_retried_once_after_backoff() {
    let (mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let started = Instant::now();
    let body: Value = session.get_json("/api/flaky").await.unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(mock.flaky_hits.load(Ordering::SeqCst), 2);
    // Retry-After 0.1 is raised to the 500 ms floor.
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_second_429_is_not_retried() {
    let (mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let result = session.get_json::<Value>("/api/limited").await;

    assert!(matches!(result, Err(ClientError::RateLimited)));
    assert_eq!(mock.limited_hits.load(Ordering::SeqCst), 2);
    // Rate limiting leaves the session alone.
    assert!(session.access_token().is_some());
}

#[tokio::test]
async fn test_401_after_rate_limited_resubmit_is_terminal() {
    let (mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let result = session.get_json::<Value>("/api/mixed").await;

    assert!(matches!(result, Err(ClientError::SessionExpired)));
    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.mixed_hits.load(Ordering::SeqCst), 3);
    assert!(session.access_token().is_none());
}

fn streaming_body() -> reqwest::Body {
    reqwest::Body::wrap_stream(futures::stream::once(async {
        Ok::<_, std::io::Error>(b"payload".to_vec())
    }))
}

#[tokio::test]
async fn test_streaming_body_is_not_resubmitted() {
    let (mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let request = session
        .request(Method::POST, "/api/data")
        .unwrap()
        .body(streaming_body());
    let result = session.send(request).await;
    assert!(matches!(result, Err(ClientError::SessionExpired)));
    assert_eq!(mock.refresh_calls.load(Ordering::SeqCst), 0);

    session.login("alice@example.com", "irrelevant").await.unwrap();
    let request = session
        .request(Method::POST, "/api/limited")
        .unwrap()
        .body(streaming_body());
    let result = session.send(request).await;
    assert!(matches!(result, Err(ClientError::RateLimited)));
    assert_eq!(mock.limited_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_logout_clears_token_when_server_errors() {
    let (mock, addr) = start_mock().await;
    mock.logout_fails.store(true, Ordering::SeqCst);
    let session = logged_in_session(addr).await;
    let mut events = session.subscribe();

    session.logout().await;

    assert!(session.access_token().is_none());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
}

#[tokio::test]
async fn test_logout_completes_when_server_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base_url = Url::parse(&format!("http://{}", addr)).unwrap();
    let session = Session::new(ClientConfig::new(base_url)).unwrap();
    let mut events = session.subscribe();

    session.logout().await;

    assert!(session.access_token().is_none());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
}

#[tokio::test]
async fn test_logout_stops_sending_token() {
    let (_mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let body: Value = session.get_json("/api/echo").await.unwrap();
    assert_eq!(body["authorization"], STALE);

    session.logout().await;
    assert!(session.access_token().is_none());

    let body: Value = session.get_json("/api/echo").await.unwrap();
    assert!(body["authorization"].is_null());
}

#[tokio::test]
async fn test_explicit_authorization_header_is_kept() {
    let (_mock, addr) = start_mock().await;
    let session = logged_in_session(addr).await;

    let request = session
        .request(Method::GET, "/api/echo")
        .unwrap()
        .bearer_auth("caller-supplied");
    let body: Value = session.send(request).await.unwrap().json().await.unwrap();

    assert_eq!(body["authorization"], "caller-supplied");
}
