#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use serde_json::Value;
use tokenrelay::{
    ServerConfig, auth::ClientIpSource, create_app, db::Database, rate_limit::RateLimitSettings,
};
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const TEST_IP: &str = "192.0.2.10";
pub const PASSWORD: &str = "correct horse battery";

/// Server config for tests: cheap bcrypt, IPs from `X-Forwarded-For`, generous quotas.
pub fn test_config(db: Database) -> ServerConfig {
    let mut config = ServerConfig::new(db, TEST_SECRET);
    config.bcrypt_cost = 4;
    config.ip_source = ClientIpSource::ForwardedFor;
    config.rate_limits = RateLimitSettings {
        auth_per_minute: 1000,
        api_per_second: 1000,
        api_burst: 1000,
    };
    config
}

pub async fn create_test_app() -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(db.clone())), db)
}

pub fn create_jwt() -> tokenrelay::jwt::JwtConfig {
    tokenrelay::jwt::JwtConfig::new(TEST_SECRET)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Forwarded-For", TEST_IP)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_with_token(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header("X-Forwarded-For", TEST_IP);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn register(app: &Router, email: &str) -> Response<Body> {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            serde_json::json!({ "email": email, "password": PASSWORD }),
        ))
        .await
        .unwrap()
}

pub async fn login(app: &Router, email: &str, password: &str) -> Response<Body> {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
        .unwrap()
}

/// Register and log in, returning the access token and the refresh cookie value.
pub async fn register_and_login(app: &Router, email: &str) -> (String, String) {
    register(app, email).await;
    let response = login(app, email, PASSWORD).await;
    let cookie = refresh_cookie_value(&response).expect("login sets refresh cookie");
    let body = body_json(response).await;
    (body["access"].as_str().unwrap().to_string(), cookie)
}

/// The `refresh_token` value from a `Set-Cookie` header, if any.
pub fn refresh_cookie_value(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("refresh_token="))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}
