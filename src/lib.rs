pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;

use api::{create_api_router, create_auth_router};
use auth::ClientIpSource;
use axum::Router;
use db::Database;
use jwt::JwtConfig;
use password::PasswordHasher;
use rate_limit::{RateLimitConfig, RateLimitSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl: u64,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Where the client IP for rate limiting comes from
    pub ip_source: ClientIpSource,
    pub rate_limits: RateLimitSettings,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
}

impl ServerConfig {
    /// Configuration with default lifetimes, quotas and bcrypt cost.
    pub fn new(db: Database, jwt_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            access_ttl: jwt::ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl: jwt::REFRESH_TOKEN_DURATION_SECS,
            secure_cookies: false,
            ip_source: ClientIpSource::Socket,
            rate_limits: RateLimitSettings::default(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(
        JwtConfig::new(&config.jwt_secret).with_durations(config.access_ttl, config.refresh_ttl),
    );

    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.rate_limits,
        config.ip_source,
        jwt.clone(),
    ));

    let auth_router = create_auth_router(
        config.db.clone(),
        jwt.clone(),
        PasswordHasher::new(config.bcrypt_cost),
        config.secure_cookies,
        rate_limit_config.clone(),
    );

    let api_router = create_api_router(config.db.clone(), jwt, rate_limit_config);

    Router::new()
        .nest("/auth", auth_router)
        .nest("/api", api_router)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
