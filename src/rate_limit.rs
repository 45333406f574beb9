//! Rate limiting for authentication and API endpoints.
//!
//! Token buckets keyed per client. Rejections carry `Retry-After` and
//! `RateLimit-Reset` so well-behaved clients know when to come back.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use std::{num::NonZeroU32, sync::Arc};

use crate::api::ApiError;
use crate::auth::{ClientIpSource, bearer_token, extract_client_ip};
use crate::jwt::JwtConfig;

/// Keyed limiter; keys are client IPs or `user:`/`ip:` prefixed identities.
pub type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Quotas for the two limiters.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Register and login attempts per minute per IP.
    pub auth_per_minute: u32,
    /// Sustained API requests per second per user (or IP when anonymous).
    pub api_per_second: u32,
    /// API burst size.
    pub api_burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth_per_minute: 10,
            api_per_second: 20,
            api_burst: 40,
        }
    }
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiting state shared by the middleware functions.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub auth: Arc<KeyedLimiter>,
    pub api: Arc<KeyedLimiter>,
    ip_source: ClientIpSource,
    jwt: Arc<JwtConfig>,
}

impl RateLimitConfig {
    pub fn new(settings: RateLimitSettings, ip_source: ClientIpSource, jwt: Arc<JwtConfig>) -> Self {
        Self {
            auth: Arc::new(RateLimiter::keyed(Quota::per_minute(non_zero(
                settings.auth_per_minute,
            )))),
            api: Arc::new(RateLimiter::keyed(
                Quota::per_second(non_zero(settings.api_per_second))
                    .allow_burst(non_zero(settings.api_burst)),
            )),
            ip_source,
            jwt,
        }
    }

    /// Identity used for the API limiter: the token subject when a valid bearer
    /// token is present, the client IP otherwise.
    fn api_key(&self, request: &Request) -> Option<String> {
        if let Some(claims) = bearer_token(request.headers())
            .and_then(|token| self.jwt.validate_access_token(token).ok())
        {
            return Some(format!("user:{}", claims.sub));
        }
        extract_client_ip(request, self.ip_source).map(|ip| format!("ip:{}", ip))
    }
}

fn check(limiter: &KeyedLimiter, key: &String) -> Result<(), ApiError> {
    limiter.check_key(key).map_err(|not_until| {
        let wait = not_until.wait_time_from(limiter.clock().now());
        ApiError::too_many_requests(wait)
    })
}

/// Middleware for register and login.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = extract_client_ip(&request, config.ip_source) else {
        return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
    };

    match check(&config.auth, &ip) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(ip = %ip, path = %request.uri().path(), "Auth rate limit exceeded");
            e.into_response()
        }
    }
}

/// Middleware for the protected API. Requests with no usable identity are
/// passed through; authentication rejects them next.
pub async fn rate_limit_api(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(key) = config.api_key(&request) else {
        return next.run(request).await;
    };

    match check(&config.api, &key) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(key = %key, "API rate limit exceeded");
            e.into_response()
        }
    }
}
