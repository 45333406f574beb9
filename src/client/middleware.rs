//! Request pipeline stages.
//!
//! Composed outermost first as `RetryOnRateLimit`, `RefreshOnUnauthorized`,
//! `BearerAuth`. Each stage retries at most once per original request; the
//! flags live in [`RetryState`] inside the request extensions, which every
//! resubmission shares.

use std::sync::Arc;
use std::time::SystemTime;

use http::Extensions;
use reqwest::{Request, Response, StatusCode, header::AUTHORIZATION};
use reqwest_middleware::{Middleware, Next, Result};

use super::backoff::BackoffPolicy;
use super::refresh::RefreshCoordinator;
use super::token_store::TokenStore;

/// Retry bookkeeping for one original request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub retried_unauthorized: bool,
    pub rate_limit_retries: u32,
}

impl RetryState {
    fn of(extensions: &Extensions) -> Self {
        extensions.get::<RetryState>().copied().unwrap_or_default()
    }
}

/// Attach `Authorization: Bearer <token>` when a token is stored and the
/// request does not already carry the header.
pub struct BearerAuth {
    tokens: TokenStore,
}

impl BearerAuth {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl Middleware for BearerAuth {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if let Some(value) = self.tokens.get().and_then(|token| token.header_value()) {
            req.headers_mut().entry(AUTHORIZATION).or_insert(value);
        }
        next.run(req, extensions).await
    }
}

/// On 401, refresh the access token once and resubmit the request once.
pub struct RefreshOnUnauthorized {
    coordinator: Arc<RefreshCoordinator>,
    refresh_path: String,
}

impl RefreshOnUnauthorized {
    pub fn new(coordinator: Arc<RefreshCoordinator>, refresh_path: impl Into<String>) -> Self {
        Self {
            coordinator,
            refresh_path: refresh_path.into(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RefreshOnUnauthorized {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if req.url().path() == self.refresh_path {
            return next.run(req, extensions).await;
        }

        let sent_token = self.coordinator.tokens().get();
        let retry = req.try_clone();
        let response = next.clone().run(req, extensions).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let mut state = RetryState::of(extensions);
        if state.retried_unauthorized {
            self.coordinator.expire();
            return Ok(response);
        }
        let Some(mut retry) = retry else {
            tracing::debug!(url = %response.url(), "Body not cloneable, not retrying 401");
            return Ok(response);
        };
        state.retried_unauthorized = true;
        extensions.insert(state);

        // Another request may already have refreshed since this one was sent.
        let current = self.coordinator.tokens().get();
        let token = match current {
            Some(current) if Some(&current) != sent_token.as_ref() => current,
            _ => match self.coordinator.ensure_fresh_access_token().await {
                Ok(token) => token,
                Err(_) => return Ok(response),
            },
        };

        let Some(value) = token.header_value() else {
            return Ok(response);
        };
        retry.headers_mut().insert(AUTHORIZATION, value);

        tracing::debug!(url = %retry.url(), "Resubmitting after token refresh");
        let response = next.run(retry, extensions).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.coordinator.expire();
        }
        Ok(response)
    }
}

/// On 429, wait as instructed by the response (bounded) and resubmit.
pub struct RetryOnRateLimit {
    policy: BackoffPolicy,
}

impl RetryOnRateLimit {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait::async_trait]
impl Middleware for RetryOnRateLimit {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let retry = req.try_clone();
        let response = next.clone().run(req, extensions).await?;

        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let mut state = RetryState::of(extensions);
        if state.rate_limit_retries >= self.policy.max_retries {
            return Ok(response);
        }
        let Some(retry) = retry else {
            return Ok(response);
        };
        state.rate_limit_retries += 1;
        extensions.insert(state);

        let delay = self.policy.delay_for(response.headers(), SystemTime::now());
        tracing::info!(
            url = %retry.url(),
            status = %response.status(),
            delay_ms = delay.as_millis() as u64,
            "Rate limited, retrying"
        );
        drop(response);

        tokio::time::sleep(delay).await;
        next.run(retry, extensions).await
    }
}
