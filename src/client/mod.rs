//! HTTP client side of the token lifecycle.
//!
//! A [`Session`] keeps the access token in memory, attaches it to outgoing
//! requests, refreshes it once on 401 with concurrent refreshes collapsed
//! into one, and retries once on 429 after a bounded backoff.

mod backoff;
mod error;
mod events;
mod middleware;
mod refresh;
mod session;
mod token_store;

use std::time::Duration;

use url::Url;

pub use backoff::{BackoffPolicy, RATE_LIMIT_RESET};
pub use error::{ClientError, RefreshError};
pub use events::SessionEvent;
pub use middleware::{BearerAuth, RefreshOnUnauthorized, RetryOnRateLimit, RetryState};
pub use refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
pub use session::{RegisteredUser, Session};
pub use token_store::{AccessToken, TokenStore};

/// Default timeout applied to every request, including refreshes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Refresh endpoint, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server origin, e.g. `http://127.0.0.1:7291`.
    pub base_url: Url,
    pub timeout: Duration,
    /// Path of the refresh endpoint. Requests to it are never retried on 401.
    pub refresh_path: String,
    pub backoff: BackoffPolicy,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}
