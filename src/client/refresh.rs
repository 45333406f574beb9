//! Single-flight access token refresh.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tokio::sync::broadcast;
use url::Url;

use super::error::RefreshError;
use super::events::SessionEvent;
use super::token_store::{AccessToken, TokenStore};

/// Obtains a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync + 'static {
    async fn refresh(&self) -> Result<AccessToken, RefreshError>;
}

#[derive(Deserialize)]
struct AccessResponse {
    access: String,
}

/// Calls the refresh endpoint with a plain client. The refresh cookie comes
/// from the client's cookie store; no middleware runs, so a 401 here can never
/// trigger another refresh.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    url: Url,
}

impl HttpTokenRefresher {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<AccessToken, RefreshError> {
        let response = self
            .client
            .post(self.url.clone())
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status));
        }

        let body: AccessResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::Decode(e.to_string()))?;
        Ok(AccessToken::new(body.access))
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<AccessToken, RefreshError>>>;

/// Collapses concurrent refresh requests into one network call.
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    tokens: TokenStore,
    events: broadcast::Sender<SessionEvent>,
    in_flight: Arc<Mutex<Option<SharedRefresh>>>,
}

impl RefreshCoordinator {
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        tokens: TokenStore,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            refresher,
            tokens,
            events,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Refresh the access token, joining the refresh already in flight if there
    /// is one. Every caller gets the same result.
    pub async fn ensure_fresh_access_token(&self) -> Result<AccessToken, RefreshError> {
        let refresh = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(refresh) => refresh.clone(),
                None => {
                    let refresh = self.start_refresh();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    fn start_refresh(&self) -> SharedRefresh {
        let refresher = self.refresher.clone();
        let tokens = self.tokens.clone();
        let events = self.events.clone();
        let slot = self.in_flight.clone();

        async move {
            tracing::debug!("Refreshing access token");
            let result = refresher.refresh().await;

            match &result {
                Ok(token) => {
                    tokens.set(token.clone());
                    let _ = events.send(SessionEvent::Refreshed);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Access token refresh failed");
                    tokens.take();
                    let _ = events.send(SessionEvent::Expired);
                }
            }

            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            result
        }
        .boxed()
        .shared()
    }

    /// Drop the access token after the server rejected a freshly refreshed one.
    pub fn expire(&self) {
        if self.tokens.take().is_some() {
            let _ = self.events.send(SessionEvent::Expired);
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }
}
