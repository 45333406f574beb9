use std::sync::Arc;

use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::broadcast;
use url::Url;

use super::ClientConfig;
use super::error::{ClientError, RefreshError};
use super::events::SessionEvent;
use super::middleware::{BearerAuth, RefreshOnUnauthorized, RetryOnRateLimit};
use super::refresh::{HttpTokenRefresher, RefreshCoordinator};
use super::token_store::{AccessToken, TokenStore};

const EVENT_CAPACITY: usize = 16;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AccessResponse {
    access: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Account created by [`Session::register`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredUser {
    pub id: String,
    pub email: String,
}

/// A logged-in (or not yet logged-in) client session.
///
/// Clones share the token, the refresh slot and the cookie store.
#[derive(Clone)]
pub struct Session {
    base_url: Url,
    /// No middleware: used for the auth endpoints themselves.
    bare: reqwest::Client,
    client: ClientWithMiddleware,
    coordinator: Arc<RefreshCoordinator>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let bare = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;

        let tokens = TokenStore::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let refresh_url = config.base_url.join(&config.refresh_path)?;
        let refresher = Arc::new(HttpTokenRefresher::new(bare.clone(), refresh_url.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            refresher,
            tokens.clone(),
            events.clone(),
        ));

        let client = ClientBuilder::new(bare.clone())
            .with(RetryOnRateLimit::new(config.backoff))
            .with(RefreshOnUnauthorized::new(
                coordinator.clone(),
                refresh_url.path(),
            ))
            .with(BearerAuth::new(tokens))
            .build();

        Ok(Self {
            base_url: config.base_url,
            bare,
            client,
            coordinator,
            events,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.coordinator.tokens().get()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Refresh now, sharing any refresh already in flight.
    pub async fn ensure_fresh_access_token(&self) -> Result<AccessToken, RefreshError> {
        self.coordinator.ensure_fresh_access_token().await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<RegisteredUser, ClientError> {
        let response = self
            .bare
            .post(self.url("/auth/register")?)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let response = error_for_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .bare
            .post(self.url("/auth/login")?)
            .json(&Credentials { email, password })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::InvalidCredentials);
        }
        let body: AccessResponse = error_for_status(response).await?.json().await?;

        self.coordinator.tokens().set(AccessToken::new(body.access));
        let _ = self.events.send(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Tell the server to drop the refresh cookie and forget the access token.
    /// Local state is cleared even if the server cannot be reached.
    pub async fn logout(&self) {
        if let Err(e) = self.notify_logout().await {
            tracing::warn!(error = %e, "Logout request failed");
        }

        self.coordinator.tokens().take();
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    async fn notify_logout(&self) -> Result<(), ClientError> {
        let response = self.bare.post(self.url("/auth/logout")?).send().await?;
        error_for_status(response).await?;
        Ok(())
    }

    /// Start a request through the retry pipeline.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.client.request(method, self.url(path)?))
    }

    /// Send a request built with [`Session::request`] and map error statuses.
    pub async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.coordinator.expire();
        }
        error_for_status(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        Ok(response.json().await?)
    }

    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(self.request(method, path)?.json(body)).await?;
        Ok(response.json().await?)
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
    };
    Err(ClientError::from_status(status, message))
}
