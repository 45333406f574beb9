//! In-memory access token cell.

use std::sync::Arc;

use reqwest::header::HeaderValue;
use tokio::sync::watch;

/// A bearer access token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Arc<str>);

impl AccessToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `Authorization` header value, marked sensitive. `None` if the token
    /// contains bytes that are not valid in a header.
    pub fn header_value(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0)).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Holder of the current access token. Never persisted; clones share the same
/// cell and the last write wins.
#[derive(Clone)]
pub struct TokenStore {
    tx: Arc<watch::Sender<Option<AccessToken>>>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Option<AccessToken> {
        self.tx.borrow().clone()
    }

    pub fn set(&self, token: AccessToken) {
        self.tx.send_replace(Some(token));
    }

    /// Remove the token, returning the one that was stored.
    pub fn take(&self) -> Option<AccessToken> {
        self.tx.send_replace(None)
    }

    /// Receive every change to the stored token.
    pub fn watch(&self) -> watch::Receiver<Option<AccessToken>> {
        self.tx.subscribe()
    }
}
