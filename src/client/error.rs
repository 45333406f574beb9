use reqwest::StatusCode;

/// Why a token refresh failed. Cloneable so every caller waiting on the same
/// refresh receives the same error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh rejected with status {0}")]
    Rejected(StatusCode),
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("refresh response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server rejected the input (400).
    #[error("invalid request: {0}")]
    Validation(String),
    /// Login with an unknown email or a wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// The access token could not be renewed; the local token has been cleared.
    #[error("session expired, please log in again")]
    SessionExpired,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// Still rate limited after the allowed resubmission.
    #[error("still too many requests, try again later")]
    RateLimited,
    #[error("unexpected status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest_middleware::Error),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.into())
        }
    }
}

impl ClientError {
    /// Map a non-success status and its `{"error": ...}` message.
    pub(crate) fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::Validation(message),
            StatusCode::UNAUTHORIZED => Self::SessionExpired,
            StatusCode::FORBIDDEN => Self::Forbidden(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            _ => Self::Status { status, message },
        }
    }
}
