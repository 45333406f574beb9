//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthState;
use super::types::AuthenticatedUser;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Verify the bearer token in `headers`.
pub(super) fn authenticate_headers<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthState,
{
    let token = bearer_token(headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = state.jwt().validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AuthErrorKind::InvalidToken
    })?;

    Ok(AuthenticatedUser { claims })
}

/// Extractor for endpoints that require authentication.
///
/// Reuses the user placed in the request extensions by `require_auth` and
/// otherwise verifies the bearer token itself.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Auth(user.clone()));
        }

        authenticate_headers(&parts.headers, state)
            .map(Auth)
            .map_err(ApiAuthError::from)
    }
}
