//! Route-level authentication middleware.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::extractors::authenticate_headers;
use super::state::HasAuthState;
use super::types::AuthenticatedUser;

/// Require a valid access token. On success the decoded user is stored in the
/// request extensions for handlers and later layers.
pub async fn require_auth<S>(State(state): State<S>, mut request: Request, next: Next) -> Response
where
    S: HasAuthState + Clone + Send + Sync + 'static,
{
    match authenticate_headers(request.headers(), &state) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(kind) => ApiAuthError::new(kind).into_response(),
    }
}

/// Require an admin. Must run after `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Response {
    let Some(user) = request.extensions().get::<AuthenticatedUser>() else {
        return ApiAuthError::new(AuthErrorKind::NotAuthenticated).into_response();
    };

    if !user.is_admin() {
        tracing::info!(user = %user.uuid(), "Admin route refused");
        return ApiAuthError::new(AuthErrorKind::InsufficientRole).into_response();
    }

    next.run(request).await
}
