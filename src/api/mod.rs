mod admin;
mod auth;
mod error;
mod users;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::auth::{require_admin, require_auth};
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::password::PasswordHasher;
use crate::rate_limit::{RateLimitConfig, rate_limit_api};

pub use auth::AuthState;
pub use error::{ApiError, RATE_LIMIT_RESET, ResultExt};
pub use users::UsersState;

/// Create the `/auth` router: register, login, refresh and logout.
pub fn create_auth_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    hasher: PasswordHasher,
    secure_cookies: bool,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    hasher.warm_up();
    auth::router(AuthState {
        db,
        jwt,
        hasher,
        secure_cookies,
        rate_limit_config,
    })
}

/// Create the protected `/api` router. Every route requires a bearer token;
/// `/admin` additionally requires the admin role.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let users_state = UsersState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let admin_router =
        admin::router(admin::AdminState { db }).layer(middleware::from_fn(require_admin));

    Router::new()
        .nest("/users", users::router(users_state.clone()))
        .nest("/admin", admin_router)
        .layer(middleware::from_fn_with_state(
            users_state,
            require_auth::<UsersState>,
        ))
        .layer(middleware::from_fn_with_state(
            rate_limit_config,
            rate_limit_api,
        ))
}
