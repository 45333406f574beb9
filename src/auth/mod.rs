//! Bearer-token authentication with role-based access control.
//!
//! Access tokens are short-lived and stateless, sent as `Authorization: Bearer`.
//! Refresh tokens live in an httponly cookie scoped to the refresh endpoint and
//! are only used to mint new access tokens.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod middleware;
mod state;
mod types;

pub use cookie::{
    REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH, clear_refresh_cookie, get_cookie, refresh_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, bearer_token};
pub use ip::{ClientIpSource, extract_client_ip};
pub use middleware::{require_admin, require_auth};
pub use state::HasAuthState;
pub use types::AuthenticatedUser;
