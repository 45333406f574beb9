use crate::db::UserRole;
use crate::jwt::AccessClaims;

/// Authenticated user information decoded from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: AccessClaims,
}

impl AuthenticatedUser {
    pub fn uuid(&self) -> &str {
        &self.claims.sub
    }

    pub fn is_admin(&self) -> bool {
        self.claims.role == UserRole::Admin
    }
}
