use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::Auth;
use crate::db::{Database, UserRole};
use crate::impl_has_auth_state;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_state!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new().route("/me", get(me)).with_state(state)
}

#[derive(Serialize)]
struct MeResponse {
    uuid: String,
    email: String,
    role: UserRole,
}

async fn me(
    State(state): State<UsersState>,
    Auth(user): Auth,
) -> Result<Json<MeResponse>, ApiError> {
    // The account may have been removed after the token was issued.
    let db_user = state
        .db
        .users()
        .get_by_uuid(user.uuid())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    Ok(Json(MeResponse {
        uuid: db_user.uuid,
        email: db_user.email,
        role: db_user.role,
    }))
}
