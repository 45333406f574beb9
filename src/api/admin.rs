//! Admin-only endpoints. Routes here sit behind `require_admin`.

use axum::{Json, Router, extract::State, routing::get};

use super::error::{ApiError, ResultExt};
use crate::db::{Database, UserSummary};

#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .with_state(state)
}

async fn list_users(State(state): State<AdminState>) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(Json(users))
}
