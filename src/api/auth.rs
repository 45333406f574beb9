//! Register, login, refresh and logout.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ApiJson, ResultExt};
use crate::auth::{REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie};
use crate::db::{Database, NewUser, is_unique_violation};
use crate::jwt::JwtConfig;
use crate::password::{PasswordHasher, validate_email, validate_password};
use crate::rate_limit::{RateLimitConfig, rate_limit_auth};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub hasher: PasswordHasher,
    pub secure_cookies: bool,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

pub fn router(state: AuthState) -> Router {
    let limited = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_auth,
        ));

    let open = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(state);

    Router::new().merge(limited).merge(open)
}

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: String,
    email: String,
}

#[derive(Serialize)]
struct AccessResponse {
    access: String,
}

async fn register(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&payload.email).map_err(ApiError::bad_request)?;
    validate_password(&payload.password).map_err(ApiError::bad_request)?;

    let hasher = state.hasher.clone();
    let password = payload.password;
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .internal_err("Password hashing task failed")?
        .internal_err("Failed to hash password")?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let user = match state
        .db
        .users()
        .create(NewUser {
            uuid: &uuid,
            email: &email,
            password_hash: &password_hash,
        })
        .await
    {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    tracing::info!(user = %user.uuid, role = user.role.as_str(), "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.uuid,
            email: user.email,
        }),
    ))
}

async fn login(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let email = validate_email(&payload.email).map_err(ApiError::bad_request)?;
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let user = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to look up user")?;

    let hasher = state.hasher.clone();
    let password = payload.password;
    let Some(user) = user else {
        tokio::task::spawn_blocking(move || hasher.verify_missing(&password))
            .await
            .internal_err("Password check task failed")?;
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };
    let stored_hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
        .await
        .internal_err("Password check task failed")?;

    if !valid {
        tracing::info!(user = %user.uuid, "Login failed");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let access = state
        .jwt
        .generate_access_token(&user.uuid, user.role, Some(&user.email))
        .internal_err("Failed to generate access token")?;
    let refresh = state
        .jwt
        .generate_refresh_token(&user.uuid, user.role)
        .internal_err("Failed to generate refresh token")?;

    let cookie = refresh_cookie(&refresh.token, refresh.duration, state.secure_cookies);
    let mut response = Json(AccessResponse {
        access: access.token,
    })
    .into_response();
    let value = HeaderValue::from_str(&cookie).internal_err("Invalid refresh cookie")?;
    response.headers_mut().insert(header::SET_COOKIE, value);

    tracing::info!(user = %user.uuid, "User logged in");
    Ok(response)
}

async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<AccessResponse>, ApiError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let claims = state.jwt.validate_refresh_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected refresh token");
        ApiError::unauthorized("Invalid or expired token")
    })?;

    let access = state
        .jwt
        .generate_access_token(&claims.sub, claims.role, None)
        .internal_err("Failed to generate access token")?;

    tracing::debug!(user = %claims.sub, "Access token refreshed");
    Ok(Json(AccessResponse {
        access: access.token,
    }))
}

async fn logout(State(state): State<AuthState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_refresh_cookie(state.secure_cookies))],
    )
}
