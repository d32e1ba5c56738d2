use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    auth::{hash_password, issue_token, verify_password},
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Register a new account and return a bearer token
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let existing = state.persist.users().find_by_email(&req.email).await?;
    if existing.is_some() {
        return Err(ApiError::BadRequest("Email already registered".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .persist
        .users()
        .create(req.username, req.email, password_hash)
        .await?;

    tracing::info!(email = %user.email, "user registered");

    let token = issue_token(
        &user.email,
        &state.config.jwt_secret,
        state.config.auth.token_ttl_hours,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token: token,
            token_type: "bearer".to_string(),
        }),
    ))
}

/// Exchange credentials for a bearer token.
///
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state
        .persist
        .users()
        .find_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid credentials".to_string()))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::BadRequest("Invalid credentials".to_string()));
    }

    let token = issue_token(
        &user.email,
        &state.config.jwt_secret,
        state.config.auth.token_ttl_hours,
    )?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}
