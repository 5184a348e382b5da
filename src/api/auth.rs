//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - User registration
//! - POST /api/v1/auth/login - User login
//! - POST /api/v1/auth/logout - Revoke the presented token
//! - PUT /api/v1/auth/password - Change own password

use axum::{extract::State, http::StatusCode, routing::{post, put}, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::models::User;
use crate::services::{LoginInput, RegisterInput};

/// Response for a successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/password", put(change_password))
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.user_service.register(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<Json<TokenResponse>, ApiError> {
    let session = state.user_service.login(body).await?;

    Ok(Json(TokenResponse {
        access_token: session.token,
        token_type: "bearer".to_string(),
        expires_at: session.expires_at,
    }))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<StatusCode, ApiError> {
    state.user_service.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/auth/password
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .user_service
        .change_password(&user, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
