//! User API endpoints
//!
//! - GET /api/v1/users/me - Own account (drops the cached copy)
//! - PATCH /api/v1/users/me - Edit own username/avatar
//! - GET /api/v1/users - List users
//! - GET /api/v1/users/{username} - Profile with counters (admin/moderator)
//! - PATCH /api/v1/users/{username}?action=&role= - Moderation

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiQuery, AppState, AuthenticatedUser};
use crate::models::{Pagination, UpdateProfileInput, User, UserProfile, UserRole};
use crate::services::{ModerationAction, ModerationOutcome};

/// Query string of the moderation endpoint
#[derive(Debug, Deserialize)]
pub struct ModerationQuery {
    pub action: ModerationAction,
    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct ModerationResponse {
    /// `false` when the request targeted the caller and was ignored
    pub applied: bool,
    pub user: User,
}

impl From<ModerationOutcome> for ModerationResponse {
    fn from(outcome: ModerationOutcome) -> Self {
        match outcome {
            ModerationOutcome::Applied(user) => Self { applied: true, user },
            ModerationOutcome::SelfActionIgnored(user) => Self { applied: false, user },
        }
    }
}

/// Build user routes (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(read_me).patch(edit_me))
        .route("/{username}", get(get_profile).patch(moderate))
}

/// GET /api/v1/users/me
async fn read_me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.read_me(&user).await?))
}

/// PATCH /api/v1/users/me
async fn edit_me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.edit_profile(&user, body).await?))
}

/// GET /api/v1/users?skip=&limit=
async fn list_users(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.user_service.list(page).await?))
}

/// GET /api/v1/users/{username}
async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(username): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.user_service.get_profile(&actor, &username).await?))
}

/// PATCH /api/v1/users/{username}?action=ban|activate|change_role&role=
async fn moderate(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(username): Path<String>,
    ApiQuery(query): ApiQuery<ModerationQuery>,
) -> Result<Json<ModerationResponse>, ApiError> {
    let outcome = state
        .moderation_service
        .apply(&actor, &username, query.action, query.role)
        .await?;
    Ok(Json(outcome.into()))
}
