//! Comment API endpoints
//!
//! - POST /api/v1/comments - Comment on a picture
//! - PATCH /api/v1/comments/{comment_id} - Edit own comment
//! - DELETE /api/v1/comments/{comment_id} - Remove a comment (admin/moderator)
//! - GET /api/v1/comments/picture/{picture_id} - Comments on a picture
//! - GET /api/v1/comments/user/{user_id} - Comments by a user

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, ApiQuery, AppState, AuthenticatedUser};
use crate::models::{Comment, CreateCommentInput, Pagination, UpdateCommentInput};

/// Build comment routes (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_comment))
        .route("/{comment_id}", patch(update_comment).delete(delete_comment))
        .route("/picture/{picture_id}", get(list_by_picture))
        .route("/user/{user_id}", get(list_by_user))
}

async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state.comment_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn update_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(comment_id): Path<i64>,
    Json(body): Json<UpdateCommentInput>,
) -> Result<Json<Comment>, ApiError> {
    Ok(Json(
        state.comment_service.update(&user, comment_id, body).await?,
    ))
}

async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(comment_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(&user, comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_by_picture(
    State(state): State<AppState>,
    Path(picture_id): Path<i64>,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    Ok(Json(
        state.comment_service.list_by_picture(picture_id, page).await?,
    ))
}

async fn list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    Ok(Json(state.comment_service.list_by_user(user_id, page).await?))
}
