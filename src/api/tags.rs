//! Tag API endpoints
//!
//! - GET /api/v1/tags - List tags
//! - POST /api/v1/tags - Create a tag, or return the one with that name
//! - GET /api/v1/tags/{tag_id} - Get a tag
//! - PATCH /api/v1/tags/{tag_id} - Rename a tag (admin/moderator)
//! - DELETE /api/v1/tags/{tag_id} - Delete a tag (admin/moderator)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Tag, TagInput};

/// Build tag routes (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route(
            "/{tag_id}",
            get(get_tag).patch(rename_tag).delete(delete_tag),
        )
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.tag_service.list().await?))
}

async fn get_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<i64>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tag_service.get(tag_id).await?))
}

/// POST /api/v1/tags
async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<TagInput>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state.tag_service.create_or_get(&body.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// PATCH /api/v1/tags/{tag_id}
async fn rename_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(tag_id): Path<i64>,
    Json(body): Json<TagInput>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(
        state.tag_service.rename(&user, tag_id, &body.name).await?,
    ))
}

/// DELETE /api/v1/tags/{tag_id}
async fn delete_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(tag_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(&user, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
