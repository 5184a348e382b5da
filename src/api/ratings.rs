//! Rating API endpoints
//!
//! - POST /api/v1/ratings/{picture_id} - Rate a picture
//! - GET /api/v1/ratings/{picture_id} - Average and count
//! - GET /api/v1/ratings/{picture_id}/all - Every rating of a picture
//! - DELETE /api/v1/ratings/{picture_id}/{user_id} - Remove a rating (admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Rating, RatingSummary};

#[derive(Debug, Deserialize)]
pub struct CreateRatingRequest {
    pub rating: i32,
}

/// Build rating routes (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{picture_id}", get(average).post(create))
        .route("/{picture_id}/all", get(list))
        .route("/{picture_id}/{user_id}", delete(remove))
}

/// POST /api/v1/ratings/{picture_id}
async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(picture_id): Path<i64>,
    Json(body): Json<CreateRatingRequest>,
) -> Result<(StatusCode, Json<Rating>), ApiError> {
    let rating = state
        .rating_service
        .create(picture_id, body.rating, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

/// GET /api/v1/ratings/{picture_id}
async fn average(
    State(state): State<AppState>,
    Path(picture_id): Path<i64>,
) -> Result<Json<RatingSummary>, ApiError> {
    Ok(Json(state.rating_service.average(picture_id).await?))
}

/// GET /api/v1/ratings/{picture_id}/all
async fn list(
    State(state): State<AppState>,
    Path(picture_id): Path<i64>,
) -> Result<Json<Vec<Rating>>, ApiError> {
    Ok(Json(state.rating_service.list(picture_id).await?))
}

/// DELETE /api/v1/ratings/{picture_id}/{user_id}
async fn remove(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path((picture_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<Rating>, ApiError> {
    if !actor.is_admin() {
        return Err(ApiError::forbidden("Only admins can remove ratings"));
    }
    Ok(Json(state.rating_service.remove(picture_id, user_id).await?))
}
