//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type and its mapping from service errors
//! - Bearer token authentication

use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::{
    CommentService, CommentServiceError, ModerationError, ModerationService, RatingError,
    RatingService, TagService, TagServiceError, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub moderation_service: Arc<ModerationService>,
    pub rating_service: Arc<RatingService>,
    pub comment_service: Arc<CommentService>,
    pub tag_service: Arc<TagService>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Bearer token the current request was authenticated with
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Query string extractor whose rejections use the JSON error body
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Logs the cause; the client only sees a generic message
    pub fn internal_error(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "BAD_REQUEST" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::Conflict(msg) => ApiError::conflict(msg),
            e @ UserServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            UserServiceError::StorageError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<ModerationError> for ApiError {
    fn from(err: ModerationError) -> Self {
        match err {
            e @ ModerationError::NotFound(_) => ApiError::not_found(e.to_string()),
            e @ ModerationError::Forbidden(_) => ApiError::forbidden(e.to_string()),
            ModerationError::Conflict(msg) => ApiError::conflict(msg),
            ModerationError::BadRequest(msg) => ApiError::bad_request(msg),
            ModerationError::StorageError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<RatingError> for ApiError {
    fn from(err: RatingError) -> Self {
        match err {
            e @ RatingError::BadRequest(_) => ApiError::bad_request(e.to_string()),
            e @ RatingError::Conflict { .. } => ApiError::conflict(e.to_string()),
            e @ RatingError::NotFound { .. } => ApiError::not_found(e.to_string()),
            RatingError::StorageError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            e @ CommentServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            CommentServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CommentServiceError::StorageError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            e @ TagServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            TagServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            e @ TagServiceError::Conflict(_) => ApiError::conflict(e.to_string()),
            TagServiceError::StorageError(e) => ApiError::internal_error(e),
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
///
/// Rejects revoked or unknown tokens with 401 and banned users with 403.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state.user_service.authenticate(&token).await?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    request.extensions_mut().insert(SessionToken(token));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RevocationError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(RatingError::BadRequest(0)), StatusCode::BAD_REQUEST),
            (
                ApiError::from(RatingError::Conflict { user_id: 1, picture_id: 2 }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(ModerationError::NotFound("ghost".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(UserServiceError::Forbidden("banned".to_string())),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(UserServiceError::AuthenticationError("bad".to_string())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(TagServiceError::Conflict("sunset".to_string())),
                StatusCode::CONFLICT,
            ),
            (ApiError::from(TagServiceError::NotFound(9)), StatusCode::NOT_FOUND),
            (
                ApiError::from(UserServiceError::from(RevocationError::Conflict)),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(UserServiceError::from(RevocationError::StorageError(
                    anyhow::anyhow!("db down"),
                ))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{:?}", error);
        }
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let error = ApiError::internal_error("connection refused at 10.0.0.3");
        assert_eq!(error.error.message, "Internal server error");
    }
}
