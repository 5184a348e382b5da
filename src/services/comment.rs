//! Comment service
//!
//! Flat comments on pictures. Authors edit their own comments; removal is a
//! moderation task.

use crate::db::repositories::CommentRepository;
use crate::models::{Comment, CreateCommentInput, Pagination, UpdateCommentInput, User};
use std::sync::Arc;

/// Longest accepted comment body, in characters
pub const MAX_COMMENT_LENGTH: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment not found: {0}")]
    NotFound(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        author: &User,
        input: CreateCommentInput,
    ) -> Result<Comment, CommentServiceError> {
        let body = validate_body(&input.body)?;
        let comment = self.repo.create(author.id, input.picture_id, body).await?;
        tracing::debug!("User {} commented on picture {}", author.id, input.picture_id);
        Ok(comment)
    }

    /// Replace the body of a comment. Only its author may do this.
    pub async fn update(
        &self,
        editor: &User,
        id: i64,
        input: UpdateCommentInput,
    ) -> Result<Comment, CommentServiceError> {
        let body = validate_body(&input.body)?;

        let existing = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(CommentServiceError::NotFound(id))?;
        if existing.user_id != editor.id {
            return Err(CommentServiceError::Forbidden(
                "Only the author can edit a comment".to_string(),
            ));
        }

        self.repo
            .update_body(id, body)
            .await?
            .ok_or(CommentServiceError::NotFound(id))
    }

    /// Delete a comment. Admins and moderators only.
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), CommentServiceError> {
        if !actor.can_moderate() {
            return Err(CommentServiceError::Forbidden(
                "Only admins and moderators can delete comments".to_string(),
            ));
        }

        if !self.repo.delete(id).await? {
            return Err(CommentServiceError::NotFound(id));
        }

        tracing::info!("User {} deleted comment {}", actor.id, id);
        Ok(())
    }

    pub async fn list_by_picture(
        &self,
        picture_id: i64,
        page: Pagination,
    ) -> Result<Vec<Comment>, CommentServiceError> {
        let page = page.normalized();
        Ok(self
            .repo
            .list_by_picture(picture_id, page.skip, page.limit)
            .await?)
    }

    pub async fn list_by_user(
        &self,
        user_id: i64,
        page: Pagination,
    ) -> Result<Vec<Comment>, CommentServiceError> {
        let page = page.normalized();
        Ok(self.repo.list_by_user(user_id, page.skip, page.limit).await?)
    }
}

fn validate_body(body: &str) -> Result<&str, CommentServiceError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(CommentServiceError::ValidationError(
            "Comment cannot be empty".to_string(),
        ));
    }
    if body.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CommentServiceError::ValidationError(format!(
            "Comment cannot exceed {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(body)
}
