//! Tag service
//!
//! Creating a tag reuses an existing one with the same name. Renaming onto a
//! taken name is a conflict; renames and deletions are moderation tasks.

use crate::db::is_unique_violation;
use crate::db::repositories::TagRepository;
use crate::models::{Tag, User, MAX_TAG_LENGTH};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Tag name '{0}' already exists")]
    Conflict(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(TagServiceError::NotFound(id))
    }

    /// Create a tag, or return the existing tag with the same name.
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;

        if let Some(existing) = self.repo.get_by_name(name).await? {
            return Ok(existing);
        }

        match self.repo.create(name).await {
            Ok(tag) => {
                tracing::debug!("Created tag {} '{}'", tag.id, tag.name);
                Ok(tag)
            }
            // Lost a race against an identical create
            Err(e) if is_unique_violation(&e) => self
                .repo
                .get_by_name(name)
                .await
                .context("Failed to reload tag")?
                .ok_or_else(|| TagServiceError::Conflict(name.to_string())),
            Err(e) => Err(TagServiceError::StorageError(e)),
        }
    }

    /// Rename a tag. Admins and moderators only.
    pub async fn rename(&self, actor: &User, id: i64, name: &str) -> Result<Tag, TagServiceError> {
        require_moderator(actor)?;
        let name = validate_name(name)?;

        let tag = self.get(id).await?;
        if tag.name == name {
            return Ok(tag);
        }
        if self.repo.get_by_name(name).await?.is_some() {
            return Err(TagServiceError::Conflict(name.to_string()));
        }

        match self.repo.rename(id, name).await {
            Ok(Some(renamed)) => {
                tracing::info!("User {} renamed tag {} to '{}'", actor.id, id, name);
                Ok(renamed)
            }
            Ok(None) => Err(TagServiceError::NotFound(id)),
            Err(e) if is_unique_violation(&e) => Err(TagServiceError::Conflict(name.to_string())),
            Err(e) => Err(TagServiceError::StorageError(e)),
        }
    }

    /// Delete a tag. Admins and moderators only.
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), TagServiceError> {
        require_moderator(actor)?;

        if !self.repo.delete(id).await? {
            return Err(TagServiceError::NotFound(id));
        }

        tracing::info!("User {} deleted tag {}", actor.id, id);
        Ok(())
    }
}

fn require_moderator(actor: &User) -> Result<(), TagServiceError> {
    if actor.can_moderate() {
        Ok(())
    } else {
        Err(TagServiceError::Forbidden(
            "Only admins and moderators can change tags".to_string(),
        ))
    }
}

fn validate_name(name: &str) -> Result<&str, TagServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagServiceError::ValidationError(
            "Tag name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_TAG_LENGTH {
        return Err(TagServiceError::ValidationError(format!(
            "Tag name cannot exceed {} characters",
            MAX_TAG_LENGTH
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxTagRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use anyhow::Result;
    use async_trait::async_trait;

    async fn setup_repo() -> Arc<dyn TagRepository> {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxTagRepository::boxed(pool)
    }

    fn user(id: i64, role: UserRole) -> User {
        let mut user = User::new(
            format!("user{}", id),
            format!("user{}@example.com", id),
            "hash".to_string(),
            role,
        );
        user.id = id;
        user
    }

    #[tokio::test]
    async fn test_create_reuses_existing_name() {
        let service = TagService::new(setup_repo().await);

        let first = service.create_or_get("  sunset ").await.unwrap();
        assert_eq!(first.name, "sunset");

        let again = service.create_or_get("sunset").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_name_validation() {
        let service = TagService::new(setup_repo().await);

        let err = service.create_or_get("   ").await.unwrap_err();
        assert!(matches!(err, TagServiceError::ValidationError(_)));

        let long = "t".repeat(MAX_TAG_LENGTH + 1);
        let err = service.create_or_get(&long).await.unwrap_err();
        assert!(matches!(err, TagServiceError::ValidationError(_)));

        let exact = "t".repeat(MAX_TAG_LENGTH);
        assert_eq!(service.create_or_get(&exact).await.unwrap().name, exact);
    }

    #[tokio::test]
    async fn test_get_missing_tag() {
        let service = TagService::new(setup_repo().await);

        let err = service.get(42).await.unwrap_err();
        assert!(matches!(err, TagServiceError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_rename() {
        let service = TagService::new(setup_repo().await);
        let moderator = user(1, UserRole::Moderator);
        let city = service.create_or_get("city").await.unwrap();
        service.create_or_get("beach").await.unwrap();

        let err = service.rename(&moderator, city.id, "beach").await.unwrap_err();
        assert!(matches!(err, TagServiceError::Conflict(name) if name == "beach"));

        let unchanged = service.rename(&moderator, city.id, "city").await.unwrap();
        assert_eq!(unchanged, city);

        let renamed = service.rename(&moderator, city.id, "urban").await.unwrap();
        assert_eq!(renamed.name, "urban");
        assert_eq!(service.get(city.id).await.unwrap().name, "urban");

        let err = service.rename(&moderator, 999, "ghost").await.unwrap_err();
        assert!(matches!(err, TagServiceError::NotFound(999)));
    }

    #[tokio::test]
    async fn test_changes_require_moderator() {
        let service = TagService::new(setup_repo().await);
        let member = user(2, UserRole::User);
        let admin = user(1, UserRole::Admin);
        let tag = service.create_or_get("night").await.unwrap();

        let err = service.rename(&member, tag.id, "dark").await.unwrap_err();
        assert!(matches!(err, TagServiceError::Forbidden(_)));
        let err = service.delete(&member, tag.id).await.unwrap_err();
        assert!(matches!(err, TagServiceError::Forbidden(_)));

        service.delete(&admin, tag.id).await.unwrap();
        let err = service.delete(&admin, tag.id).await.unwrap_err();
        assert!(matches!(err, TagServiceError::NotFound(_)));
    }

    /// Never sees a taken name on lookup, so only the constraint catches it
    struct BlindNames {
        inner: Arc<dyn TagRepository>,
    }

    #[async_trait]
    impl TagRepository for BlindNames {
        async fn create(&self, name: &str) -> Result<Tag> {
            self.inner.create(name).await
        }
        async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
            self.inner.get_by_id(id).await
        }
        async fn get_by_name(&self, _name: &str) -> Result<Option<Tag>> {
            Ok(None)
        }
        async fn list(&self) -> Result<Vec<Tag>> {
            self.inner.list().await
        }
        async fn rename(&self, id: i64, name: &str) -> Result<Option<Tag>> {
            self.inner.rename(id, name).await
        }
        async fn delete(&self, id: i64) -> Result<bool> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_store_constraint_maps_to_conflict() {
        let repo = setup_repo().await;
        let seeded = TagService::new(repo.clone());
        let city = seeded.create_or_get("city").await.unwrap();
        seeded.create_or_get("beach").await.unwrap();

        let service = TagService::new(Arc::new(BlindNames { inner: repo }));
        let moderator = user(1, UserRole::Moderator);

        let err = service.rename(&moderator, city.id, "beach").await.unwrap_err();
        assert!(matches!(err, TagServiceError::Conflict(_)));

        let err = service.create_or_get("beach").await.unwrap_err();
        assert!(matches!(err, TagServiceError::Conflict(_)));
        assert_eq!(seeded.list().await.unwrap().len(), 2);
    }
}
