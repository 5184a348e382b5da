//! Moderation state machine
//!
//! Admins and moderators act on other users through three actions:
//!
//! | Action        | Allowed actors      | Transition        |
//! |---------------|---------------------|-------------------|
//! | `ban`         | admin, moderator    | Active -> Banned  |
//! | `activate`    | admin               | Banned -> Active  |
//! | `change_role` | admin               | role -> new role  |
//!
//! An actor targeting themselves is never an error, the request is simply
//! ignored. Every applied change drops the target's `user:{email}` cache
//! entry after the store write has committed.

use crate::cache::{invalidate_quietly, CacheInvalidator};
use crate::db::repositories::UserRepository;
use crate::models::{User, UserRole, UserStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Moderation action requested on a target user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Ban,
    Activate,
    ChangeRole,
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationAction::Ban => write!(f, "ban"),
            ModerationAction::Activate => write!(f, "activate"),
            ModerationAction::ChangeRole => write!(f, "change_role"),
        }
    }
}

/// Successful result of a moderation request
#[derive(Debug, Clone)]
pub enum ModerationOutcome {
    /// The change was written; carries the updated target
    Applied(User),
    /// Actor and target are the same account; nothing changed
    SelfActionIgnored(User),
}

impl ModerationOutcome {
    pub fn user(&self) -> &User {
        match self {
            ModerationOutcome::Applied(user) | ModerationOutcome::SelfActionIgnored(user) => user,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ModerationOutcome::Applied(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Not allowed to {0} users")]
    Forbidden(ModerationAction),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

/// Applies moderation actions against the user store
pub struct ModerationService {
    users: Arc<dyn UserRepository>,
    cache: Arc<dyn CacheInvalidator>,
}

impl ModerationService {
    pub fn new(users: Arc<dyn UserRepository>, cache: Arc<dyn CacheInvalidator>) -> Self {
        Self { users, cache }
    }

    /// Apply `action` to the user named `target_username`.
    ///
    /// `role` is only read by `ChangeRole`, where it is required.
    pub async fn apply(
        &self,
        actor: &User,
        target_username: &str,
        action: ModerationAction,
        role: Option<UserRole>,
    ) -> Result<ModerationOutcome, ModerationError> {
        let mut target = self
            .users
            .get_by_username(target_username)
            .await?
            .ok_or_else(|| ModerationError::NotFound(target_username.to_string()))?;

        if target.id == actor.id {
            tracing::debug!("Ignoring {} by user {} on themselves", action, actor.id);
            return Ok(ModerationOutcome::SelfActionIgnored(target));
        }

        if !Self::is_permitted(actor.role, action) {
            return Err(ModerationError::Forbidden(action));
        }

        match action {
            ModerationAction::Ban => {
                self.transition(&mut target, UserStatus::Active, UserStatus::Banned)
                    .await?
            }
            ModerationAction::Activate => {
                self.transition(&mut target, UserStatus::Banned, UserStatus::Active)
                    .await?
            }
            ModerationAction::ChangeRole => {
                let role = role.ok_or_else(|| {
                    ModerationError::BadRequest("Role is required for change_role".to_string())
                })?;
                if !self.users.set_role(target.id, role).await? {
                    return Err(ModerationError::NotFound(target_username.to_string()));
                }
                target.role = role;
            }
        }

        tracing::info!(
            "User {} applied {} to user {} (status: {}, role: {})",
            actor.id,
            action,
            target.id,
            target.status(),
            target.role
        );

        invalidate_quietly(self.cache.as_ref(), &target.cache_key()).await;

        Ok(ModerationOutcome::Applied(target))
    }

    fn is_permitted(role: UserRole, action: ModerationAction) -> bool {
        match action {
            ModerationAction::Ban => matches!(role, UserRole::Admin | UserRole::Moderator),
            ModerationAction::Activate | ModerationAction::ChangeRole => role == UserRole::Admin,
        }
    }

    async fn transition(
        &self,
        target: &mut User,
        from: UserStatus,
        to: UserStatus,
    ) -> Result<(), ModerationError> {
        if target.status() != from {
            return Err(ModerationError::Conflict(format!("User is already {}", to)));
        }

        // Someone else may have moved the user since it was read
        if !self.users.transition_status(target.id, from, to).await? {
            return Err(ModerationError::Conflict(format!("User is already {}", to)));
        }

        target.is_active = to.is_active();
        Ok(())
    }
}
