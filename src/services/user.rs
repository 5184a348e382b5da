//! User service
//!
//! Accounts and their sessions:
//! - Registration (first user becomes admin)
//! - Login/logout with opaque bearer tokens
//! - Request authentication through the `user:{email}` cache
//! - Self-service profile edits and the admin profile view
//! - Account maintenance (email confirmation, refresh token, password change)

use crate::cache::{invalidate_quietly, Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{CommentRepository, SessionRepository, UserRepository};
use crate::models::{
    user_cache_key, Pagination, Session, UpdateProfileInput, User, UserProfile, UserRole,
};
use crate::services::password::CredentialHasher;
use crate::services::revocation::{RevocationError, TokenRevocationRegistry};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime in hours (7 days)
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 168;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials, or a token that is unknown, expired or revoked
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("{0}")]
    Conflict(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

impl From<RevocationError> for UserServiceError {
    fn from(err: RevocationError) -> Self {
        match err {
            RevocationError::Conflict => {
                UserServiceError::AuthenticationError("Token already revoked".to_string())
            }
            RevocationError::StorageError(e) => UserServiceError::StorageError(e),
        }
    }
}

/// User service for managing users and authentication
pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    comments: Arc<dyn CommentRepository>,
    revocations: Arc<TokenRevocationRegistry>,
    cache: Arc<Cache>,
    hasher: Arc<dyn CredentialHasher>,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        comments: Arc<dyn CommentRepository>,
        revocations: Arc<TokenRevocationRegistry>,
        cache: Arc<Cache>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            users,
            sessions,
            comments,
            revocations,
            cache,
            hasher,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    /// Override the session lifetime. Values chrono cannot represent keep the default.
    pub fn with_session_ttl_hours(mut self, hours: i64) -> Self {
        match Duration::try_hours(hours) {
            Some(ttl) => self.session_ttl = ttl,
            None => tracing::warn!("Session lifetime of {} hours is out of range", hours),
        }
        self
    }

    /// Register a new user.
    ///
    /// The very first account is created as admin, every later one as a
    /// plain user.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        validate_register_input(&input)?;

        if self.users.get_by_username(&input.username).await?.is_some() {
            return Err(UserServiceError::Conflict(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }
        if self.users.get_by_email(&input.email).await?.is_some() {
            return Err(UserServiceError::Conflict(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let role = if self.users.count().await? == 0 {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let password_hash = self
            .hasher
            .hash(&input.password)
            .context("Failed to hash password")?;
        let user = User::new(input.username, input.email, password_hash, role);

        match self.users.create(&user).await {
            Ok(created) => {
                tracing::info!("Registered user {} as {}", created.id, created.role);
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::Conflict(
                "Username or email is already taken".to_string(),
            )),
            Err(e) => Err(UserServiceError::StorageError(e)),
        }
    }

    /// Check credentials and open a session.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
            .ok_or_else(invalid)?;

        let password_valid = self
            .hasher
            .verify(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        if user.is_banned() {
            return Err(UserServiceError::Forbidden(
                "Your account has been banned".to_string(),
            ));
        }

        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            email: user.email,
            expires_at: now
                .checked_add_signed(self.session_ttl)
                .context("Session expiry out of range")?,
            created_at: now,
        };

        Ok(self.sessions.create(&session).await?)
    }

    /// Revoke `token` and drop its session.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.revocations.revoke(token).await?;
        self.sessions.delete(token).await?;
        Ok(())
    }

    /// Session behind `token`, if it exists and has not expired.
    ///
    /// Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<Session>, UserServiceError> {
        let Some(session) = self.sessions.get(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.sessions.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Resolve a bearer token to its user.
    ///
    /// Order: revocation list, session, cached user, ban flag.
    pub async fn authenticate(&self, token: &str) -> Result<User, UserServiceError> {
        if self.revocations.is_revoked(token).await? {
            return Err(UserServiceError::AuthenticationError(
                "Token has been revoked".to_string(),
            ));
        }

        let session = self.validate_session(token).await?.ok_or_else(|| {
            UserServiceError::AuthenticationError("Invalid or expired token".to_string())
        })?;

        let user = self.load_user_cached(&session.email).await?.ok_or_else(|| {
            UserServiceError::AuthenticationError("Invalid or expired token".to_string())
        })?;

        if user.is_banned() {
            return Err(UserServiceError::Forbidden(
                "Your account has been banned".to_string(),
            ));
        }

        Ok(user)
    }

    /// Load a user by email, reading through the profile cache.
    ///
    /// Cache failures fall back to the store.
    pub async fn load_user_cached(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        let key = user_cache_key(email);

        match self.cache.get::<User>(&key).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read cache entry {}: {:#}", key, e),
        }

        let user = self.users.get_by_email(email).await?;
        if let Some(ref user) = user {
            if let Err(e) = self.cache.set(&key, user, self.cache.default_ttl()).await {
                tracing::warn!("Failed to fill cache entry {}: {:#}", key, e);
            }
        }

        Ok(user)
    }

    /// Fresh copy of the caller's own account. Drops the caller's cache entry.
    pub async fn read_me(&self, user: &User) -> Result<User, UserServiceError> {
        invalidate_quietly(self.cache.as_ref(), &user.cache_key()).await;

        self.users
            .get_by_id(user.id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(user.username.clone()))
    }

    /// Change the caller's username and/or avatar.
    pub async fn edit_profile(
        &self,
        user: &User,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let username = match input.username {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(UserServiceError::ValidationError(
                        "Username cannot be empty".to_string(),
                    ));
                }
                if name != user.username && self.users.get_by_username(&name).await?.is_some() {
                    return Err(UserServiceError::Conflict(format!(
                        "Username '{}' is already taken",
                        name
                    )));
                }
                name
            }
            None => user.username.clone(),
        };
        let avatar = input.avatar.or_else(|| user.avatar.clone());

        let updated = match self
            .users
            .update_profile(user.id, &username, avatar.as_deref())
            .await
        {
            Ok(updated) => updated,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::Conflict(format!(
                    "Username '{}' is already taken",
                    username
                )))
            }
            Err(e) => return Err(UserServiceError::StorageError(e)),
        };

        invalidate_quietly(self.cache.as_ref(), &updated.cache_key()).await;
        Ok(updated)
    }

    pub async fn list(&self, page: Pagination) -> Result<Vec<User>, UserServiceError> {
        let page = page.normalized();
        Ok(self.users.list(page.skip, page.limit).await?)
    }

    /// Profile with activity counters. Admins and moderators only.
    pub async fn get_profile(
        &self,
        actor: &User,
        username: &str,
    ) -> Result<UserProfile, UserServiceError> {
        if !actor.can_moderate() {
            return Err(UserServiceError::Forbidden(
                "Only admins and moderators can view profiles".to_string(),
            ));
        }

        let user = self
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(username.to_string()))?;

        let pictures = self.users.count_pictures(user.id).await?;
        let comments = self.comments.count_by_user(user.id).await?;

        Ok(UserProfile::new(user, pictures, comments))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.users.get_by_username(username).await?)
    }

    /// Mark an email address as confirmed.
    pub async fn confirm_email(&self, email: &str) -> Result<(), UserServiceError> {
        if self.users.get_by_email(email).await?.is_none() {
            return Err(UserServiceError::NotFound(email.to_string()));
        }
        self.users.confirm_email(email).await?;
        invalidate_quietly(self.cache.as_ref(), &user_cache_key(email)).await;
        Ok(())
    }

    /// Store (or clear) the user's refresh token.
    pub async fn update_token(&self, user: &User, token: Option<&str>) -> Result<(), UserServiceError> {
        self.users.update_refresh_token(user.id, token).await?;
        Ok(())
    }

    /// Replace the user's password after checking the current one.
    ///
    /// All open sessions of the user are closed.
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        if new_password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        // Cached users carry no hash, so read the stored one
        let stored = self
            .users
            .get_by_id(user.id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(user.username.clone()))?;

        let valid = self
            .hasher
            .verify(current_password, &stored.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }

        let hash = self
            .hasher
            .hash(new_password)
            .context("Failed to hash password")?;
        self.users.update_password(stored.id, &hash).await?;
        self.sessions.delete_by_email(&stored.email).await?;

        tracing::info!("User {} changed password", stored.id);
        Ok(())
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self.sessions.delete_expired().await?)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self.users.get_by_username(username_or_email).await? {
            return Ok(Some(user));
        }

        Ok(self.users.get_by_email(username_or_email).await?)
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    if input.username.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }

    if input.email.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email cannot be empty".to_string(),
        ));
    }

    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }

    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }

    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}
