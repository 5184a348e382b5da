//! User model
//!
//! A user carries exactly one role and an activity flag. The activity flag is
//! the moderation state: `is_active == false` means the account is banned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique, may be changed by its owner)
    pub username: String,
    /// Email address (unique); also the cache identity of the user
    pub email: String,
    /// Password hash (argon2). Never serialized, so cached copies carry none.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    /// `false` once the account has been banned
    pub is_active: bool,
    /// Email address confirmed
    pub confirmed: bool,
    /// Avatar URL
    pub avatar: Option<String>,
    /// Current refresh token, if any
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, active and unconfirmed user.
    ///
    /// The password must already be hashed, see `services::password::hash_password()`.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            password_hash,
            role,
            is_active: true,
            confirmed: false,
            avatar: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> UserStatus {
        if self.is_active {
            UserStatus::Active
        } else {
            UserStatus::Banned
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Admins and moderators may ban users and delete other people's content
    pub fn can_moderate(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Moderator)
    }

    pub fn is_banned(&self) -> bool {
        !self.is_active
    }

    /// Key of this user's entry in the profile cache
    pub fn cache_key(&self) -> String {
        user_cache_key(&self.email)
    }
}

/// Cache key for the user identified by `email`
pub fn user_cache_key(email: &str) -> String {
    format!("user:{}", email)
}

/// Role of a user, ordered `admin > moderator > user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Moderator,
    #[default]
    User,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Moderator => write!(f, "moderator"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "moderator" => Ok(UserRole::Moderator),
            "user" => Ok(UserRole::User),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Moderation state derived from `User::is_active`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Banned,
}

impl UserStatus {
    /// Value of the `is_active` column for this state
    pub fn is_active(self) -> bool {
        self == UserStatus::Active
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Banned => write!(f, "banned"),
        }
    }
}

/// Public view of a user with activity counters
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub pictures_count: i64,
    pub comments_count: i64,
}

impl UserProfile {
    pub fn new(user: User, pictures_count: i64, comments_count: i64) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            avatar: user.avatar,
            created_at: user.created_at,
            pictures_count,
            comments_count,
        }
    }
}

/// Fields a user may change on their own account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub avatar: Option<String>,
}
