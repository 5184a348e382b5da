//! Data models
//!
//! Entities persisted in the store (User, Session, RevokedToken, Rating,
//! Comment, Tag) plus the input and view types built from them.

mod comment;
mod rating;
mod revoked_token;
mod session;
mod tag;
mod user;

pub use comment::{Comment, CreateCommentInput, UpdateCommentInput};
pub use rating::{is_valid_rating, Rating, RatingSummary, MAX_RATING, MIN_RATING};
pub use revoked_token::RevokedToken;
pub use session::Session;
pub use tag::{Tag, TagInput, MAX_TAG_LENGTH};
pub use user::{user_cache_key, UpdateProfileInput, User, UserProfile, UserRole, UserStatus};

/// Offset pagination shared by list endpoints
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

fn default_limit() -> i64 {
    10
}

impl Pagination {
    /// Clamp to a non-negative offset and a limit within 1..=100
    pub fn normalized(self) -> Self {
        Self {
            skip: self.skip.max(0),
            limit: self.limit.clamp(1, 100),
        }
    }
}
