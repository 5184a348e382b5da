//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a specific entity.

pub mod comment;
pub mod rating;
pub mod revoked_token;
pub mod session;
pub mod tag;
pub mod user;

pub use comment::{CommentRepository, SqlxCommentRepository};
pub use rating::{RatingRepository, SqlxRatingRepository};
pub use revoked_token::{RevokedTokenRepository, SqlxRevokedTokenRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
