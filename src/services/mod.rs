//! Services layer - Business logic
//!
//! Services are responsible for:
//! - Implementing business rules and permission checks
//! - Coordinating between repositories and the cache
//! - Translating store rejections into typed errors

pub mod comment;
pub mod moderation;
pub mod password;
pub mod rating;
pub mod revocation;
pub mod tag;
pub mod user;

pub use comment::{CommentService, CommentServiceError};
pub use moderation::{ModerationAction, ModerationError, ModerationOutcome, ModerationService};
pub use password::{hash_password, verify_password, Argon2Hasher, CredentialHasher};
pub use rating::{RatingError, RatingService};
pub use revocation::{RevocationError, TokenRevocationRegistry};
pub use tag::{TagService, TagServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
