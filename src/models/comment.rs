//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment on a picture. Flat, no replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub picture_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a comment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub picture_id: i64,
    pub body: String,
}

/// Input for editing a comment
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCommentInput {
    pub body: String,
}
