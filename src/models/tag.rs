//! Tag model
//!
//! Tags label pictures. Names are unique across the whole service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted tag name, in characters
pub const MAX_TAG_LENGTH: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    /// Unique tag name
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Body of tag create and rename requests
#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    pub name: String,
}

impl TagInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
