//! Revoked token model

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A token that must no longer be accepted. Written once, never updated.
#[derive(Debug, Clone, Serialize)]
pub struct RevokedToken {
    pub token: String,
    pub revoked_at: DateTime<Utc>,
}
