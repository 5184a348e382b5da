//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login session: an opaque bearer token bound to a user's email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token
    pub token: String,
    /// Email of the user the token was issued to
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let mut session = Session {
            token: "t".to_string(),
            email: "a@example.com".to_string(),
            expires_at: now + Duration::hours(1),
            created_at: now,
        };
        assert!(!session.is_expired());

        session.expires_at = now - Duration::seconds(1);
        assert!(session.is_expired());
    }
}
