//! Token revocation registry
//!
//! Remembers tokens that must be rejected even though they were validly
//! issued (logged-out sessions, invalidated refresh tokens). Entries are
//! never removed.

use crate::db::is_unique_violation;
use crate::db::repositories::RevokedTokenRepository;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    /// The token was already revoked
    #[error("Token already revoked")]
    Conflict,

    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

/// Registry of revoked tokens backed by the entity store
pub struct TokenRevocationRegistry {
    repo: Arc<dyn RevokedTokenRepository>,
}

impl TokenRevocationRegistry {
    pub fn new(repo: Arc<dyn RevokedTokenRepository>) -> Self {
        Self { repo }
    }

    /// Revoke a token.
    ///
    /// Revoking a token twice yields `Conflict`; the first record stays.
    pub async fn revoke(&self, token: &str) -> Result<(), RevocationError> {
        match self.repo.insert(token).await {
            Ok(_) => {
                tracing::debug!("Token revoked");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(RevocationError::Conflict),
            Err(e) => Err(RevocationError::StorageError(e)),
        }
    }

    /// Whether `token` has been revoked. Unknown tokens are simply not revoked.
    pub async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        Ok(self.repo.exists(token).await?)
    }
}
