//! Revoked token repository
//!
//! Append-only storage of revoked tokens. The token is the primary key, so a
//! second insert of the same token fails with a unique violation.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::RevokedToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait RevokedTokenRepository: Send + Sync {
    /// Record a token as revoked
    async fn insert(&self, token: &str) -> Result<RevokedToken>;

    /// Whether the token has been recorded
    async fn exists(&self, token: &str) -> Result<bool>;
}

pub struct SqlxRevokedTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxRevokedTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RevokedTokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RevokedTokenRepository for SqlxRevokedTokenRepository {
    async fn insert(&self, token: &str) -> Result<RevokedToken> {
        let revoked_at = Utc::now();
        let sql = "INSERT INTO revoked_tokens (token, revoked_at) VALUES (?, ?)";

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(token)
                    .bind(revoked_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to insert revoked token")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(token)
                    .bind(revoked_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to insert revoked token")?;
            }
        }

        Ok(RevokedToken {
            token: token.to_string(),
            revoked_at,
        })
    }

    async fn exists(&self, token: &str) -> Result<bool> {
        let sql = "SELECT 1 FROM revoked_tokens WHERE token = ?";
        let found = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(token)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to look up revoked token")?
                .is_some(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(token)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to look up revoked token")?
                .is_some(),
        };
        Ok(found)
    }
}
