//! Tag repository
//!
//! Database operations for tags. `tags.name` is UNIQUE, so creating or
//! renaming onto a taken name fails with a unique violation.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, name: &str) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// List all tags ordered by name
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Rename a tag, returning the updated row if it exists
    async fn rename(&self, id: i64, name: &str) -> Result<Option<Tag>>;

    /// Delete a tag, returning whether it existed
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based tag repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Lookup key for a single tag
#[derive(Clone, Copy)]
enum TagLookup<'a> {
    Id(i64),
    Name(&'a str),
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, name: &str) -> Result<Tag> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_tag_sqlite(self.pool.sqlite()?, name).await,
            DatabaseDriver::Mysql => create_tag_mysql(self.pool.mysql()?, name).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_tag_sqlite(self.pool.sqlite()?, TagLookup::Id(id)).await,
            DatabaseDriver::Mysql => get_tag_mysql(self.pool.mysql()?, TagLookup::Id(id)).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tag_sqlite(self.pool.sqlite()?, TagLookup::Name(name)).await
            }
            DatabaseDriver::Mysql => get_tag_mysql(self.pool.mysql()?, TagLookup::Name(name)).await,
        }
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_tags_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_tags_mysql(self.pool.mysql()?).await,
        }
    }

    async fn rename(&self, id: i64, name: &str) -> Result<Option<Tag>> {
        let sql = "UPDATE tags SET name = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query(sql)
                    .bind(name)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to rename tag")?;
                get_tag_sqlite(pool, TagLookup::Id(id)).await
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query(sql)
                    .bind(name)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to rename tag")?;
                get_tag_mysql(pool, TagLookup::Id(id)).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM tags WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_tag_sqlite(pool: &SqlitePool, name: &str) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_sqlite(pool: &SqlitePool, lookup: TagLookup<'_>) -> Result<Option<Tag>> {
    let query = match lookup {
        TagLookup::Id(id) => {
            sqlx::query("SELECT id, name, created_at FROM tags WHERE id = ?").bind(id)
        }
        TagLookup::Name(name) => {
            sqlx::query("SELECT id, name, created_at FROM tags WHERE name = ?").bind(name)
        }
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get tag")?;

    Ok(row.as_ref().map(row_to_tag_sqlite))
}

async fn list_tags_sqlite(pool: &SqlitePool) -> Result<Vec<Tag>> {
    let rows = sqlx::query("SELECT id, name, created_at FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    Ok(rows.iter().map(row_to_tag_sqlite).collect())
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_tag_mysql(pool: &MySqlPool, name: &str) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_id() as i64,
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_mysql(pool: &MySqlPool, lookup: TagLookup<'_>) -> Result<Option<Tag>> {
    let query = match lookup {
        TagLookup::Id(id) => {
            sqlx::query("SELECT id, name, created_at FROM tags WHERE id = ?").bind(id)
        }
        TagLookup::Name(name) => {
            sqlx::query("SELECT id, name, created_at FROM tags WHERE name = ?").bind(name)
        }
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get tag")?;

    Ok(row.as_ref().map(row_to_tag_mysql))
}

async fn list_tags_mysql(pool: &MySqlPool) -> Result<Vec<Tag>> {
    let rows = sqlx::query("SELECT id, name, created_at FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    Ok(rows.iter().map(row_to_tag_mysql).collect())
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}
