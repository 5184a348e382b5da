//! Comment repository
//!
//! Database operations for picture comments.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Comment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, user_id: i64, picture_id: i64, body: &str) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Replace the body of a comment
    async fn update_body(&self, id: i64, body: &str) -> Result<Option<Comment>>;

    /// Delete a comment, returning whether it existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Comments on a picture, oldest first
    async fn list_by_picture(&self, picture_id: i64, skip: i64, limit: i64) -> Result<Vec<Comment>>;

    /// Comments written by a user, oldest first
    async fn list_by_user(&self, user_id: i64, skip: i64, limit: i64) -> Result<Vec<Comment>>;

    async fn count_by_user(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Filter column for paged comment listings
#[derive(Clone, Copy)]
enum CommentOwner {
    Picture,
    User,
}

impl CommentOwner {
    fn column(self) -> &'static str {
        match self {
            CommentOwner::Picture => "picture_id",
            CommentOwner::User => "user_id",
        }
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, user_id: i64, picture_id: i64, body: &str) -> Result<Comment> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_comment_sqlite(self.pool.sqlite()?, user_id, picture_id, body).await
            }
            DatabaseDriver::Mysql => {
                create_comment_mysql(self.pool.mysql()?, user_id, picture_id, body).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_comment_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_comment_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn update_body(&self, id: i64, body: &str) -> Result<Option<Comment>> {
        let sql = "UPDATE comments SET body = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query(sql)
                    .bind(body)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update comment")?;
                get_comment_sqlite(pool, id).await
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query(sql)
                    .bind(body)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update comment")?;
                get_comment_mysql(pool, id).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_picture(&self, picture_id: i64, skip: i64, limit: i64) -> Result<Vec<Comment>> {
        self.list_by(CommentOwner::Picture, picture_id, skip, limit).await
    }

    async fn list_by_user(&self, user_id: i64, skip: i64, limit: i64) -> Result<Vec<Comment>> {
        self.list_by(CommentOwner::User, user_id, skip, limit).await
    }

    async fn count_by_user(&self, user_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM comments WHERE user_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count comments")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count comments")?
                .get("count"),
        };
        Ok(count)
    }
}

impl SqlxCommentRepository {
    async fn list_by(
        &self,
        owner: CommentOwner,
        owner_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Comment>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_comments_sqlite(self.pool.sqlite()?, owner, owner_id, skip, limit).await
            }
            DatabaseDriver::Mysql => {
                list_comments_mysql(self.pool.mysql()?, owner, owner_id, skip, limit).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_comment_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    picture_id: i64,
    body: &str,
) -> Result<Comment> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO comments (user_id, picture_id, body, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(picture_id)
    .bind(body)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_rowid(),
        user_id,
        picture_id,
        body: body.to_string(),
        created_at: now,
        updated_at: now,
    })
}

async fn get_comment_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query(
        "SELECT id, user_id, picture_id, body, created_at, updated_at FROM comments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get comment")?;

    Ok(row.as_ref().map(row_to_comment_sqlite))
}

async fn list_comments_sqlite(
    pool: &SqlitePool,
    owner: CommentOwner,
    owner_id: i64,
    skip: i64,
    limit: i64,
) -> Result<Vec<Comment>> {
    let sql = format!(
        "SELECT id, user_id, picture_id, body, created_at, updated_at FROM comments \
         WHERE {} = ? ORDER BY id LIMIT ? OFFSET ?",
        owner.column()
    );
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    Ok(rows.iter().map(row_to_comment_sqlite).collect())
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        picture_id: row.get("picture_id"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_comment_mysql(
    pool: &MySqlPool,
    user_id: i64,
    picture_id: i64,
    body: &str,
) -> Result<Comment> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO comments (user_id, picture_id, body, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(picture_id)
    .bind(body)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_id() as i64,
        user_id,
        picture_id,
        body: body.to_string(),
        created_at: now,
        updated_at: now,
    })
}

async fn get_comment_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query(
        "SELECT id, user_id, picture_id, body, created_at, updated_at FROM comments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get comment")?;

    Ok(row.as_ref().map(row_to_comment_mysql))
}

async fn list_comments_mysql(
    pool: &MySqlPool,
    owner: CommentOwner,
    owner_id: i64,
    skip: i64,
    limit: i64,
) -> Result<Vec<Comment>> {
    let sql = format!(
        "SELECT id, user_id, picture_id, body, created_at, updated_at FROM comments \
         WHERE {} = ? ORDER BY id LIMIT ? OFFSET ?",
        owner.column()
    );
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    Ok(rows.iter().map(row_to_comment_mysql).collect())
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    Comment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        picture_id: row.get("picture_id"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
