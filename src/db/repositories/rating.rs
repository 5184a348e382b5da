//! Rating repository
//!
//! Database operations for picture ratings.
//!
//! This module provides:
//! - `RatingRepository` trait defining the interface for rating data access
//! - `SqlxRatingRepository` implementing the trait for SQLite and MySQL
//!
//! The `ratings` table rejects a second row for the same (user, picture) and
//! any value outside 1..=5.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Rating, RatingSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Rating repository trait
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Store a new rating
    async fn create(&self, user_id: i64, picture_id: i64, value: i32) -> Result<Rating>;

    /// Rating given by a user to a picture
    async fn get(&self, user_id: i64, picture_id: i64) -> Result<Option<Rating>>;

    /// All ratings of a picture, oldest first
    async fn list_by_picture(&self, picture_id: i64) -> Result<Vec<Rating>>;

    /// Sum and count of a picture's ratings
    async fn summary(&self, picture_id: i64) -> Result<RatingSummary>;

    /// Delete a rating, returning it if it existed
    async fn delete(&self, user_id: i64, picture_id: i64) -> Result<Option<Rating>>;
}

/// SQLx-based rating repository implementation
pub struct SqlxRatingRepository {
    pool: DynDatabasePool,
}

impl SqlxRatingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RatingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RatingRepository for SqlxRatingRepository {
    async fn create(&self, user_id: i64, picture_id: i64, value: i32) -> Result<Rating> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_rating_sqlite(self.pool.sqlite()?, user_id, picture_id, value).await
            }
            DatabaseDriver::Mysql => {
                create_rating_mysql(self.pool.mysql()?, user_id, picture_id, value).await
            }
        }
    }

    async fn get(&self, user_id: i64, picture_id: i64) -> Result<Option<Rating>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_rating_sqlite(self.pool.sqlite()?, user_id, picture_id).await,
            DatabaseDriver::Mysql => get_rating_mysql(self.pool.mysql()?, user_id, picture_id).await,
        }
    }

    async fn list_by_picture(&self, picture_id: i64) -> Result<Vec<Rating>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_ratings_sqlite(self.pool.sqlite()?, picture_id).await,
            DatabaseDriver::Mysql => list_ratings_mysql(self.pool.mysql()?, picture_id).await,
        }
    }

    async fn summary(&self, picture_id: i64) -> Result<RatingSummary> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => rating_summary_sqlite(self.pool.sqlite()?, picture_id).await,
            DatabaseDriver::Mysql => rating_summary_mysql(self.pool.mysql()?, picture_id).await,
        }
    }

    async fn delete(&self, user_id: i64, picture_id: i64) -> Result<Option<Rating>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_rating_sqlite(self.pool.sqlite()?, user_id, picture_id).await
            }
            DatabaseDriver::Mysql => {
                delete_rating_mysql(self.pool.mysql()?, user_id, picture_id).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_rating_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    picture_id: i64,
    value: i32,
) -> Result<Rating> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO ratings (user_id, picture_id, rating, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(picture_id)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create rating")?;

    Ok(Rating {
        id: result.last_insert_rowid(),
        user_id,
        picture_id,
        rating: value,
        created_at: now,
    })
}

async fn get_rating_sqlite(pool: &SqlitePool, user_id: i64, picture_id: i64) -> Result<Option<Rating>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, picture_id, rating, created_at
        FROM ratings
        WHERE user_id = ? AND picture_id = ?
        "#,
    )
    .bind(user_id)
    .bind(picture_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get rating")?;

    Ok(row.as_ref().map(row_to_rating_sqlite))
}

async fn list_ratings_sqlite(pool: &SqlitePool, picture_id: i64) -> Result<Vec<Rating>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, picture_id, rating, created_at
        FROM ratings
        WHERE picture_id = ?
        ORDER BY id
        "#,
    )
    .bind(picture_id)
    .fetch_all(pool)
    .await
    .context("Failed to list ratings")?;

    Ok(rows.iter().map(row_to_rating_sqlite).collect())
}

async fn rating_summary_sqlite(pool: &SqlitePool, picture_id: i64) -> Result<RatingSummary> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(rating), 0) as total, COUNT(*) as count
        FROM ratings
        WHERE picture_id = ?
        "#,
    )
    .bind(picture_id)
    .fetch_one(pool)
    .await
    .context("Failed to aggregate ratings")?;

    Ok(RatingSummary::from_totals(row.get("total"), row.get("count")))
}

async fn delete_rating_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    picture_id: i64,
) -> Result<Option<Rating>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let existing = sqlx::query(
        "SELECT id, user_id, picture_id, rating, created_at FROM ratings WHERE user_id = ? AND picture_id = ?",
    )
    .bind(user_id)
    .bind(picture_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to get rating")?
    .as_ref()
    .map(row_to_rating_sqlite);

    let Some(rating) = existing else {
        tx.rollback().await.context("Failed to roll back rating delete")?;
        return Ok(None);
    };

    sqlx::query("DELETE FROM ratings WHERE id = ?")
        .bind(rating.id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete rating")?;

    tx.commit().await.context("Failed to commit rating delete")?;
    Ok(Some(rating))
}

fn row_to_rating_sqlite(row: &sqlx::sqlite::SqliteRow) -> Rating {
    Rating {
        id: row.get("id"),
        user_id: row.get("user_id"),
        picture_id: row.get("picture_id"),
        rating: row.get("rating"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_rating_mysql(
    pool: &MySqlPool,
    user_id: i64,
    picture_id: i64,
    value: i32,
) -> Result<Rating> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO ratings (user_id, picture_id, rating, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(picture_id)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create rating")?;

    Ok(Rating {
        id: result.last_insert_id() as i64,
        user_id,
        picture_id,
        rating: value,
        created_at: now,
    })
}

async fn get_rating_mysql(pool: &MySqlPool, user_id: i64, picture_id: i64) -> Result<Option<Rating>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, picture_id, rating, created_at
        FROM ratings
        WHERE user_id = ? AND picture_id = ?
        "#,
    )
    .bind(user_id)
    .bind(picture_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get rating")?;

    Ok(row.as_ref().map(row_to_rating_mysql))
}

async fn list_ratings_mysql(pool: &MySqlPool, picture_id: i64) -> Result<Vec<Rating>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, picture_id, rating, created_at
        FROM ratings
        WHERE picture_id = ?
        ORDER BY id
        "#,
    )
    .bind(picture_id)
    .fetch_all(pool)
    .await
    .context("Failed to list ratings")?;

    Ok(rows.iter().map(row_to_rating_mysql).collect())
}

async fn rating_summary_mysql(pool: &MySqlPool, picture_id: i64) -> Result<RatingSummary> {
    // SUM yields DECIMAL on MySQL
    let row = sqlx::query(
        r#"
        SELECT CAST(COALESCE(SUM(rating), 0) AS SIGNED) as total, COUNT(*) as count
        FROM ratings
        WHERE picture_id = ?
        "#,
    )
    .bind(picture_id)
    .fetch_one(pool)
    .await
    .context("Failed to aggregate ratings")?;

    Ok(RatingSummary::from_totals(row.get("total"), row.get("count")))
}

async fn delete_rating_mysql(
    pool: &MySqlPool,
    user_id: i64,
    picture_id: i64,
) -> Result<Option<Rating>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let existing = sqlx::query(
        "SELECT id, user_id, picture_id, rating, created_at FROM ratings WHERE user_id = ? AND picture_id = ? FOR UPDATE",
    )
    .bind(user_id)
    .bind(picture_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to get rating")?
    .as_ref()
    .map(row_to_rating_mysql);

    let Some(rating) = existing else {
        tx.rollback().await.context("Failed to roll back rating delete")?;
        return Ok(None);
    };

    sqlx::query("DELETE FROM ratings WHERE id = ?")
        .bind(rating.id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete rating")?;

    tx.commit().await.context("Failed to commit rating delete")?;
    Ok(Some(rating))
}

fn row_to_rating_mysql(row: &sqlx::mysql::MySqlRow) -> Rating {
    Rating {
        id: row.get("id"),
        user_id: row.get("user_id"),
        picture_id: row.get("picture_id"),
        rating: row.get("rating"),
        created_at: row.get("created_at"),
    }
}
