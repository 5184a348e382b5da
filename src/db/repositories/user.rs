//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL
//!
//! Moderation writes (`transition_status`, `set_role`) run in their own
//! transaction. `transition_status` is conditional on the current state, so
//! of two concurrent bans only one reports a change.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_active, confirmed, \
     avatar, refresh_token, created_at, updated_at";

/// Column a single user is looked up by
#[derive(Clone, Copy)]
enum UserLookup<'a> {
    Id(i64),
    Username(&'a str),
    Email(&'a str),
}

impl UserLookup<'_> {
    fn column(&self) -> &'static str {
        match self {
            UserLookup::Id(_) => "id",
            UserLookup::Username(_) => "username",
            UserLookup::Email(_) => "email",
        }
    }
}

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// List users, oldest account first
    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<User>>;

    /// Change username and avatar of a user
    async fn update_profile(&self, id: i64, username: &str, avatar: Option<&str>) -> Result<User>;

    /// Move a user from `from` to `to`.
    ///
    /// Returns `false` without writing when the user is not in state `from`.
    async fn transition_status(&self, id: i64, from: UserStatus, to: UserStatus) -> Result<bool>;

    /// Replace the role of a user. Returns `false` if no such user exists.
    async fn set_role(&self, id: i64, role: UserRole) -> Result<bool>;

    /// Mark the email address as confirmed
    async fn confirm_email(&self, email: &str) -> Result<()>;

    async fn update_refresh_token(&self, id: i64, token: Option<&str>) -> Result<()>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    /// Number of pictures uploaded by a user
    async fn count_pictures(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_sqlite(self.pool.sqlite()?, UserLookup::Id(id)).await,
            DatabaseDriver::Mysql => get_user_mysql(self.pool.mysql()?, UserLookup::Id(id)).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_sqlite(self.pool.sqlite()?, UserLookup::Username(username)).await
            }
            DatabaseDriver::Mysql => get_user_mysql(self.pool.mysql()?, UserLookup::Username(username)).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_sqlite(self.pool.sqlite()?, UserLookup::Email(email)).await,
            DatabaseDriver::Mysql => get_user_mysql(self.pool.mysql()?, UserLookup::Email(email)).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?).await,
        }
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?, skip, limit).await,
            DatabaseDriver::Mysql => list_users_mysql(self.pool.mysql()?, skip, limit).await,
        }
    }

    async fn update_profile(&self, id: i64, username: &str, avatar: Option<&str>) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_profile_sqlite(self.pool.sqlite()?, id, username, avatar).await
            }
            DatabaseDriver::Mysql => {
                update_profile_mysql(self.pool.mysql()?, id, username, avatar).await
            }
        }
    }

    async fn transition_status(&self, id: i64, from: UserStatus, to: UserStatus) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                transition_status_sqlite(self.pool.sqlite()?, id, from, to).await
            }
            DatabaseDriver::Mysql => transition_status_mysql(self.pool.mysql()?, id, from, to).await,
        }
    }

    async fn set_role(&self, id: i64, role: UserRole) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => set_role_sqlite(self.pool.sqlite()?, id, role).await,
            DatabaseDriver::Mysql => set_role_mysql(self.pool.mysql()?, id, role).await,
        }
    }

    async fn confirm_email(&self, email: &str) -> Result<()> {
        let sql = "UPDATE users SET confirmed = ?, updated_at = ? WHERE email = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(true)
                    .bind(Utc::now())
                    .bind(email)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to confirm email")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(true)
                    .bind(Utc::now())
                    .bind(email)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to confirm email")?;
            }
        }
        Ok(())
    }

    async fn update_refresh_token(&self, id: i64, token: Option<&str>) -> Result<()> {
        let sql = "UPDATE users SET refresh_token = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(token)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update refresh token")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(token)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update refresh token")?;
            }
        }
        Ok(())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let sql = "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update password")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update password")?;
            }
        }
        Ok(())
    }

    async fn count_pictures(&self, user_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM pictures WHERE user_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count pictures")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count pictures")?
                .get("count"),
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, is_active, confirmed, avatar, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.is_active)
    .bind(user.confirmed)
    .bind(&user.avatar)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_sqlite(pool: &SqlitePool, lookup: UserLookup<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, lookup.column());
    let query = sqlx::query(&sql);
    let query = match lookup {
        UserLookup::Id(id) => query.bind(id),
        UserLookup::Username(value) | UserLookup::Email(value) => query.bind(value),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", lookup.column()))?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_sqlite(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", USER_COLUMNS);
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

async fn update_profile_sqlite(
    pool: &SqlitePool,
    id: i64,
    username: &str,
    avatar: Option<&str>,
) -> Result<User> {
    sqlx::query("UPDATE users SET username = ?, avatar = ?, updated_at = ? WHERE id = ?")
        .bind(username)
        .bind(avatar)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update user profile")?;

    get_user_sqlite(pool, UserLookup::Id(id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn transition_status_sqlite(
    pool: &SqlitePool,
    id: i64,
    from: UserStatus,
    to: UserStatus,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        "UPDATE users SET is_active = ?, updated_at = ? WHERE id = ? AND is_active = ?",
    )
    .bind(to.is_active())
    .bind(Utc::now())
    .bind(id)
    .bind(from.is_active())
    .execute(&mut *tx)
    .await;

    match result {
        Ok(done) if done.rows_affected() > 0 => {
            tx.commit().await.context("Failed to commit status change")?;
            Ok(true)
        }
        Ok(_) => {
            tx.rollback().await.context("Failed to roll back status change")?;
            Ok(false)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback after failed status change failed: {}", rollback_err);
            }
            Err(e).context("Failed to update user status")
        }
    }
}

async fn set_role_sqlite(pool: &SqlitePool, id: i64, role: UserRole) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await;

    match result {
        Ok(done) => {
            tx.commit().await.context("Failed to commit role change")?;
            Ok(done.rows_affected() > 0)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback after failed role change failed: {}", rollback_err);
            }
            Err(e).context("Failed to update user role")
        }
    }
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        is_active: row.get("is_active"),
        confirmed: row.get("confirmed"),
        avatar: row.get("avatar"),
        refresh_token: row.get("refresh_token"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, is_active, confirmed, avatar, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.is_active)
    .bind(user.confirmed)
    .bind(&user.avatar)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_mysql(pool: &MySqlPool, lookup: UserLookup<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, lookup.column());
    let query = sqlx::query(&sql);
    let query = match lookup {
        UserLookup::Id(id) => query.bind(id),
        UserLookup::Username(value) | UserLookup::Email(value) => query.bind(value),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", lookup.column()))?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_mysql(pool: &MySqlPool, skip: i64, limit: i64) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", USER_COLUMNS);
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_mysql).collect()
}

async fn update_profile_mysql(
    pool: &MySqlPool,
    id: i64,
    username: &str,
    avatar: Option<&str>,
) -> Result<User> {
    sqlx::query("UPDATE users SET username = ?, avatar = ?, updated_at = ? WHERE id = ?")
        .bind(username)
        .bind(avatar)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update user profile")?;

    get_user_mysql(pool, UserLookup::Id(id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn transition_status_mysql(
    pool: &MySqlPool,
    id: i64,
    from: UserStatus,
    to: UserStatus,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        "UPDATE users SET is_active = ?, updated_at = ? WHERE id = ? AND is_active = ?",
    )
    .bind(to.is_active())
    .bind(Utc::now())
    .bind(id)
    .bind(from.is_active())
    .execute(&mut *tx)
    .await;

    match result {
        Ok(done) if done.rows_affected() > 0 => {
            tx.commit().await.context("Failed to commit status change")?;
            Ok(true)
        }
        Ok(_) => {
            tx.rollback().await.context("Failed to roll back status change")?;
            Ok(false)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback after failed status change failed: {}", rollback_err);
            }
            Err(e).context("Failed to update user status")
        }
    }
}

async fn set_role_mysql(pool: &MySqlPool, id: i64, role: UserRole) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // MySQL reports zero affected rows when the value is unchanged, so
    // existence is checked inside the same transaction.
    let exists = sqlx::query("SELECT id FROM users WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await;

    let result = match exists {
        Ok(Some(_)) => sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map(|_| true),
        Ok(None) => Ok(false),
        Err(e) => Err(e),
    };

    match result {
        Ok(found) => {
            tx.commit().await.context("Failed to commit role change")?;
            Ok(found)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback after failed role change failed: {}", rollback_err);
            }
            Err(e).context("Failed to update user role")
        }
    }
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        is_active: row.get("is_active"),
        confirmed: row.get("confirmed"),
        avatar: row.get("avatar"),
        refresh_token: row.get("refresh_token"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
