//! Embedded schema migrations
//!
//! Every migration carries SQL for both backends and is recorded in the
//! `_migrations` table once applied. Store-level invariants live here:
//! unique emails, usernames and tag names, one rating per (user, picture),
//! rating values within 1..=5 and one row per revoked token.

use anyhow::{Context, Result};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A schema migration with SQL for SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                is_active BOOLEAN NOT NULL DEFAULT 1,
                confirmed BOOLEAN NOT NULL DEFAULT 0,
                avatar VARCHAR(255),
                refresh_token VARCHAR(255),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                avatar VARCHAR(255),
                refresh_token VARCHAR(255),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token VARCHAR(64) PRIMARY KEY,
                email VARCHAR(255) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (email) REFERENCES users(email) ON DELETE CASCADE ON UPDATE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_email ON sessions(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token VARCHAR(64) PRIMARY KEY,
                email VARCHAR(255) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (email) REFERENCES users(email) ON DELETE CASCADE ON UPDATE CASCADE
            );
            CREATE INDEX idx_sessions_email ON sessions(email);
        "#,
    },
    Migration {
        version: 3,
        name: "create_revoked_tokens",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS revoked_tokens (
                token VARCHAR(512) PRIMARY KEY,
                revoked_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS revoked_tokens (
                token VARCHAR(512) PRIMARY KEY,
                revoked_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_pictures",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS pictures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                url VARCHAR(255) NOT NULL,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_pictures_user_id ON pictures(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS pictures (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                url VARCHAR(255) NOT NULL,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_pictures_user_id ON pictures(user_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_comments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                picture_id INTEGER NOT NULL,
                body TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_comments_user_id ON comments(user_id);
            CREATE INDEX IF NOT EXISTS idx_comments_picture_id ON comments(picture_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                picture_id BIGINT NOT NULL,
                body TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_comments_user_id ON comments(user_id);
            CREATE INDEX idx_comments_picture_id ON comments(picture_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_ratings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                picture_id INTEGER NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, picture_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_ratings_picture_id ON ratings(picture_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS ratings (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                picture_id BIGINT NOT NULL,
                rating INT NOT NULL CHECK (rating BETWEEN 1 AND 5),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_ratings_user_picture (user_id, picture_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_ratings_picture_id ON ratings(picture_id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(25) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(25) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
];

/// Apply every pending migration, returning how many were applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;
    let mut count = 0;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<Vec<i32>> {
    let versions = match (pool.as_sqlite(), pool.as_mysql()) {
        (Some(sqlite), _) => applied_versions_sqlite(sqlite).await?,
        (None, Some(mysql)) => applied_versions_mysql(mysql).await?,
        (None, None) => anyhow::bail!("Database pool exposes no backend"),
    };
    Ok(versions)
}

async fn applied_versions_sqlite(pool: &SqlitePool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("version") as i32).collect())
}

async fn applied_versions_mysql(pool: &MySqlPool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i32, _>("version")).collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    let record = format!(
        "INSERT INTO _migrations (version, name) VALUES ({}, '{}')",
        migration.version, migration.name
    );
    pool.execute(&record).await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a migration body into statements, dropping empty and comment-only ones.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool, id: i64) {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash) VALUES (?, ?, ?, 'hash')",
        )
        .bind(id)
        .bind(format!("user{}", id))
        .bind(format!("user{}@example.com", id))
        .execute(pool)
        .await
        .expect("Failed to insert user");
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        let first = run_migrations(&pool).await.unwrap();
        let second = run_migrations(&pool).await.unwrap();

        assert_eq!(first, MIGRATIONS.len());
        assert_eq!(second, 0);
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_user_defaults() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        insert_user(sqlite, 1).await;

        let row = sqlx::query("SELECT role, is_active, confirmed FROM users WHERE id = 1")
            .fetch_one(sqlite)
            .await
            .unwrap();

        assert_eq!(row.get::<String, _>("role"), "user");
        assert!(row.get::<bool, _>("is_active"));
        assert!(!row.get::<bool, _>("confirmed"));
    }

    #[tokio::test]
    async fn test_rating_unique_per_user_and_picture() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        insert_user(sqlite, 7).await;

        let insert = "INSERT INTO ratings (user_id, picture_id, rating) VALUES (7, 3, ?)";
        sqlx::query(insert).bind(4).execute(sqlite).await.unwrap();

        let duplicate = sqlx::query(insert).bind(2).execute(sqlite).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_rating_value_range_checked() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        insert_user(sqlite, 1).await;

        for value in [0, 6] {
            let result = sqlx::query(
                "INSERT INTO ratings (user_id, picture_id, rating) VALUES (1, 1, ?)",
            )
            .bind(value)
            .execute(sqlite)
            .await;
            assert!(result.is_err(), "rating {} should be rejected", value);
        }
    }

    #[tokio::test]
    async fn test_revoked_token_unique() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();

        let insert = "INSERT INTO revoked_tokens (token) VALUES ('abc')";
        sqlx::query(insert).execute(sqlite).await.unwrap();
        assert!(sqlx::query(insert).execute(sqlite).await.is_err());
    }

    #[tokio::test]
    async fn test_tag_name_unique() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();

        let insert = "INSERT INTO tags (name) VALUES ('sunset')";
        sqlx::query(insert).execute(sqlite).await.unwrap();
        assert!(sqlx::query(insert).execute(sqlite).await.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- note\n;\nCREATE INDEX i ON a(id);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- just a comment\n  -- another"));
        assert!(!is_comment_only("-- comment\nSELECT 1"));
    }
}
