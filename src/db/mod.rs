//! Database layer
//!
//! The entity store behind every core component. SQLite is the default
//! backend; MySQL is selected through `database.driver`.
//!
//! Uniqueness is enforced by the schema (see `migrations`), not by the
//! services: a rejected insert surfaces as a unique violation, which
//! [`is_unique_violation`] recognises through any `anyhow` context layers.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// Whether an error was caused by a store-level uniqueness constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[tokio::test]
    async fn test_is_unique_violation_through_context() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE labels (name TEXT NOT NULL UNIQUE)")
            .await
            .unwrap();

        let sqlite = pool.as_sqlite().unwrap();
        sqlx::query("INSERT INTO labels (name) VALUES ('a')")
            .execute(sqlite)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO labels (name) VALUES ('a')")
            .execute(sqlite)
            .await
            .context("Failed to insert label")
            .unwrap_err();

        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&anyhow::anyhow!("unrelated")));
    }
}
