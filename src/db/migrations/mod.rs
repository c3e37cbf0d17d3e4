//! Forward-only schema migrations.
//!
//! Each step is a SQL file named `NN_<what>.sql`, applied in order. `schema_version` holds a
//! single row with the number of steps applied so far.

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::{debug, info};

use crate::error::Res;

/// Schema steps in the order they must be applied. Step `n` brings the schema to version `n + 1`.
const STEPS: &[&str] = &[include_str!("01_budgets_and_transactions.sql")];

/// The schema version a fully migrated database is at.
pub(crate) fn latest_version() -> i32 {
    i32::try_from(STEPS.len()).unwrap_or(i32::MAX)
}

/// Reads the schema version, treating a database without a `schema_version` table as version 0.
pub(crate) async fn current_version(pool: &SqlitePool) -> Res<i32> {
    let (tables,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
    )
    .fetch_one(pool)
    .await
    .context("Failed to look for the schema_version table")?;
    if tables == 0 {
        return Ok(0);
    }
    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to query schema version")?;
    Ok(version.unwrap_or(0))
}

/// Applies every step the database has not seen yet and returns the resulting version.
///
/// Each step runs in its own SQL transaction together with the version bump, so a failed step
/// leaves the database at the last good version. A database written by a newer build is refused.
pub(crate) async fn upgrade(pool: &SqlitePool) -> Res<i32> {
    pool.execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .await
        .context("Failed to create schema_version table")?;

    let from = current_version(pool).await?;
    let latest = latest_version();
    if from > latest {
        bail!("Database schema version {from} is newer than this build supports ({latest})");
    }
    if from == latest {
        debug!("Database schema is current at version {latest}");
        return Ok(latest);
    }

    for (ix, sql) in STEPS.iter().enumerate().skip(usize::try_from(from).unwrap_or(0)) {
        let version = i32::try_from(ix + 1).unwrap_or(i32::MAX);
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin migration transaction")?;
        tx.execute(*sql)
            .await
            .with_context(|| format!("Failed to apply schema step {version:02}"))?;
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut *tx)
            .await
            .context("Failed to clear schema_version")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?1)")
            .bind(version)
            .execute(&mut *tx)
            .await
            .context("Failed to record schema version")?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit schema step {version:02}"))?;
        debug!("Applied schema step {version:02}");
    }

    info!("Upgraded database schema from version {from} to {latest}");
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn tables(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_as::<_, (String,)>(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|(name,)| name)
        .collect()
    }

    #[tokio::test]
    async fn test_upgrade_fresh_database() {
        let pool = memory_pool().await;
        assert_eq!(current_version(&pool).await.unwrap(), 0);
        assert_eq!(upgrade(&pool).await.unwrap(), latest_version());
        assert_eq!(current_version(&pool).await.unwrap(), latest_version());
        assert_eq!(
            tables(&pool).await,
            vec!["budgets", "schema_version", "transactions"]
        );
    }

    #[tokio::test]
    async fn test_upgrade_is_idempotent() {
        let pool = memory_pool().await;
        upgrade(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO transactions (id, owner_id, date, amount, splits) \
             VALUES ('t1', 'u1', '2025-01-01', '1.00', '[]')",
        )
        .execute(&pool)
        .await
        .unwrap();
        assert_eq!(upgrade(&pool).await.unwrap(), latest_version());
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_upgrade_refuses_newer_schema() {
        let pool = memory_pool().await;
        upgrade(&pool).await.unwrap();
        sqlx::query("UPDATE schema_version SET version = ?1")
            .bind(latest_version() + 1)
            .execute(&pool)
            .await
            .unwrap();
        let err = upgrade(&pool).await.unwrap_err();
        assert!(err.to_string().contains("newer"));
    }
}
