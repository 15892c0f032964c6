//! Database migrations.
//!
//! The schema version lives in a one-row `schema_version` table. Each
//! migration step is guarded by the stored version and uses
//! `IF NOT EXISTS`, so running the set against an up-to-date database is a
//! no-op.

use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::error::{StateError, StateResult};

const SCHEMA_VERSION: i64 = 1;

fn migration_failed(e: sqlx::Error) -> StateError {
    StateError::Migration(e.to_string())
}

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> StateResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(migration_failed)?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(migration_failed)?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    Ok(())
}

/// Read the recorded schema version (0 if none).
pub async fn current_version(pool: &SqlitePool) -> StateResult<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(migration_failed)?;
    Ok(version.unwrap_or(0))
}

async fn set_version(pool: &SqlitePool, version: i64) -> StateResult<()> {
    let mut tx = pool.begin().await.map_err(migration_failed)?;
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .map_err(migration_failed)?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(migration_failed)?;
    tx.commit().await.map_err(migration_failed)?;
    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> StateResult<()> {
    info!("Running migration to schema version 1");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gauges (
            name TEXT PRIMARY KEY,
            value REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(migration_failed)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(migration_failed)?;

    set_version(pool, 1).await
}
