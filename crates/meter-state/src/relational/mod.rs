//! RelationalStore — SQLite persistence through sqlx.
//!
//! Gauges and counters live in two tables keyed by name. Single updates
//! are `INSERT ... ON CONFLICT DO UPDATE` statements; batches run inside
//! one transaction and are rolled back as a whole on any failure.
//! Migrations run at construction.

pub mod migrations;

use std::str::FromStr;

use async_trait::async_trait;
use meter_core::MetricKind;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument};

use crate::error::{StateError, StateResult};
use crate::repository::Repository;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const UPSERT_GAUGE: &str = r#"
    INSERT INTO gauges (name, value)
    VALUES (?, ?)
    ON CONFLICT(name) DO UPDATE SET value = excluded.value
"#;

// SQLite turns an overflowing integer sum into a REAL, so the update is
// skipped when the sum would leave the i64 range. A skipped update
// returns no row.
const ACCUMULATE_COUNTER: &str = r#"
    INSERT INTO counters (name, value)
    VALUES (?, ?)
    ON CONFLICT(name) DO UPDATE SET value = counters.value + excluded.value
    WHERE (excluded.value >= 0 AND counters.value <= 9223372036854775807 - excluded.value)
       OR (excluded.value < 0 AND counters.value >= (-9223372036854775807 - 1) - excluded.value)
    RETURNING value
"#;

/// Repository backed by a SQLite database.
#[derive(Clone)]
pub struct RelationalStore {
    pool: SqlitePool,
}

impl RelationalStore {
    /// Connect to the database named by `dsn` and run migrations.
    ///
    /// Accepts `sqlite://path`, a bare file path, or `:memory:`. Files are
    /// created if missing.
    #[instrument(skip(dsn))]
    pub async fn connect(dsn: &str) -> StateResult<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(map_err!(Open))?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database, so pin the
        // pool to one long-lived connection.
        let pool_options = if dsn.contains(":memory:") {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(map_err!(Open))?;

        let store = Self { pool };
        migrations::run(&store.pool).await?;
        info!("relational store ready");
        Ok(store)
    }

    /// Create an ephemeral in-memory database (for testing).
    pub async fn open_in_memory() -> StateResult<Self> {
        Self::connect(":memory:").await
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn upsert_gauges_in(conn: &mut SqliteConnection, entries: &[GaugeEntry]) -> StateResult<()> {
    for entry in entries {
        sqlx::query(UPSERT_GAUGE)
            .bind(&entry.name)
            .bind(entry.value)
            .execute(&mut *conn)
            .await
            .map_err(map_err!(Query))?;
    }
    Ok(())
}

async fn accumulate_counters_in(
    conn: &mut SqliteConnection,
    entries: Vec<CounterEntry>,
) -> StateResult<Vec<CounterEntry>> {
    let mut totals = Vec::with_capacity(entries.len());
    for entry in entries {
        let total = accumulate_in(&mut *conn, &entry.name, entry.value).await?;
        totals.push(CounterEntry::new(entry.name, total));
    }
    Ok(totals)
}

async fn accumulate_in(conn: &mut SqliteConnection, name: &str, delta: i64) -> StateResult<i64> {
    sqlx::query_scalar::<_, i64>(ACCUMULATE_COUNTER)
        .bind(name)
        .bind(delta)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err!(Query))?
        .ok_or_else(|| StateError::CounterOverflow {
            name: name.to_string(),
        })
}

#[async_trait]
impl Repository for RelationalStore {
    async fn upsert_gauge(&self, name: &str, value: f64) -> StateResult<f64> {
        sqlx::query(UPSERT_GAUGE)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(map_err!(Query))?;
        Ok(value)
    }

    async fn accumulate_counter(&self, name: &str, delta: i64) -> StateResult<i64> {
        let mut conn = self.pool.acquire().await.map_err(map_err!(Query))?;
        accumulate_in(&mut conn, name, delta).await
    }

    async fn batch_upsert_gauges(&self, entries: Vec<GaugeEntry>) -> StateResult<Vec<GaugeEntry>> {
        let (gauges, _) = self.apply_batch(entries, Vec::new()).await?;
        Ok(gauges)
    }

    async fn batch_accumulate_counters(
        &self,
        entries: Vec<CounterEntry>,
    ) -> StateResult<Vec<CounterEntry>> {
        let (_, counters) = self.apply_batch(Vec::new(), entries).await?;
        Ok(counters)
    }

    /// Commit gauges and counters in one transaction.
    async fn apply_batch(
        &self,
        gauges: Vec<GaugeEntry>,
        counters: Vec<CounterEntry>,
    ) -> StateResult<(Vec<GaugeEntry>, Vec<CounterEntry>)> {
        let gauges = coalesce_gauges(gauges);
        let counters = coalesce_counters(counters)?;
        if gauges.is_empty() && counters.is_empty() {
            return Ok((gauges, counters));
        }

        // Dropping `tx` without commit rolls back.
        let mut tx = self.pool.begin().await.map_err(map_err!(Transaction))?;
        upsert_gauges_in(&mut *tx, &gauges).await?;
        let counters = accumulate_counters_in(&mut *tx, counters).await?;
        tx.commit().await.map_err(map_err!(Transaction))?;

        debug!(gauges = gauges.len(), counters = counters.len(), "batch committed");
        Ok((gauges, counters))
    }

    async fn get_gauge(&self, name: &str) -> StateResult<f64> {
        sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err!(Query))?
            .ok_or_else(|| StateError::not_found(MetricKind::Gauge, name))
    }

    async fn get_counter(&self, name: &str) -> StateResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT value FROM counters WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err!(Query))?
            .ok_or_else(|| StateError::not_found(MetricKind::Counter, name))
    }

    async fn list_gauges(&self) -> StateResult<Vec<GaugeEntry>> {
        let rows: Vec<(String, f64)> = sqlx::query_as("SELECT name, value FROM gauges ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err!(Query))?;
        Ok(rows.into_iter().map(|(name, value)| GaugeEntry { name, value }).collect())
    }

    async fn list_counters(&self) -> StateResult<Vec<CounterEntry>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT name, value FROM counters ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err!(Query))?;
        Ok(rows
            .into_iter()
            .map(|(name, value)| CounterEntry { name, value })
            .collect())
    }

    async fn delete_gauge(&self, name: &str) -> StateResult<()> {
        sqlx::query("DELETE FROM gauges WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_err!(Query))?;
        Ok(())
    }

    async fn delete_counter(&self, name: &str) -> StateResult<()> {
        sqlx::query("DELETE FROM counters WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_err!(Query))?;
        Ok(())
    }

    async fn ping(&self) -> StateResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_err!(Query))?;
        Ok(())
    }
}
