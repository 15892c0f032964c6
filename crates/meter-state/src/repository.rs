//! The storage contract every backend implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StateResult;
use crate::types::{CounterEntry, GaugeEntry};

/// Backend chosen at startup and shared by every request handler.
pub type SharedRepository = Arc<dyn Repository>;

/// Concurrency-safe store of named gauges and counters.
///
/// Metrics are created implicitly by the first write and only removed by an
/// explicit delete. Reads of an absent name return
/// [`StateError::NotFound`](crate::StateError::NotFound), which is distinct
/// from every storage failure.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Replace the stored gauge value. Returns the stored value.
    async fn upsert_gauge(&self, name: &str, value: f64) -> StateResult<f64>;

    /// Add `delta` to the counter (absent counts as zero). Returns the new total.
    async fn accumulate_counter(&self, name: &str, delta: i64) -> StateResult<i64>;

    /// Apply every gauge in the batch. Duplicate names collapse to the last
    /// value before application; the applied entries are returned.
    async fn batch_upsert_gauges(&self, entries: Vec<GaugeEntry>) -> StateResult<Vec<GaugeEntry>>;

    /// Apply every counter delta in the batch. Duplicate names are summed
    /// before application; each returned entry carries the new total.
    async fn batch_accumulate_counters(
        &self,
        entries: Vec<CounterEntry>,
    ) -> StateResult<Vec<CounterEntry>>;

    /// Apply a mixed batch.
    ///
    /// The default applies gauges, then counters, each with its own
    /// per-kind atomicity. Backends with transactions override this to
    /// commit both kinds together.
    async fn apply_batch(
        &self,
        gauges: Vec<GaugeEntry>,
        counters: Vec<CounterEntry>,
    ) -> StateResult<(Vec<GaugeEntry>, Vec<CounterEntry>)> {
        let gauges = self.batch_upsert_gauges(gauges).await?;
        let counters = self.batch_accumulate_counters(counters).await?;
        Ok((gauges, counters))
    }

    async fn get_gauge(&self, name: &str) -> StateResult<f64>;

    async fn get_counter(&self, name: &str) -> StateResult<i64>;

    /// All gauges. Order is unspecified.
    async fn list_gauges(&self) -> StateResult<Vec<GaugeEntry>>;

    /// All counters. Order is unspecified.
    async fn list_counters(&self) -> StateResult<Vec<CounterEntry>>;

    /// Remove a gauge. Absent names are not an error.
    async fn delete_gauge(&self, name: &str) -> StateResult<()>;

    /// Remove a counter. Absent names are not an error.
    async fn delete_counter(&self, name: &str) -> StateResult<()>;

    /// Liveness probe.
    async fn ping(&self) -> StateResult<()>;
}
