//! VolatileStore — in-memory metric maps.
//!
//! Gauges and counters live in separate maps, each behind its own
//! `RwLock`, so a burst of gauge writes never blocks counter traffic.
//! Locks are held only for the map operation itself; nothing awaits I/O
//! while holding one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use meter_core::MetricKind;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::repository::Repository;
use crate::types::*;

/// Thread-safe in-memory store. Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct VolatileStore {
    gauges: Arc<RwLock<HashMap<String, f64>>>,
    counters: Arc<RwLock<HashMap<String, i64>>>,
}

impl VolatileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let gauges = snapshot
            .gauges
            .into_iter()
            .map(|g| (g.name, g.value))
            .collect();
        let counters = snapshot
            .counters
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        Self {
            gauges: Arc::new(RwLock::new(gauges)),
            counters: Arc::new(RwLock::new(counters)),
        }
    }

    /// Copy both maps into a [`Snapshot`].
    ///
    /// Each read lock is held only while its map is copied. The two copies
    /// are each internally consistent.
    pub async fn snapshot(&self) -> Snapshot {
        let gauges: Vec<GaugeEntry> = {
            let map = self.gauges.read().await;
            map.iter().map(|(k, v)| GaugeEntry::new(k.clone(), *v)).collect()
        };
        let counters: Vec<CounterEntry> = {
            let map = self.counters.read().await;
            map.iter().map(|(k, v)| CounterEntry::new(k.clone(), *v)).collect()
        };
        Snapshot::new(gauges, counters)
    }

    pub async fn set_gauge(&self, name: &str, value: f64) -> f64 {
        self.gauges.write().await.insert(name.to_string(), value);
        value
    }

    /// Add `delta` to a counter. An overflowing total leaves it unchanged.
    pub async fn add_counter(&self, name: &str, delta: i64) -> StateResult<i64> {
        let mut map = self.counters.write().await;
        let current = map.get(name).copied().unwrap_or(0);
        let total = checked_total(name, current, delta)?;
        map.insert(name.to_string(), total);
        Ok(total)
    }

    /// Apply a coalesced gauge batch under one write lock.
    pub async fn set_gauges(&self, entries: Vec<GaugeEntry>) -> Vec<GaugeEntry> {
        let entries = coalesce_gauges(entries);
        let mut map = self.gauges.write().await;
        for entry in &entries {
            map.insert(entry.name.clone(), entry.value);
        }
        drop(map);
        debug!(count = entries.len(), "gauge batch applied");
        entries
    }

    /// Apply a coalesced counter batch under one write lock. Returns totals.
    ///
    /// Every total is computed before any is stored, so an overflow in one
    /// entry leaves the whole batch unapplied.
    pub async fn add_counters(&self, entries: Vec<CounterEntry>) -> StateResult<Vec<CounterEntry>> {
        let entries = coalesce_counters(entries)?;
        let mut map = self.counters.write().await;
        let totals = entries
            .into_iter()
            .map(|entry| {
                let current = map.get(&entry.name).copied().unwrap_or(0);
                let total = checked_total(&entry.name, current, entry.value)?;
                Ok(CounterEntry::new(entry.name, total))
            })
            .collect::<StateResult<Vec<_>>>()?;
        for entry in &totals {
            map.insert(entry.name.clone(), entry.value);
        }
        drop(map);
        debug!(count = totals.len(), "counter batch applied");
        Ok(totals)
    }

    pub async fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.read().await.get(name).copied()
    }

    pub async fn counter(&self, name: &str) -> Option<i64> {
        self.counters.read().await.get(name).copied()
    }

    pub async fn remove_gauge(&self, name: &str) {
        self.gauges.write().await.remove(name);
    }

    pub async fn remove_counter(&self, name: &str) {
        self.counters.write().await.remove(name);
    }
}

#[async_trait]
impl Repository for VolatileStore {
    async fn upsert_gauge(&self, name: &str, value: f64) -> StateResult<f64> {
        Ok(self.set_gauge(name, value).await)
    }

    async fn accumulate_counter(&self, name: &str, delta: i64) -> StateResult<i64> {
        self.add_counter(name, delta).await
    }

    async fn batch_upsert_gauges(&self, entries: Vec<GaugeEntry>) -> StateResult<Vec<GaugeEntry>> {
        Ok(self.set_gauges(entries).await)
    }

    async fn batch_accumulate_counters(
        &self,
        entries: Vec<CounterEntry>,
    ) -> StateResult<Vec<CounterEntry>> {
        self.add_counters(entries).await
    }

    async fn get_gauge(&self, name: &str) -> StateResult<f64> {
        self.gauge(name)
            .await
            .ok_or_else(|| StateError::not_found(MetricKind::Gauge, name))
    }

    async fn get_counter(&self, name: &str) -> StateResult<i64> {
        self.counter(name)
            .await
            .ok_or_else(|| StateError::not_found(MetricKind::Counter, name))
    }

    async fn list_gauges(&self) -> StateResult<Vec<GaugeEntry>> {
        let map = self.gauges.read().await;
        Ok(map.iter().map(|(k, v)| GaugeEntry::new(k.clone(), *v)).collect())
    }

    async fn list_counters(&self) -> StateResult<Vec<CounterEntry>> {
        let map = self.counters.read().await;
        Ok(map.iter().map(|(k, v)| CounterEntry::new(k.clone(), *v)).collect())
    }

    async fn delete_gauge(&self, name: &str) -> StateResult<()> {
        self.remove_gauge(name).await;
        Ok(())
    }

    async fn delete_counter(&self, name: &str) -> StateResult<()> {
        self.remove_counter(name).await;
        Ok(())
    }

    async fn ping(&self) -> StateResult<()> {
        Ok(())
    }
}
