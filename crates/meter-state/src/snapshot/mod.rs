//! SnapshotPersister — a `VolatileStore` that survives restarts.
//!
//! Serving goes straight to the in-memory maps. A background task wakes on
//! a fixed interval, copies both maps and overwrites the sink with the full
//! state. On shutdown it finishes any flush in progress, performs one final
//! flush, and returns; the owner awaits the task before exiting.
//!
//! ```text
//! requests ──► VolatileStore ◄── snapshot() ── flush loop ──► SnapshotSink
//!                    ▲                                        (file / redb)
//!                    └──────────── restore at startup ◄──────────┘
//! ```
//!
//! Counters written after the last flush are lost on a crash; the interval
//! is the durability budget.

mod sink;

pub use sink::{FileSink, RedbSink, SnapshotSink};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::StateResult;
use crate::repository::Repository;
use crate::types::*;
use crate::volatile::VolatileStore;

/// In-memory repository with periodic durable snapshots.
#[derive(Clone)]
pub struct SnapshotPersister {
    store: VolatileStore,
    sink: Arc<dyn SnapshotSink>,
    interval: Duration,
}

impl SnapshotPersister {
    /// Create a persister, optionally restoring the sink's latest snapshot.
    ///
    /// A missing snapshot starts empty. A malformed one is an error: the
    /// process should refuse to start rather than discard data.
    pub async fn open(
        sink: Arc<dyn SnapshotSink>,
        interval: Duration,
        restore: bool,
    ) -> StateResult<Self> {
        let store = if restore {
            match sink.load().await? {
                Some(snapshot) => {
                    info!(
                        location = %sink.location(),
                        gauges = snapshot.gauges.len(),
                        counters = snapshot.counters.len(),
                        "snapshot restored"
                    );
                    VolatileStore::from_snapshot(snapshot)
                }
                None => VolatileStore::new(),
            }
        } else {
            VolatileStore::new()
        };

        Ok(Self {
            store,
            sink,
            interval,
        })
    }

    pub fn store(&self) -> &VolatileStore {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Copy the current state and overwrite the sink with it.
    pub async fn flush(&self) -> StateResult<Snapshot> {
        let snapshot = self.store.snapshot().await;
        self.sink.save(&snapshot).await?;
        debug!(
            gauges = snapshot.gauges.len(),
            counters = snapshot.counters.len(),
            "snapshot flushed"
        );
        Ok(snapshot)
    }

    /// Run the flush loop until the shutdown signal fires.
    ///
    /// A zero interval flushes on every scheduler turn. A failed flush ends
    /// the loop with an error; the in-memory store keeps serving. A closed
    /// shutdown channel counts as a shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> StateResult<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            location = %self.sink.location(),
            "snapshot persister started"
        );

        if !*shutdown.borrow_and_update() {
            loop {
                tokio::select! {
                    _ = wait(self.interval) => {
                        if let Err(e) = self.flush().await {
                            error!(error = %e, "snapshot flush failed, persister stopping");
                            return Err(e);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }

        info!("snapshot persister shutting down");
        self.flush().await?;
        info!("final snapshot flushed");
        Ok(())
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<StateResult<()>> {
        let persister = self.clone();
        tokio::spawn(async move { persister.run(shutdown).await })
    }
}

async fn wait(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(interval).await;
    }
}

#[async_trait]
impl Repository for SnapshotPersister {
    async fn upsert_gauge(&self, name: &str, value: f64) -> StateResult<f64> {
        self.store.upsert_gauge(name, value).await
    }

    async fn accumulate_counter(&self, name: &str, delta: i64) -> StateResult<i64> {
        self.store.accumulate_counter(name, delta).await
    }

    async fn batch_upsert_gauges(&self, entries: Vec<GaugeEntry>) -> StateResult<Vec<GaugeEntry>> {
        self.store.batch_upsert_gauges(entries).await
    }

    async fn batch_accumulate_counters(
        &self,
        entries: Vec<CounterEntry>,
    ) -> StateResult<Vec<CounterEntry>> {
        self.store.batch_accumulate_counters(entries).await
    }

    async fn get_gauge(&self, name: &str) -> StateResult<f64> {
        self.store.get_gauge(name).await
    }

    async fn get_counter(&self, name: &str) -> StateResult<i64> {
        self.store.get_counter(name).await
    }

    async fn list_gauges(&self) -> StateResult<Vec<GaugeEntry>> {
        self.store.list_gauges().await
    }

    async fn list_counters(&self) -> StateResult<Vec<CounterEntry>> {
        self.store.list_counters().await
    }

    async fn delete_gauge(&self, name: &str) -> StateResult<()> {
        self.store.delete_gauge(name).await
    }

    async fn delete_counter(&self, name: &str) -> StateResult<()> {
        self.store.delete_counter(name).await
    }

    async fn ping(&self) -> StateResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;

    /// Sink that rejects every save.
    struct BrokenSink;

    #[async_trait]
    impl SnapshotSink for BrokenSink {
        async fn load(&self) -> StateResult<Option<Snapshot>> {
            Ok(None)
        }

        async fn save(&self, _snapshot: &Snapshot) -> StateResult<()> {
            Err(StateError::Io("disk full".into()))
        }

        fn location(&self) -> String {
            "broken".into()
        }
    }

    /// Sink whose saves take a while and are recorded in order.
    struct SlowSink {
        delay: Duration,
        started: tokio::sync::Notify,
        saved: std::sync::Mutex<Vec<Snapshot>>,
    }

    #[async_trait]
    impl SnapshotSink for SlowSink {
        async fn load(&self) -> StateResult<Option<Snapshot>> {
            Ok(None)
        }

        async fn save(&self, snapshot: &Snapshot) -> StateResult<()> {
            self.started.notify_one();
            tokio::time::sleep(self.delay).await;
            self.saved.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        fn location(&self) -> String {
            "slow".into()
        }
    }

    #[tokio::test]
    async fn shutdown_waits_for_flush_in_progress() {
        let sink = Arc::new(SlowSink {
            delay: Duration::from_millis(200),
            started: tokio::sync::Notify::new(),
            saved: std::sync::Mutex::new(Vec::new()),
        });
        let persister = SnapshotPersister::open(sink.clone(), Duration::from_millis(10), false)
            .await
            .unwrap();
        persister.accumulate_counter("before", 1).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = persister.spawn(rx);

        sink.started.notified().await;
        persister.accumulate_counter("during", 1).await.unwrap();
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].counters, vec![CounterEntry::new("before", 1)]);
        assert_eq!(
            saved[1].counters,
            vec![CounterEntry::new("before", 1), CounterEntry::new("during", 1)]
        );
    }

    #[tokio::test]
    async fn final_flush_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let sink = Arc::new(FileSink::new(&path));
        let persister = SnapshotPersister::open(sink, Duration::ZERO, false)
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = persister.spawn(rx);

        persister.accumulate_counter("TestMetric", 42).await.unwrap();
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            r#"{"Gauges":[],"Counters":[{"name":"TestMetric","value":42}]}"#
        );
    }

    #[tokio::test]
    async fn long_interval_still_flushes_at_shutdown() {
        let sink = Arc::new(RedbSink::open_in_memory().unwrap());
        let persister = SnapshotPersister::open(sink.clone(), Duration::from_secs(3600), false)
            .await
            .unwrap();
        persister.upsert_gauge("g", 2.5).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = persister.spawn(rx);
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let saved = sink.load().await.unwrap().unwrap();
        assert_eq!(saved.gauges, vec![GaugeEntry::new("g", 2.5)]);
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let sink = Arc::new(RedbSink::open_in_memory().unwrap());
        let persister = SnapshotPersister::open(sink.clone(), Duration::from_secs(3600), false)
            .await
            .unwrap();
        persister.accumulate_counter("c", 1).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = persister.spawn(rx);
        drop(tx);
        handle.await.unwrap().unwrap();

        assert_eq!(sink.load().await.unwrap().unwrap().counters.len(), 1);
    }

    #[tokio::test]
    async fn restore_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(
            &path,
            r#"{"Gauges":[{"name":"g","value":1.5}],"Counters":[{"name":"c","value":9}]}"#,
        )
        .unwrap();

        let persister =
            SnapshotPersister::open(Arc::new(FileSink::new(&path)), Duration::ZERO, true)
                .await
                .unwrap();
        assert_eq!(persister.get_gauge("g").await.unwrap(), 1.5);
        assert_eq!(persister.get_counter("c").await.unwrap(), 9);
        // Restored counters keep accumulating.
        assert_eq!(persister.accumulate_counter("c", 1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn restore_disabled_ignores_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, r#"{"Gauges":[{"name":"g","value":1.5}],"Counters":[]}"#).unwrap();

        let persister =
            SnapshotPersister::open(Arc::new(FileSink::new(&path)), Duration::ZERO, false)
                .await
                .unwrap();
        assert!(persister.get_gauge("g").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn restore_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FileSink::new(dir.path().join("absent.json")));
        let persister = SnapshotPersister::open(sink, Duration::ZERO, true).await.unwrap();
        assert!(persister.list_gauges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_malformed_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, "garbage").unwrap();

        let result =
            SnapshotPersister::open(Arc::new(FileSink::new(&path)), Duration::ZERO, true).await;
        assert!(matches!(result, Err(StateError::Snapshot(_))));
    }

    #[tokio::test]
    async fn flush_failure_stops_task_but_not_serving() {
        let persister = SnapshotPersister::open(Arc::new(BrokenSink), Duration::ZERO, false)
            .await
            .unwrap();
        let (_tx, rx) = watch::channel(false);
        let result = persister.spawn(rx).await.unwrap();
        assert!(matches!(result, Err(StateError::Io(_))));

        assert_eq!(persister.accumulate_counter("c", 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn save_then_load_round_trip() {
        let sink = Arc::new(RedbSink::open_in_memory().unwrap());
        let persister = SnapshotPersister::open(sink.clone(), Duration::ZERO, false)
            .await
            .unwrap();
        persister.upsert_gauge("a", 1.0).await.unwrap();
        persister.accumulate_counter("b", 2).await.unwrap();
        let saved = persister.flush().await.unwrap();

        let reopened = SnapshotPersister::open(sink, Duration::ZERO, true).await.unwrap();
        assert_eq!(reopened.store().snapshot().await, saved);
    }
}
