//! Agent event loop.
//!
//! Two timers drive one loop: a collect tick appends a fresh sample to the
//! buffer, a send tick delivers the whole buffer as one batch. Only one of
//! the two runs at a time, so a slow send delays the next collection.
//!
//! ```text
//! Idle ──collect──► Collecting ──► Buffering ──send──► Sending ─┬─► Delivered
//!                        ▲                                        └─► Failed
//!                        └───────────────── next tick ◄──────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use meter_core::{AgentConfig, FailurePolicy, Metric, MetricKind, MetricValue};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::ReportingClient;
use crate::collector::Collector;
use crate::error::ReportResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    Collecting,
    Buffering,
    Sending,
    Delivered,
    Failed,
}

pub struct Agent {
    collector: Box<dyn Collector>,
    client: ReportingClient,
    buffer: Vec<Metric>,
    phase: AgentPhase,
    policy: FailurePolicy,
    poll_interval: Duration,
    report_interval: Duration,
}

impl Agent {
    /// # Panics
    ///
    /// [`run`](Self::run) panics if either interval is zero.
    pub fn new(
        collector: Box<dyn Collector>,
        client: ReportingClient,
        policy: FailurePolicy,
        poll_interval: Duration,
        report_interval: Duration,
    ) -> Self {
        Self {
            collector,
            client,
            buffer: Vec::new(),
            phase: AgentPhase::Idle,
            policy,
            poll_interval,
            report_interval,
        }
    }

    pub fn from_config(collector: Box<dyn Collector>, config: &AgentConfig) -> ReportResult<Self> {
        Ok(Self::new(
            collector,
            ReportingClient::from_config(config)?,
            config.on_failure,
            Duration::from_secs(config.poll_interval),
            Duration::from_secs(config.report_interval),
        ))
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn on_collect_tick(&mut self) {
        self.phase = AgentPhase::Collecting;
        let sample = self.collector.collect();
        self.buffer.extend(sample);
        self.phase = AgentPhase::Buffering;
        debug!(buffered = self.buffer.len(), "sample collected");
    }

    /// Send the whole buffer.
    ///
    /// On success the buffer is cleared. On failure the buffer is kept and
    /// the error is returned under [`FailurePolicy::Abort`]; under
    /// [`FailurePolicy::Retain`] it is logged and the next tick retries.
    pub async fn on_send_tick(&mut self) -> ReportResult<()> {
        if self.buffer.is_empty() {
            debug!("nothing to send");
            return Ok(());
        }

        self.phase = AgentPhase::Sending;
        match self.client.report(&self.buffer).await {
            Ok(attempts) => {
                info!(metrics = self.buffer.len(), attempts, "batch delivered");
                self.buffer.clear();
                self.phase = AgentPhase::Delivered;
                Ok(())
            }
            Err(e) => {
                self.phase = AgentPhase::Failed;
                match self.policy {
                    FailurePolicy::Abort => {
                        error!(error = %e, buffered = self.buffer.len(), "send failed, stopping agent");
                        Err(e)
                    }
                    FailurePolicy::Retain => {
                        self.buffer = compact(std::mem::take(&mut self.buffer));
                        warn!(error = %e, buffered = self.buffer.len(), "send failed, keeping buffer");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Run until the shutdown signal fires or a send fails under `Abort`.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> ReportResult<()> {
        let mut collect = tokio::time::interval_at(
            Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        let mut send = tokio::time::interval_at(
            Instant::now() + self.report_interval,
            self.report_interval,
        );
        collect.set_missed_tick_behavior(MissedTickBehavior::Delay);
        send.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            server = %self.client.authority(),
            poll_ms = self.poll_interval.as_millis() as u64,
            report_ms = self.report_interval.as_millis() as u64,
            policy = %self.policy,
            "agent started"
        );

        if *shutdown.borrow_and_update() {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = collect.tick() => self.on_collect_tick(),
                _ = send.tick() => self.on_send_tick().await?,
                _ = shutdown.changed() => break,
            }
        }

        info!(unsent = self.buffer.len(), "agent stopped");
        Ok(())
    }
}

/// Fold a buffer down to one entry per metric, the way the server would
/// apply it: gauges keep the last value, counter deltas are summed.
///
/// Order follows each metric's first appearance.
fn compact(metrics: Vec<Metric>) -> Vec<Metric> {
    let mut index: HashMap<(MetricKind, String), usize> = HashMap::new();
    let mut out: Vec<Metric> = Vec::new();
    for metric in metrics {
        let key = (metric.kind(), metric.name.clone());
        match index.get(&key) {
            Some(&i) => {
                out[i].value = match (out[i].value, metric.value) {
                    (MetricValue::Counter(a), MetricValue::Counter(b)) => {
                        MetricValue::Counter(a.saturating_add(b))
                    }
                    (_, latest) => latest,
                };
            }
            None => {
                index.insert(key, out.len());
                out.push(metric);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::client::RetryPolicy;
    use crate::test_support::{OK_RESPONSE, canned_server, refused_addr};

    struct FixedCollector;

    impl Collector for FixedCollector {
        fn collect(&mut self) -> Vec<Metric> {
            vec![Metric::gauge("g", 1.0), Metric::counter("PollCount", 1)]
        }
    }

    fn agent(addr: &str, policy: FailurePolicy) -> Agent {
        let client = ReportingClient::new(
            addr,
            Duration::from_secs(2),
            RetryPolicy::new(2, Duration::from_millis(5)),
        )
        .unwrap();
        Agent::new(
            Box::new(FixedCollector),
            client,
            policy,
            Duration::from_millis(10),
            Duration::from_millis(30),
        )
    }

    #[tokio::test]
    async fn buffer_grows_between_sends() {
        let mut agent = agent("127.0.0.1:1", FailurePolicy::Abort);
        assert_eq!(agent.phase(), AgentPhase::Idle);
        agent.on_collect_tick();
        agent.on_collect_tick();
        assert_eq!(agent.buffered(), 4);
        assert_eq!(agent.phase(), AgentPhase::Buffering);
    }

    #[tokio::test]
    async fn empty_buffer_skips_send() {
        let mut agent = agent("127.0.0.1:1", FailurePolicy::Abort);
        agent.on_send_tick().await.unwrap();
        assert_eq!(agent.phase(), AgentPhase::Idle);
    }

    #[tokio::test]
    async fn delivery_clears_buffer() {
        let (addr, hits) = canned_server(OK_RESPONSE).await;
        let mut agent = agent(&addr, FailurePolicy::Abort);
        agent.on_collect_tick();
        agent.on_send_tick().await.unwrap();
        assert_eq!(agent.phase(), AgentPhase::Delivered);
        assert_eq!(agent.buffered(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_policy_surfaces_failure() {
        let addr = refused_addr().await;
        let mut agent = agent(&addr, FailurePolicy::Abort);
        agent.on_collect_tick();
        assert!(agent.on_send_tick().await.is_err());
        assert_eq!(agent.phase(), AgentPhase::Failed);
    }

    #[tokio::test]
    async fn retain_policy_keeps_buffer() {
        let addr = refused_addr().await;
        let mut agent = agent(&addr, FailurePolicy::Retain);
        agent.on_collect_tick();
        agent.on_send_tick().await.unwrap();
        assert_eq!(agent.phase(), AgentPhase::Failed);
        assert_eq!(agent.buffered(), 2);

        agent.on_collect_tick();
        assert_eq!(agent.buffered(), 4);
    }

    #[tokio::test]
    async fn retained_buffer_stays_bounded_across_failures() {
        let addr = refused_addr().await;
        let mut agent = agent(&addr, FailurePolicy::Retain);

        for _ in 0..5 {
            for _ in 0..3 {
                agent.on_collect_tick();
            }
            agent.on_send_tick().await.unwrap();
            assert_eq!(agent.phase(), AgentPhase::Failed);
            assert_eq!(agent.buffered(), 2);
        }

        // 15 ticks folded into one delta; nothing lost.
        let poll = agent
            .buffer
            .iter()
            .find(|m| m.name == "PollCount")
            .unwrap();
        assert_eq!(poll.value, MetricValue::Counter(15));
    }

    #[test]
    fn compact_keeps_last_gauge_and_sums_counters() {
        let out = compact(vec![
            Metric::gauge("g", 1.0),
            Metric::counter("c", 2),
            Metric::gauge("g", 3.0),
            Metric::counter("c", 5),
            Metric::counter("g", 7),
        ]);
        assert_eq!(
            out,
            vec![Metric::gauge("g", 3.0), Metric::counter("c", 7), Metric::counter("g", 7)]
        );
    }

    #[tokio::test]
    async fn run_stops_on_abort() {
        let addr = refused_addr().await;
        let mut agent = agent(&addr, FailurePolicy::Abort);
        let (_tx, rx) = watch::channel(false);
        let result = tokio::time::timeout(Duration::from_secs(5), agent.run(rx))
            .await
            .expect("agent did not stop");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_delivers_until_shutdown() {
        let (addr, hits) = canned_server(OK_RESPONSE).await;
        let mut agent = agent(&addr, FailurePolicy::Abort);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let result = agent.run(rx).await;
            (agent, result)
        });
        for _ in 0..100 {
            if hits.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        let (_agent, result) = handle.await.unwrap();
        result.unwrap();
        assert!(hits.load(Ordering::SeqCst) >= 2);
    }
}
