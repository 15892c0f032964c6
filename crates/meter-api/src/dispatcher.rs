//! RequestDispatcher — validates metric requests and routes them to the
//! repository.
//!
//! The dispatcher knows nothing about HTTP. Handlers decode the transport
//! shape, call one method here, and map the result with
//! [`DispatchError::status`](crate::DispatchError::status).

use meter_core::{Metric, MetricError, MetricKind, MetricPayload, MetricValue};
use meter_state::{CounterEntry, GaugeEntry, SharedRepository, Snapshot};
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};

#[derive(Clone)]
pub struct RequestDispatcher {
    repo: SharedRepository,
}

impl RequestDispatcher {
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repo
    }

    /// Apply one typed metric. Counters come back carrying the new total.
    async fn apply(&self, metric: Metric) -> DispatchResult<Metric> {
        let stored = match metric.value {
            MetricValue::Gauge(v) => {
                MetricValue::Gauge(self.repo.upsert_gauge(&metric.name, v).await?)
            }
            MetricValue::Counter(d) => {
                MetricValue::Counter(self.repo.accumulate_counter(&metric.name, d).await?)
            }
        };
        debug!(name = %metric.name, value = %stored, "metric updated");
        Ok(Metric {
            name: metric.name,
            value: stored,
        })
    }

    /// `(kind, name, literal)` from the request path.
    pub async fn update_by_path(
        &self,
        kind: &str,
        name: &str,
        literal: &str,
    ) -> DispatchResult<Metric> {
        let kind: MetricKind = kind.parse()?;
        if name.is_empty() {
            return Err(MetricError::EmptyName.into());
        }
        let value = kind.parse_value(literal)?;
        self.apply(Metric {
            name: name.to_string(),
            value,
        })
        .await
    }

    /// A single JSON metric. The echo carries the stored value.
    pub async fn update_by_body(&self, payload: MetricPayload) -> DispatchResult<MetricPayload> {
        let metric = payload.into_metric()?;
        Ok(self.apply(metric).await?.into())
    }

    /// A JSON array of metrics.
    ///
    /// Every entry is validated before anything is written, so a bad entry
    /// rejects the whole batch. Duplicate names are coalesced by the
    /// repository; the echo lists gauges first, then counters with totals.
    pub async fn batch_update(
        &self,
        payloads: Vec<MetricPayload>,
    ) -> DispatchResult<Vec<MetricPayload>> {
        if payloads.is_empty() {
            return Err(DispatchError::Validation("empty metrics batch".into()));
        }

        let mut gauges = Vec::new();
        let mut counters = Vec::new();
        for payload in payloads {
            let metric = payload.into_metric()?;
            match metric.value {
                MetricValue::Gauge(v) => gauges.push(GaugeEntry::new(metric.name, v)),
                MetricValue::Counter(d) => counters.push(CounterEntry::new(metric.name, d)),
            }
        }

        let (gauges, counters) = self.repo.apply_batch(gauges, counters).await?;
        debug!(gauges = gauges.len(), counters = counters.len(), "batch applied");

        let echo = gauges
            .into_iter()
            .map(|g| Metric::gauge(g.name, g.value))
            .chain(counters.into_iter().map(|c| Metric::counter(c.name, c.value)))
            .map(MetricPayload::from)
            .collect();
        Ok(echo)
    }

    pub async fn get_by_path(&self, kind: &str, name: &str) -> DispatchResult<MetricValue> {
        let kind: MetricKind = kind.parse()?;
        self.read(kind, name).await
    }

    /// Fill in `value` or `delta` for a `{id, type}` query.
    pub async fn get_by_body(&self, query: MetricPayload) -> DispatchResult<MetricPayload> {
        let kind = query.metric_kind()?;
        let value = self.read(kind, &query.id).await?;
        Ok(Metric {
            name: query.id,
            value,
        }
        .into())
    }

    async fn read(&self, kind: MetricKind, name: &str) -> DispatchResult<MetricValue> {
        let value = match kind {
            MetricKind::Gauge => MetricValue::Gauge(self.repo.get_gauge(name).await?),
            MetricKind::Counter => MetricValue::Counter(self.repo.get_counter(name).await?),
        };
        Ok(value)
    }

    /// Every gauge and counter, sorted by name.
    pub async fn list_all(&self) -> DispatchResult<Snapshot> {
        let gauges = self.repo.list_gauges().await?;
        let counters = self.repo.list_counters().await?;
        Ok(Snapshot::new(gauges, counters))
    }

    pub async fn ping(&self) -> DispatchResult<()> {
        self.repo.ping().await?;
        Ok(())
    }
}
