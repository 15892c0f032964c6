//! View types for template rendering.
//!
//! Values are pre-formatted so the template only prints strings.

use meter_core::MetricValue;
use meter_state::Snapshot;

pub struct MetricRow {
    pub name: String,
    pub value: String,
}

pub struct MetricsView {
    pub gauges: Vec<MetricRow>,
    pub counters: Vec<MetricRow>,
}

impl MetricsView {
    /// Build rows sorted by name.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut gauges: Vec<MetricRow> = snapshot
            .gauges
            .iter()
            .map(|g| MetricRow {
                name: g.name.clone(),
                value: MetricValue::Gauge(g.value).to_string(),
            })
            .collect();
        let mut counters: Vec<MetricRow> = snapshot
            .counters
            .iter()
            .map(|c| MetricRow {
                name: c.name.clone(),
                value: MetricValue::Counter(c.value).to_string(),
            })
            .collect();
        gauges.sort_by(|a, b| a.name.cmp(&b.name));
        counters.sort_by(|a, b| a.name.cmp(&b.name));
        Self { gauges, counters }
    }

    pub fn total(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }
}
