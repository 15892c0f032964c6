//! Entry and snapshot types shared by every backend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// A gauge name and its latest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeEntry {
    pub name: String,
    pub value: f64,
}

impl GaugeEntry {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A counter name and an amount: a delta on the way in, the running total
/// on the way out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntry {
    pub name: String,
    pub value: i64,
}

impl CounterEntry {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Full point-in-time dump of a repository.
///
/// Serializes as `{"Gauges":[{"name":..,"value":..}],"Counters":[..]}`.
/// Entries are ordered by name so identical state always produces identical
/// bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Gauges", alias = "gauges", default)]
    pub gauges: Vec<GaugeEntry>,
    #[serde(rename = "Counters", alias = "counters", default)]
    pub counters: Vec<CounterEntry>,
}

impl Snapshot {
    pub fn new(mut gauges: Vec<GaugeEntry>, mut counters: Vec<CounterEntry>) -> Self {
        gauges.sort_by(|a, b| a.name.cmp(&b.name));
        counters.sort_by(|a, b| a.name.cmp(&b.name));
        Self { gauges, counters }
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    pub fn to_json(&self) -> StateResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StateError::Serialize(e.to_string()))
    }

    /// Parse a snapshot. Malformed input is an error, never an empty state.
    pub fn from_json(bytes: &[u8]) -> StateResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| StateError::Snapshot(format!("malformed snapshot: {e}")))
    }
}

/// Collapse duplicate gauge names, keeping the last value for each.
///
/// Output order follows each name's first appearance.
pub fn coalesce_gauges(entries: Vec<GaugeEntry>) -> Vec<GaugeEntry> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<GaugeEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match index.get(&entry.name) {
            Some(&i) => out[i].value = entry.value,
            None => {
                index.insert(entry.name.clone(), out.len());
                out.push(entry);
            }
        }
    }
    out
}

/// Collapse duplicate counter names, summing their deltas.
///
/// Output order follows each name's first appearance. A sum outside the
/// `i64` range is [`StateError::CounterOverflow`].
pub fn coalesce_counters(entries: Vec<CounterEntry>) -> StateResult<Vec<CounterEntry>> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<CounterEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match index.get(&entry.name) {
            Some(&i) => {
                out[i].value = checked_total(&entry.name, out[i].value, entry.value)?;
            }
            None => {
                index.insert(entry.name.clone(), out.len());
                out.push(entry);
            }
        }
    }
    Ok(out)
}

/// `total + delta`, or [`StateError::CounterOverflow`] for `name`.
pub fn checked_total(name: &str, total: i64, delta: i64) -> StateResult<i64> {
    total
        .checked_add(delta)
        .ok_or_else(|| StateError::CounterOverflow {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_gauges_last_wins() {
        let out = coalesce_gauges(vec![
            GaugeEntry::new("a", 1.0),
            GaugeEntry::new("b", 2.0),
            GaugeEntry::new("a", 3.0),
        ]);
        assert_eq!(out, vec![GaugeEntry::new("a", 3.0), GaugeEntry::new("b", 2.0)]);
    }

    #[test]
    fn coalesce_counters_sums() {
        let out = coalesce_counters(vec![
            CounterEntry::new("hits", 5),
            CounterEntry::new("misses", 1),
            CounterEntry::new("hits", 7),
        ])
        .unwrap();
        assert_eq!(
            out,
            vec![CounterEntry::new("hits", 12), CounterEntry::new("misses", 1)]
        );
    }

    #[test]
    fn coalesce_counters_rejects_overflow() {
        let err = coalesce_counters(vec![
            CounterEntry::new("hits", i64::MAX),
            CounterEntry::new("hits", 1),
        ])
        .unwrap_err();
        assert!(err.is_overflow());
    }

    #[test]
    fn snapshot_json_shape() {
        let snapshot = Snapshot::new(vec![], vec![CounterEntry::new("TestMetric", 42)]);
        let json = String::from_utf8(snapshot.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"Gauges":[],"Counters":[{"name":"TestMetric","value":42}]}"#
        );
    }

    #[test]
    fn snapshot_sorted_by_name() {
        let snapshot = Snapshot::new(
            vec![GaugeEntry::new("z", 1.0), GaugeEntry::new("a", 2.0)],
            vec![],
        );
        assert_eq!(snapshot.gauges[0].name, "a");
    }

    #[test]
    fn snapshot_missing_sections_default_to_empty() {
        let snapshot = Snapshot::from_json(br#"{"Gauges":[{"name":"g","value":1.5}]}"#).unwrap();
        assert_eq!(snapshot.gauges.len(), 1);
        assert!(snapshot.counters.is_empty());
    }

    #[test]
    fn snapshot_malformed_is_error() {
        let err = Snapshot::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, StateError::Snapshot(_)));
    }
}
