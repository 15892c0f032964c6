//! Metric value types and their JSON wire form.
//!
//! A [`Metric`] is a named, typed measurement: either a gauge holding the
//! latest `f64` or a counter carrying an `i64` delta (or accumulated total,
//! depending on direction). On the wire both shapes share one JSON object:
//!
//! ```json
//! { "id": "Alloc", "type": "gauge", "value": 1024.0 }
//! { "id": "PollCount", "type": "counter", "delta": 1 }
//! ```
//!
//! [`MetricPayload`] mirrors that object with every field optional so that
//! an unknown `type` can still be decoded and reported as unsupported.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MetricError, MetricResult};

/// The two kinds of metric the system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }

    /// Parse a path literal according to this kind.
    ///
    /// Gauges accept any finite float, counters any signed 64-bit integer.
    pub fn parse_value(&self, literal: &str) -> MetricResult<MetricValue> {
        match self {
            MetricKind::Gauge => literal
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(|| MetricError::InvalidGauge {
                    literal: literal.to_string(),
                }),
            MetricKind::Counter => literal
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| MetricError::InvalidCounter {
                    literal: literal.to_string(),
                }),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricError::UnsupportedKind(other.to_string())),
        }
    }
}

/// A metric value tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

impl fmt::Display for MetricValue {
    /// Plain-text rendering used by `GET /value/{kind}/{name}`.
    ///
    /// Gauges print the shortest representation that round-trips
    /// (`36.6`, `1`), never scientific notation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(v) => write!(f, "{v}"),
        }
    }
}

/// A named measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// JSON wire form of a metric.
///
/// Used for request bodies (`/update`, `/updates`, `/value`), for response
/// echoes, and by the agent when encoding a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl MetricPayload {
    /// A payload carrying only identity, as sent to `POST /value`.
    pub fn query(kind: MetricKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.as_str().to_string(),
            value: None,
            delta: None,
        }
    }

    /// Validate the `type` tag. Never looks at `value`/`delta`.
    pub fn metric_kind(&self) -> MetricResult<MetricKind> {
        self.kind.parse()
    }

    /// Decode into a typed [`Metric`].
    ///
    /// The tag is checked first; only then is the matching payload field
    /// required. A gauge without `value` or a counter without `delta` is a
    /// validation error.
    pub fn into_metric(self) -> MetricResult<Metric> {
        let kind = self.metric_kind()?;
        if self.id.is_empty() {
            return Err(MetricError::EmptyName);
        }
        let value = match kind {
            MetricKind::Gauge => match self.value {
                Some(v) => MetricValue::Gauge(v),
                None => return Err(MetricError::MissingValue { name: self.id }),
            },
            MetricKind::Counter => match self.delta {
                Some(d) => MetricValue::Counter(d),
                None => return Err(MetricError::MissingDelta { name: self.id }),
            },
        };
        Ok(Metric {
            name: self.id,
            value,
        })
    }
}

impl From<Metric> for MetricPayload {
    fn from(metric: Metric) -> Self {
        let (value, delta) = match metric.value {
            MetricValue::Gauge(v) => (Some(v), None),
            MetricValue::Counter(d) => (None, Some(d)),
        };
        Self {
            id: metric.name,
            kind: metric.value.kind().as_str().to_string(),
            value,
            delta,
        }
    }
}
