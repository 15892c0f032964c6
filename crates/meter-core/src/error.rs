//! Validation errors raised while decoding metrics.

use thiserror::Error;

pub type MetricResult<T> = Result<T, MetricError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// The `type` tag is neither `gauge` nor `counter`.
    #[error("unsupported metric type: {0}")]
    UnsupportedKind(String),

    #[error("value is required for gauge metric {name}")]
    MissingValue { name: String },

    #[error("delta is required for counter metric {name}")]
    MissingDelta { name: String },

    #[error("invalid gauge value: {literal}")]
    InvalidGauge { literal: String },

    #[error("invalid counter value: {literal}")]
    InvalidCounter { literal: String },

    #[error("metric name must not be empty")]
    EmptyName,
}

impl MetricError {
    /// Whether this error is the distinguished "unsupported kind" signal.
    pub fn is_unsupported_kind(&self) -> bool {
        matches!(self, MetricError::UnsupportedKind(_))
    }
}
