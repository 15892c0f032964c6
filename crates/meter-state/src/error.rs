//! Error types for the metric repository.

use meter_core::MetricKind;
use thiserror::Error;

/// Result type alias for repository operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during repository operations.
///
/// [`StateError::NotFound`] means the metric was never written (or was
/// deleted). Every other variant means the store itself failed.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("{kind} metric not found: {name}")]
    NotFound { kind: MetricKind, name: String },

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    /// Applying the delta would take the counter past the `i64` range.
    /// Nothing is written.
    #[error("counter {name} would overflow")]
    CounterOverflow { name: String },
}

impl StateError {
    pub fn not_found(kind: MetricKind, name: &str) -> Self {
        StateError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, StateError::CounterOverflow { .. })
    }
}
