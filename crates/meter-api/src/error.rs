//! Request-level errors and their HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meter_core::MetricError;
use meter_state::StateError;
use thiserror::Error;
use tracing::error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed literal, missing field, bad JSON, or an empty batch.
    #[error("{0}")]
    Validation(String),

    /// The metric type tag is not one this server knows. Answered with 501.
    #[error("{0}")]
    UnsupportedKind(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Storage(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::UnsupportedKind(_) => StatusCode::NOT_IMPLEMENTED,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MetricError> for DispatchError {
    fn from(e: MetricError) -> Self {
        if e.is_unsupported_kind() {
            DispatchError::UnsupportedKind(e.to_string())
        } else {
            DispatchError::Validation(e.to_string())
        }
    }
}

impl From<StateError> for DispatchError {
    fn from(e: StateError) -> Self {
        if e.is_not_found() {
            DispatchError::NotFound(e.to_string())
        } else if e.is_overflow() {
            DispatchError::Validation(e.to_string())
        } else {
            DispatchError::Storage(e.to_string())
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
            error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::MetricKind;

    #[test]
    fn metric_errors_map_to_statuses() {
        let unsupported: DispatchError = MetricError::UnsupportedKind("histogram".into()).into();
        assert_eq!(unsupported.status(), StatusCode::NOT_IMPLEMENTED);

        let missing: DispatchError = MetricError::MissingDelta { name: "c".into() }.into();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn state_errors_map_to_statuses() {
        let absent: DispatchError = StateError::not_found(MetricKind::Gauge, "g").into();
        assert_eq!(absent.status(), StatusCode::NOT_FOUND);

        let broken: DispatchError = StateError::Query("database is locked".into()).into();
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let overflow: DispatchError = StateError::CounterOverflow { name: "c".into() }.into();
        assert_eq!(overflow.status(), StatusCode::BAD_REQUEST);
    }
}
