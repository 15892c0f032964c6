//! Delivery errors.

use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to encode batch: {0}")]
    Encode(String),

    #[error("invalid request: {0}")]
    Request(String),

    /// No response within the request timeout. The only retryable case.
    #[error("request timed out (attempt {attempt})")]
    Timeout { attempt: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ReportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReportError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_retry() {
        assert!(ReportError::Timeout { attempt: 1 }.is_retryable());
        assert!(!ReportError::Transport("connection refused".into()).is_retryable());
        assert!(
            !ReportError::Status {
                status: 500,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!ReportError::Encode("nan".into()).is_retryable());
    }
}
