pub mod config;
pub mod error;
pub mod metric;

pub use config::{AgentConfig, FailurePolicy, ServerConfig, SnapshotFormat};
pub use error::{MetricError, MetricResult};
pub use metric::*;
