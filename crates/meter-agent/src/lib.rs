//! meter-agent — samples runtime statistics and ships them to the server.
//!
//! - [`collector`]: one batch of gauges plus the `PollCount` counter per tick.
//! - [`client`]: gzip-encoded batch delivery with timeout-only retry.
//! - [`agent`]: the two-timer loop tying them together.

pub mod agent;
pub mod client;
pub mod collector;
pub mod error;

#[cfg(test)]
mod test_support;

pub use agent::{Agent, AgentPhase};
pub use client::{ReportingClient, RetryPolicy, encode_batch};
pub use collector::{Collector, RuntimeCollector};
pub use error::{ReportError, ReportResult};
