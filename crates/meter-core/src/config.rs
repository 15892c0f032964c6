//! meterd.toml configuration parser.
//!
//! Both the server and the agent read an optional TOML file. Missing keys
//! fall back to the defaults below; the binary layers environment variables
//! and command-line flags on top.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Durable format written by the snapshot persister.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    /// Plain JSON file, overwritten via temp file + rename.
    #[default]
    Json,
    /// Single-key redb database.
    Redb,
}

impl FromStr for SnapshotFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(SnapshotFormat::Json),
            "redb" => Ok(SnapshotFormat::Redb),
            other => Err(format!("unknown snapshot format: {other}")),
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFormat::Json => f.write_str("json"),
            SnapshotFormat::Redb => f.write_str("redb"),
        }
    }
}

/// What the agent does once a send attempt has failed for good.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the agent with an error. Unsent metrics are lost.
    #[default]
    Abort,
    /// Keep the buffer and try again on the next send tick.
    Retain,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "retain" => Ok(FailurePolicy::Retain),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => f.write_str("abort"),
            FailurePolicy::Retain => f.write_str("retain"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub address: String,
    /// Seconds between snapshot flushes. Zero flushes continuously.
    pub store_interval: u64,
    /// Snapshot location. Empty disables snapshotting.
    pub file_storage_path: PathBuf,
    /// Restore the latest snapshot at startup.
    pub restore: bool,
    /// Relational store DSN. Takes precedence over snapshotting when set.
    pub database_dsn: String,
    pub snapshot_format: SnapshotFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            store_interval: 300,
            file_storage_path: PathBuf::from("/tmp/metrics-db.json"),
            restore: true,
            database_dsn: String::new(),
            snapshot_format: SnapshotFormat::Json,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collection server, `host:port` or `http://host:port`.
    pub address: String,
    /// Seconds between collection ticks.
    pub poll_interval: u64,
    /// Seconds between send ticks.
    pub report_interval: u64,
    /// Per-attempt request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Total attempts per send, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub retry_delay_ms: u64,
    pub on_failure: FailurePolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            poll_interval: 2,
            report_interval: 10,
            request_timeout_ms: 5000,
            max_attempts: 5,
            retry_delay_ms: 1000,
            on_failure: FailurePolicy::Abort,
        }
    }
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.store_interval, 300);
        assert!(config.restore);
        assert!(config.database_dsn.is_empty());
    }

    #[test]
    fn parse_partial_server_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
address = "0.0.0.0:9090"
store_interval = 0
snapshot_format = "redb"
"#,
        )
        .unwrap();
        assert_eq!(config.address, "0.0.0.0:9090");
        assert_eq!(config.store_interval, 0);
        assert_eq!(config.snapshot_format, SnapshotFormat::Redb);
        // Untouched keys keep their defaults.
        assert_eq!(config.file_storage_path, PathBuf::from("/tmp/metrics-db.json"));
    }

    #[test]
    fn agent_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "poll_interval = 1\non_failure = \"retain\"\n").unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.poll_interval, 1);
        assert_eq!(config.report_interval, 10);
        assert_eq!(config.on_failure, FailurePolicy::Retain);
    }

    #[test]
    fn enum_from_str() {
        assert_eq!("JSON".parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Json);
        assert!("yaml".parse::<SnapshotFormat>().is_err());
        assert_eq!("abort".parse::<FailurePolicy>().unwrap(), FailurePolicy::Abort);
        assert!("ignore".parse::<FailurePolicy>().is_err());
    }
}
