//! Command-line interface.
//!
//! Every setting can come from four places. Later sources win:
//! built-in defaults, the `--config` TOML file, environment variables,
//! command-line flags. Flags and variables are optional here so that an
//! unset one leaves the file's value alone.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use meter_core::{AgentConfig, FailurePolicy, ServerConfig, SnapshotFormat};

#[derive(Parser)]
#[command(name = "meterd", about = "Metrics collection server and reporting agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Accept metrics over HTTP and store them.
    Server(ServerArgs),
    /// Sample this host and report to a server.
    Agent(AgentArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// TOML configuration file.
    #[arg(long, env = "METERD_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on (host:port).
    #[arg(short, long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between snapshot flushes; 0 flushes continuously.
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Snapshot location; empty disables snapshots.
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<PathBuf>,

    /// Load the snapshot at startup.
    #[arg(short, long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// SQLite DSN; when set, metrics go to the database instead of memory.
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Snapshot encoding: json or redb.
    #[arg(long, env = "SNAPSHOT_FORMAT")]
    pub snapshot_format: Option<SnapshotFormat>,
}

impl ServerArgs {
    pub fn resolve(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(interval) = self.store_interval {
            config.store_interval = interval;
        }
        if let Some(path) = self.file_storage_path {
            config.file_storage_path = path;
        }
        if let Some(restore) = self.restore {
            config.restore = restore;
        }
        if let Some(dsn) = self.database_dsn {
            config.database_dsn = dsn;
        }
        if let Some(format) = self.snapshot_format {
            config.snapshot_format = format;
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Default)]
pub struct AgentArgs {
    /// TOML configuration file.
    #[arg(long, env = "METERD_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Server address (host:port or http://host:port).
    #[arg(short, long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between samples.
    #[arg(short, long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Seconds between sends.
    #[arg(short, long, env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Per-attempt request timeout in milliseconds.
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Attempts per send, including the first.
    #[arg(long, env = "MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// First retry delay in milliseconds; doubles on each retry.
    #[arg(long, env = "RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    /// What to do when a send fails: abort or retain.
    #[arg(long, env = "ON_FAILURE")]
    pub on_failure: Option<FailurePolicy>,
}

impl AgentArgs {
    pub fn resolve(self) -> anyhow::Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_file(path)?,
            None => AgentConfig::default(),
        };
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(interval) = self.report_interval {
            config.report_interval = interval;
        }
        if let Some(timeout) = self.request_timeout_ms {
            config.request_timeout_ms = timeout;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry_delay_ms = delay;
        }
        if let Some(policy) = self.on_failure {
            config.on_failure = policy;
        }
        anyhow::ensure!(config.poll_interval > 0, "poll interval must be at least 1 second");
        anyhow::ensure!(config.report_interval > 0, "report interval must be at least 1 second");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn server_flags_override_defaults() {
        let args = ServerArgs {
            address: Some("0.0.0.0:9090".into()),
            store_interval: Some(0),
            restore: Some(false),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.address, "0.0.0.0:9090");
        assert_eq!(config.store_interval, 0);
        assert!(!config.restore);
        assert_eq!(config.file_storage_path, PathBuf::from("/tmp/metrics-db.json"));
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "address = \"10.0.0.1:8080\"\nstore_interval = 60").unwrap();

        let args = ServerArgs {
            config: Some(file.path().to_path_buf()),
            store_interval: Some(5),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.address, "10.0.0.1:8080");
        assert_eq!(config.store_interval, 5);
    }

    #[test]
    fn agent_defaults() {
        let config = AgentArgs::default().resolve().unwrap();
        assert_eq!(config.poll_interval, 2);
        assert_eq!(config.report_interval, 10);
        assert_eq!(config.on_failure, FailurePolicy::Abort);
    }

    #[test]
    fn agent_rejects_zero_interval() {
        let args = AgentArgs {
            poll_interval: Some(0),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from([
            "meterd", "agent", "-a", "http://127.0.0.1:9000", "-p", "1", "--on-failure", "retain",
        ])
        .unwrap();
        match cli.command {
            Command::Agent(args) => {
                assert_eq!(args.address.as_deref(), Some("http://127.0.0.1:9000"));
                assert_eq!(args.poll_interval, Some(1));
                assert_eq!(args.on_failure, Some(FailurePolicy::Retain));
            }
            Command::Server(_) => panic!("expected agent"),
        }

        let cli = Cli::try_parse_from(["meterd", "server", "-r", "false", "--snapshot-format", "redb"])
            .unwrap();
        match cli.command {
            Command::Server(args) => {
                assert_eq!(args.restore, Some(false));
                assert_eq!(args.snapshot_format, Some(SnapshotFormat::Redb));
            }
            Command::Agent(_) => panic!("expected server"),
        }
    }
}
