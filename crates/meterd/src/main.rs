//! meterd — metrics collection server and reporting agent.
//!
//! One binary, two modes:
//! - `server`: HTTP API over a volatile, snapshotting, or SQLite repository
//! - `agent`: samples host and process statistics and posts them in batches
//!
//! # Usage
//!
//! ```text
//! meterd server -a 0.0.0.0:8080 -i 60 -f /var/lib/meterd/metrics.json
//! meterd agent -a http://collector:8080 -p 2 -r 10
//! ```

mod agent_mode;
mod cli;
mod server_mode;

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,meterd=debug,meter=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Server(args) => server_mode::run_server(args.resolve()?).await,
        Command::Agent(args) => agent_mode::run_agent(args.resolve()?).await,
    }
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
