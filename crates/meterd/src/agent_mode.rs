//! Agent mode — samples this host and reports to a server.
//!
//! Runs until a shutdown signal. Under the `abort` failure policy a failed
//! send stops the agent with an error so a supervisor can restart it.

use meter_agent::{Agent, RuntimeCollector};
use meter_core::AgentConfig;
use tokio::sync::watch;
use tracing::info;

pub async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    info!("meterd starting in agent mode");

    let mut agent = Agent::from_config(Box::new(RuntimeCollector::new()), &config)?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        crate::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    agent.run(shutdown_rx).await?;

    info!("meterd agent stopped");
    Ok(())
}
