//! Server mode — accepts metrics over HTTP.
//!
//! 1. Pick the repository backend from configuration
//! 2. Restore the last snapshot and start the flush task, if snapshots are on
//! 3. Serve the API until a shutdown signal
//! 4. Let in-flight requests finish, then wait for the final snapshot flush

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use meter_core::{ServerConfig, SnapshotFormat};
use meter_state::{
    FileSink, RedbSink, RelationalStore, SharedRepository, SnapshotPersister, SnapshotSink,
    VolatileStore,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// The chosen repository plus the persister behind it, when there is one.
pub struct Backend {
    pub repo: SharedRepository,
    pub persister: Option<SnapshotPersister>,
}

fn open_sink(path: &Path, format: SnapshotFormat) -> anyhow::Result<Arc<dyn SnapshotSink>> {
    let sink: Arc<dyn SnapshotSink> = match format {
        SnapshotFormat::Json => Arc::new(FileSink::new(path)),
        SnapshotFormat::Redb => Arc::new(RedbSink::open(path)?),
    };
    Ok(sink)
}

/// DSN → relational; file path → snapshotting memory; neither → plain memory.
pub async fn open_backend(config: &ServerConfig) -> anyhow::Result<Backend> {
    if !config.database_dsn.is_empty() {
        let store = RelationalStore::connect(&config.database_dsn).await?;
        info!("using relational store");
        return Ok(Backend {
            repo: Arc::new(store),
            persister: None,
        });
    }

    if !config.file_storage_path.as_os_str().is_empty() {
        let sink = open_sink(&config.file_storage_path, config.snapshot_format)?;
        let persister = SnapshotPersister::open(
            sink,
            Duration::from_secs(config.store_interval),
            config.restore,
        )
        .await?;
        info!(
            path = ?config.file_storage_path,
            format = %config.snapshot_format,
            interval = config.store_interval,
            restore = config.restore,
            "using snapshotting memory store"
        );
        return Ok(Backend {
            repo: Arc::new(persister.clone()),
            persister: Some(persister),
        });
    }

    info!("using volatile memory store");
    Ok(Backend {
        repo: Arc::new(VolatileStore::new()),
        persister: None,
    })
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    info!("meterd starting in server mode");

    let backend = open_backend(&config).await?;

    // ── Snapshot task ──────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let persister_handle = backend.persister.as_ref().map(|p| p.spawn(shutdown_rx));

    // ── API server ─────────────────────────────────────────────

    let router = meter_api::build_router(backend.repo);
    let listener = TcpListener::bind(config.address.as_str()).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(crate::shutdown_signal())
        .await?;

    // Requests have drained; now take the last snapshot.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = persister_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "snapshot persister failed");
                return Err(e.into());
            }
            Err(e) => anyhow::bail!("snapshot persister panicked: {e}"),
        }
    }

    info!("meterd server stopped");
    Ok(())
}
