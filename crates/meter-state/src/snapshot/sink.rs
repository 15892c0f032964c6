//! Durable destinations for snapshots.
//!
//! A sink holds exactly one snapshot. `save` replaces it wholesale and must
//! never leave a half-written copy behind; `load` returns `None` when
//! nothing has been saved yet and an error when what was saved is corrupt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{LATEST_SNAPSHOT, SNAPSHOTS};
use crate::types::Snapshot;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Read the latest snapshot, if any.
    async fn load(&self) -> StateResult<Option<Snapshot>>;

    /// Overwrite the stored snapshot.
    async fn save(&self, snapshot: &Snapshot) -> StateResult<()>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

// ── JSON file ──────────────────────────────────────────────────

/// Snapshot stored as a JSON file.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the target,
/// so readers only ever see a complete snapshot.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotSink for FileSink {
    async fn load(&self) -> StateResult<Option<Snapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Snapshot::from_json(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no snapshot file, starting empty");
                Ok(None)
            }
            Err(e) => Err(StateError::Io(format!("read {}: {e}", self.path.display()))),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> StateResult<()> {
        let bytes = snapshot.to_json()?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StateError::Io(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StateError::Io(format!("rename to {}: {e}", self.path.display())))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// ── redb ───────────────────────────────────────────────────────

/// Snapshot stored under a single key of a redb table.
///
/// Each save replaces the key inside one write transaction, so a crash
/// leaves either the previous or the new snapshot.
#[derive(Clone)]
pub struct RedbSink {
    db: Arc<Database>,
    label: String,
}

impl RedbSink {
    /// Open (or create) a redb snapshot database at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let sink = Self {
            db: Arc::new(db),
            label: path.display().to_string(),
        };
        sink.ensure_tables()?;
        debug!(?path, "redb snapshot sink opened");
        Ok(sink)
    }

    /// Create an ephemeral in-memory sink (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let sink = Self {
            db: Arc::new(db),
            label: "memory".to_string(),
        };
        sink.ensure_tables()?;
        Ok(sink)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotSink for RedbSink {
    async fn load(&self) -> StateResult<Option<Snapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        match table.get(LATEST_SNAPSHOT).map_err(map_err!(Snapshot))? {
            Some(guard) => Snapshot::from_json(guard.value()).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> StateResult<()> {
        let value = snapshot.to_json()?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            table
                .insert(LATEST_SNAPSHOT, value.as_slice())
                .map_err(map_err!(Snapshot))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("redb:{}", self.label)
    }
}
