//! redb table definitions for the snapshot sink.

use redb::TableDefinition;

/// Serialized snapshots keyed by slot name. Only [`LATEST_SNAPSHOT`] is used.
pub const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

/// Key of the single snapshot slot; each flush replaces it.
pub const LATEST_SNAPSHOT: &str = "latest";
