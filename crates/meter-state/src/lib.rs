//! meter-state — metric repository for meterd.
//!
//! Holds the latest value of every gauge and the running sum of every
//! counter behind the [`Repository`] trait. Three backends are provided and
//! chosen at construction time:
//!
//! - [`VolatileStore`]: two maps, each behind its own `RwLock`, so gauge and
//!   counter traffic never contend.
//! - [`SnapshotPersister`]: a `VolatileStore` plus a background task that
//!   periodically overwrites a durable [`SnapshotSink`] (JSON file or redb)
//!   with the full state, and restores it at startup.
//! - [`RelationalStore`]: SQLite via sqlx, with versioned migrations and
//!   transactional batches.
//!
//! # Batch atomicity
//!
//! The memory backends apply a batch of one kind under a single write lock;
//! gauge and counter batches are independent. The relational backend commits
//! a mixed batch ([`Repository::apply_batch`]) in one transaction, so either
//! every entry lands or none does.

pub mod error;
pub mod relational;
pub mod repository;
pub mod snapshot;
pub mod tables;
pub mod types;
pub mod volatile;

pub use error::{StateError, StateResult};
pub use relational::RelationalStore;
pub use repository::{Repository, SharedRepository};
pub use snapshot::{FileSink, RedbSink, SnapshotPersister, SnapshotSink};
pub use types::*;
pub use volatile::VolatileStore;
