//! Monitored node data model and snapshot persistence.
//!
//! Records produced by a single monitoring cycle are compared with the
//! previous cycle's records using [`changes::calculate`], summarized with
//! [`stats::Statistics`] and persisted with [`snapshot::SnapshotStore`].

pub mod address;
pub mod changes;
pub mod record;
pub mod snapshot;
pub mod stats;
pub mod timestamp;

pub use address::Address;
pub use changes::{ChangeEntry, Changes};
pub use record::{HardwareClass, NodeDescriptor, NodeRecord, RecordSet};
pub use snapshot::{History, HistoryEntry, SnapshotStore, StoreError};
pub use stats::{ActivityBucket, Statistics};
pub use time::OffsetDateTime;
