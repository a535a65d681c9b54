//! SQLite snapshots of the symbolised tables.
//!
//! A snapshot lets reports be regenerated or queried after the profiled
//! process has exited.

mod schema;
mod writer;

pub use schema::SCHEMA_VERSION;
pub use writer::{Snapshot, SnapshotMeta, TopEntry, clock_total, open, query_top};
