//! Persistent storage for namespace generations.
//!
//! One namespace directory holds one checksummed snapshot file, replaced
//! atomically on every persist.

pub mod snapshot;

pub use snapshot::{Snapshot, StagedSnapshot, SNAPSHOT_FILE};
