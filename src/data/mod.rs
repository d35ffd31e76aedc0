//! Data Module
//!
//! The primary record file the hash index points into.
//!
//! ## Responsibilities
//! - Append serialized creatures and hand back their offsets
//! - Read a creature back from an offset, verifying its checksum
//! - Tombstone records in place (soft delete)
//! - Keep the last assigned id in the file header
//! - Full scans for index rebuilds

mod creature;
mod store;

pub use creature::Creature;
pub use store::{DataIterator, DataStore, StoredRecord};
