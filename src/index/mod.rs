//! Hash Index Module
//!
//! Disk-resident extendible hash mapping a creature id to the byte offset of
//! its record in the data file.
//!
//! ## Responsibilities
//! - Address buckets through the low-order bits of the key
//! - Split full buckets, doubling the directory when needed
//! - Merge emptied buckets and recycle their slots
//! - Persist the directory and buckets across restarts
//!
//! ## Files
//! ```text
//! hash_directory.bin                      hash_buckets.bin
//! ┌──────────────────────────┐            ┌────────────────────────┐
//! │ bucket path, load factor │            │ slot 0: depth|size|... │
//! │ global depth p           │            ├────────────────────────┤
//! │ pointers[2^p] ───────────┼──────────▶ │ slot 1                 │
//! │ free list ───────────────┼──────────▶ │ ...                    │
//! └──────────────────────────┘            └────────────────────────┘
//! ```

mod bucket;
mod directory;
mod dump;
mod facade;
mod hash;
mod session;
mod store;

pub use bucket::{Bucket, BucketRecord};
pub use directory::{Directory, DirectoryHeader, INITIAL_GLOBAL_DEPTH};
pub use dump::{IndexDump, SlotDump};
pub use facade::HashIndex;
pub use hash::{buddy_index, split_image, DynamicHash};
pub use session::Session;
pub use store::BucketStore;
