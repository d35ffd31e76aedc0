//! # Bestiary
//!
//! A creature record store with:
//! - An append-only data file with checksummed frames and soft deletes
//! - A disk-resident extendible hash index from id to record offset
//! - Bucket splitting, directory doubling, bucket merging and slot reuse
//! - Single-writer access through the engine
//! - Case-insensitive field search over live creatures
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │             create / read / update / delete                  │
//! │                  (single-writer lock)                        │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//!                ▼                               ▼
//!   ┌─────────────────────┐         ┌─────────────────────────┐
//!   │      DataStore      │         │   HashIndex (facade)    │
//!   │  creatures.bin      │         │  open → op → close      │
//!   │  append / read_at / │         └────────────┬────────────┘
//!   │  soft_delete        │                      │
//!   └─────────────────────┘                      ▼
//!                                   ┌─────────────────────────┐
//!                                   │ Session + DynamicHash   │
//!                                   ├────────────┬────────────┤
//!                                   │ Directory  │ BucketStore│
//!                                   └────────────┴────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod codec;

pub mod index;
pub mod data;
pub mod engine;
pub mod search;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BestiaryError, Result};
pub use config::{Config, IndexOptions, SyncStrategy};
pub use data::Creature;
pub use engine::Engine;
pub use index::HashIndex;
pub use search::SearchField;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Bestiary
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
