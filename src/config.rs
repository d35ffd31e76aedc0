//! Configuration for Bestiary
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::codec::MAX_LOAD_FACTOR;
use crate::error::{BestiaryError, Result};

/// Main configuration for a Bestiary instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── creatures.bin        (append-only record file)
    ///     ├── hash_directory.bin   (hash index directory)
    ///     └── hash_buckets.bin     (hash index bucket slots)
    pub data_dir: PathBuf,

    /// Sync strategy: when to fsync data and index files
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Hash Index Configuration
    // -------------------------------------------------------------------------
    /// Usable records per bucket (the on-disk load factor is one more)
    pub bucket_records: usize,

    /// Upper bound on the directory's global depth
    pub max_global_depth: u32,

    // -------------------------------------------------------------------------
    // Listing Configuration
    // -------------------------------------------------------------------------
    /// Creatures per page returned by paged reads
    pub page_size: usize,
}

/// Sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append and every index session close (safest, slowest)
    EveryWrite,

    /// fsync only when the engine is closed
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./bestiary_data"),
            sync_strategy: SyncStrategy::OnClose,
            bucket_records: 8,
            max_global_depth: 24,
            page_size: 60,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values that would break the index layout
    pub fn validate(&self) -> Result<()> {
        if self.bucket_records == 0 || self.bucket_records >= MAX_LOAD_FACTOR {
            return Err(BestiaryError::Config(format!(
                "bucket_records must be in 1..{}, got {}",
                MAX_LOAD_FACTOR, self.bucket_records
            )));
        }
        if self.max_global_depth == 0 || self.max_global_depth > 48 {
            return Err(BestiaryError::Config(format!(
                "max_global_depth must be in 1..=48, got {}",
                self.max_global_depth
            )));
        }
        if self.page_size == 0 {
            return Err(BestiaryError::Config(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Index-level options derived from this config
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            bucket_records: self.bucket_records,
            max_global_depth: self.max_global_depth,
            sync_on_close: self.sync_strategy == SyncStrategy::EveryWrite,
        }
    }
}

/// Options for opening or building a hash index
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Usable records per bucket; only read when a new index is built
    pub bucket_records: usize,

    /// Upper bound on the directory's global depth
    pub max_global_depth: u32,

    /// fsync both index files when a session closes
    pub sync_on_close: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Config::default().index_options()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the usable records per bucket
    pub fn bucket_records(mut self, count: usize) -> Self {
        self.config.bucket_records = count;
        self
    }

    /// Set the maximum global depth of the directory
    pub fn max_global_depth(mut self, depth: u32) -> Self {
        self.config.max_global_depth = depth;
        self
    }

    /// Set the listing page size
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
