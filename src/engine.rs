//! Engine Module
//!
//! The record-management service that coordinates the data file and the
//! hash index.
//!
//! ## Responsibilities
//! - Assign ids and append creatures to the data file
//! - Keep the hash index in step with every create/update/delete
//! - Build the index from a full scan when it is missing
//! - Paged listing through the index
//! - Field search over live records

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::{Config, SyncStrategy};
use crate::data::{Creature, DataStore};
use crate::error::{BestiaryError, Result};
use crate::index::{Directory, HashIndex, IndexDump};
use crate::search::{self, SearchField};

/// The main record engine
///
/// ## Concurrency Model: Single Writer
///
/// Every index call reopens the index files, so two overlapping mutations
/// would race on the directory. All operations, reads included, therefore
/// run under one `store` lock; the data file and the index change together
/// inside that critical section.
///
/// There is no atomicity across the two files: a crash between appending a
/// record and indexing it leaves them out of step until `rebuild_index`.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Data file, doubling as the single-writer lock
    store: Mutex<DataStore>,

    /// Hash index over creature ids
    index: HashIndex,

    directory_path: PathBuf,
    bucket_path: PathBuf,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const DATA_FILENAME: &'static str = "creatures.bin";
    const DIRECTORY_FILENAME: &'static str = "hash_directory.bin";
    const BUCKETS_FILENAME: &'static str = "hash_buckets.bin";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Open/create the data file
    /// 3. Open the hash index, or build it from a full scan if missing
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Compute paths (derived from data_dir, not configurable)
        let data_path = config.data_dir.join(Self::DATA_FILENAME);
        let directory_path = config.data_dir.join(Self::DIRECTORY_FILENAME);
        let bucket_path = config.data_dir.join(Self::BUCKETS_FILENAME);

        // Step 3: Open data file
        let sync_writes = config.sync_strategy == SyncStrategy::EveryWrite;
        let mut store = DataStore::open(&data_path, sync_writes)?;

        // Step 4: Open or build the index
        let index = if Directory::exists(&directory_path) && bucket_path.exists() {
            HashIndex::open(&directory_path, config.index_options())?
        } else {
            tracing::info!("Hash index missing, building from {}", data_path.display());
            Self::build_index(&mut store, &directory_path, &bucket_path, &config)?.0
        };

        Ok(Self {
            config,
            store: Mutex::new(store),
            index,
            directory_path,
            bucket_path,
        })
    }

    /// Store a new creature and return its assigned id
    ///
    /// Steps:
    /// 1. Take `last_id + 1` as the id
    /// 2. Append the record
    /// 3. Persist the new last id
    /// 4. Index id → offset
    ///
    /// If step 3 or 4 fails the new frame is tombstoned, so no live frame
    /// exists without an index entry. The id is not reused.
    pub fn create(&self, mut creature: Creature) -> Result<i64> {
        let mut store = self.store.lock();

        let id = store.last_id() + 1;
        creature.id = id;

        let offset = store.append_creature(&creature)?;
        if let Err(e) = store
            .set_last_id(id)
            .and_then(|_| self.index.create(id, offset))
        {
            Self::discard_frame(&mut store, offset);
            return Err(e);
        }

        tracing::debug!("Created creature {} ({}) at offset {}", id, creature.name, offset);
        Ok(id)
    }

    /// Read a creature by id
    pub fn read(&self, id: i64) -> Result<Creature> {
        let mut store = self.store.lock();
        Self::read_locked(&mut store, &self.index, id)
    }

    /// Replace a creature; `creature.id` selects the record
    ///
    /// The new frame is appended and the index repointed before the old
    /// frame is tombstoned; a failed repoint tombstones the new frame instead.
    pub fn update(&self, creature: &Creature) -> Result<()> {
        let mut store = self.store.lock();

        let old_offset = self.index.read(creature.id)?;
        let new_offset = store.append_creature(creature)?;
        if let Err(e) = self.index.update(creature.id, new_offset) {
            Self::discard_frame(&mut store, new_offset);
            return Err(e);
        }
        store.soft_delete(old_offset)?;

        tracing::debug!(
            "Updated creature {}: offset {} -> {}",
            creature.id,
            old_offset,
            new_offset
        );
        Ok(())
    }

    /// Delete a creature by id, returning the removed record
    pub fn delete(&self, id: i64) -> Result<Creature> {
        let mut store = self.store.lock();

        let offset = self.index.read(id)?;
        let record = store.read_at(offset)?;
        self.index.delete(id)?;
        store.soft_delete(offset)?;

        tracing::debug!("Deleted creature {} at offset {}", id, offset);
        Ok(record.creature)
    }

    /// Creatures on page `page` (zero-based), walking ids upward through the index
    ///
    /// Deleted ids are skipped, so a page holds up to `page_size` live
    /// creatures starting after the first `page * page_size` ids.
    pub fn read_page(&self, page: usize) -> Result<Vec<Creature>> {
        let mut store = self.store.lock();

        let page_size = self.config.page_size;
        let last_id = store.last_id();
        let mut creatures = Vec::with_capacity(page_size);
        let mut id = (page * page_size) as i64 + 1;

        while creatures.len() < page_size && id <= last_id {
            match Self::read_locked(&mut store, &self.index, id) {
                Ok(creature) => creatures.push(creature),
                Err(BestiaryError::NotFound) => {}
                Err(e) => return Err(e),
            }
            id += 1;
        }

        Ok(creatures)
    }

    /// Case-insensitive substring search over one field of every live creature
    ///
    /// Returns `(id, match count)` for each creature with at least one
    /// match, in data file order. Overlapping matches are counted.
    pub fn search(&self, field: SearchField, needle: &str) -> Result<Vec<(i64, usize)>> {
        let mut store = self.store.lock();

        let mut hits = Vec::new();
        for record in store.iter()? {
            let record = record?;
            if record.deleted {
                continue;
            }
            let count = search::count_matches(&field.text(&record.creature), needle);
            if count > 0 {
                hits.push((record.creature.id, count));
            }
        }

        tracing::debug!("Search {} for {:?}: {} creatures", field, needle, hits.len());
        Ok(hits)
    }

    /// Number of listing pages for the ids assigned so far
    pub fn page_count(&self) -> usize {
        let last_id = self.store.lock().last_id().max(0) as usize;
        last_id.div_ceil(self.config.page_size)
    }

    /// Throw the index away and rebuild it from the data file
    ///
    /// Returns the number of live records indexed.
    pub fn rebuild_index(&self) -> Result<usize> {
        let mut store = self.store.lock();
        let (_, count) = Self::build_index(
            &mut store,
            &self.directory_path,
            &self.bucket_path,
            &self.config,
        )?;
        Ok(count)
    }

    /// Diagnostic dump of the index
    pub fn dump_index(&self) -> Result<IndexDump> {
        let _guard = self.store.lock();
        self.index.dump()
    }

    /// Close the engine gracefully, syncing the data file
    pub fn close(self) -> Result<()> {
        let mut store = self.store.into_inner();
        store.sync()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Highest id assigned so far
    pub fn last_id(&self) -> i64 {
        self.store.lock().last_id()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Tombstone a frame written by an operation that then failed
    fn discard_frame(store: &mut DataStore, offset: u64) {
        if let Err(e) = store.soft_delete(offset) {
            tracing::warn!("Failed to tombstone orphan frame at offset {}: {}", offset, e);
        }
    }

    /// Lookup through the index, with the store lock already held
    fn read_locked(store: &mut DataStore, index: &HashIndex, id: i64) -> Result<Creature> {
        let offset = index.read(id)?;
        let record = store.read_at(offset)?;

        if record.deleted || record.creature.id != id {
            return Err(BestiaryError::CorruptRecord(format!(
                "index maps id {} to offset {}, which holds {} creature {}",
                id,
                offset,
                if record.deleted { "deleted" } else { "live" },
                record.creature.id
            )));
        }
        Ok(record.creature)
    }

    /// Build the index from every live frame in the data file, returning it
    /// with the number of records indexed
    ///
    /// If several live frames carry one id, the last one in the file wins.
    fn build_index(
        store: &mut DataStore,
        directory_path: &Path,
        bucket_path: &Path,
        config: &Config,
    ) -> Result<(HashIndex, usize)> {
        let mut entries = BTreeMap::new();
        let mut skipped = 0usize;
        for record in store.iter()? {
            let record = match record {
                Ok(record) => record,
                // A torn append leaves a bad tail frame; index what precedes it
                Err(BestiaryError::CorruptRecord(msg)) => {
                    tracing::warn!("Skipping data file tail after corrupt frame: {}", msg);
                    break;
                }
                Err(e) => return Err(e),
            };
            if record.deleted {
                skipped += 1;
            } else {
                entries.insert(record.creature.id, record.offset);
            }
        }

        tracing::debug!(
            "Scanned data file: {} live records, {} tombstones",
            entries.len(),
            skipped
        );

        let count = entries.len();
        let index = HashIndex::build(directory_path, bucket_path, config.index_options(), entries)?;
        Ok((index, count))
    }
}
