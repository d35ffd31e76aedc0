//! Dynamic Hash Index
//!
//! Insert, lookup, update and delete over a `Directory` and a `BucketStore`.
//!
//! ## Splitting
//! A bucket holds `load_factor - 1` records in normal operation; the last
//! physical slot absorbs the record that triggers a split. On split the
//! bucket's local depth `d` grows by one, the directory doubles first when
//! `d == global_depth`, and records are partitioned on key bit `d`:
//!
//! ```text
//!   before (d = 1, p = 2)          after (d = 2, p = 2)
//!   slot 00 ─┐                     slot 00 ──▶ [A] keys ≡ 0 (mod 4)
//!   slot 10 ─┴─▶ [A] keys ≡ 0      slot 10 ──▶ [C] keys ≡ 2 (mod 4)
//! ```
//!
//! ## Merging
//! A bucket emptied by a delete is folded into its buddy (the slot that
//! differs in bit `d - 1`) when the buddy has the same local depth. The
//! emptied slot goes to the free list. Merges do not cascade.

use std::iter;

use crate::error::{BestiaryError, Result};

use super::{Bucket, BucketRecord, BucketStore, Directory};

/// Directory slot of the buddy of `pos` for a bucket of depth `local_depth`
///
/// The buddy differs from `pos` only in bit `local_depth - 1`. A bucket of
/// depth 0 owns every slot and has no buddy.
pub fn buddy_index(pos: usize, local_depth: u32) -> Option<usize> {
    if local_depth == 0 {
        return None;
    }
    Some(pos ^ (1usize << (local_depth - 1)))
}

/// Slots that keep and receive records when a bucket of depth `local_depth`
/// reached through `pos` is split
///
/// The first slot is the lowest one pointing at the bucket (bit
/// `local_depth` clear); the second differs only in that bit. This holds
/// whether `pos` itself sits in the lower or the upper half.
pub fn split_image(pos: usize, local_depth: u32) -> (usize, usize) {
    let stride = 1usize << local_depth;
    let low = pos & (stride - 1);
    (low, low + stride)
}

/// Whether `key` has bit `bit` set
fn key_bit(key: i64, bit: u32) -> bool {
    (key as u64 >> bit) & 1 == 1
}

/// Outcome of one split
enum Split {
    /// Incoming record written into one of the two halves
    Placed,
    /// Both halves written without the incoming record, whose half was
    /// already physically full; the caller retries the insert
    Deferred,
}

/// Borrowed view of an open index
pub struct DynamicHash<'a> {
    directory: &'a mut Directory,
    store: &'a mut BucketStore,
    max_global_depth: u32,
}

impl<'a> DynamicHash<'a> {
    pub fn new(
        directory: &'a mut Directory,
        store: &'a mut BucketStore,
        max_global_depth: u32,
    ) -> Self {
        Self {
            directory,
            store,
            max_global_depth,
        }
    }

    /// Records a bucket holds before the next insert splits it
    fn split_threshold(&self) -> usize {
        self.store.load_factor() - 1
    }

    /// Data offset stored for `key`
    ///
    /// Fails with `NotFound` if the key is not indexed.
    pub fn lookup(&mut self, key: i64) -> Result<u64> {
        let (_, _, bucket) = self.locate(key)?;
        bucket.get(key).ok_or(BestiaryError::NotFound)
    }

    /// Index `key` at `data_offset`
    ///
    /// The caller guarantees `key` is not already indexed. Fails with
    /// `DirectoryFull` before touching the bucket file if placing the key
    /// would grow the directory past the configured depth.
    pub fn insert(&mut self, key: i64, data_offset: u64) -> Result<()> {
        let record = BucketRecord::new(key, data_offset);

        loop {
            let (pos, offset, mut bucket) = self.locate(key)?;

            if bucket.len() < self.split_threshold() {
                bucket.push(record);
                self.store.write_bucket(offset, &bucket)?;
                tracing::trace!("Indexed key {} in bucket at offset {}", key, offset);
                return Ok(());
            }

            self.check_split_depth(&bucket, key)?;

            match self.split(pos, offset, bucket, record)? {
                Split::Placed => return Ok(()),
                Split::Deferred => {
                    tracing::debug!("Split left key {} without room, splitting again", key);
                }
            }
        }
    }

    /// Point `key` at a new data offset
    ///
    /// Fails with `NotFound` if the key is not indexed.
    pub fn update(&mut self, key: i64, data_offset: u64) -> Result<()> {
        let (_, offset, mut bucket) = self.locate(key)?;
        if !bucket.set_offset(key, data_offset) {
            return Err(BestiaryError::NotFound);
        }
        self.store.write_bucket(offset, &bucket)
    }

    /// Remove `key`, returning the data offset it pointed at
    ///
    /// Fails with `NotFound` if the key is not indexed. A bucket emptied by
    /// the removal is merged into its buddy when their depths match.
    pub fn delete(&mut self, key: i64) -> Result<u64> {
        let (pos, offset, mut bucket) = self.locate(key)?;
        let removed = bucket.remove(key).ok_or(BestiaryError::NotFound)?;
        self.store.write_bucket(offset, &bucket)?;

        if bucket.is_empty() {
            self.merge(pos, offset, bucket.local_depth)?;
        }

        Ok(removed.data_offset)
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Resolve `key` to (directory slot, bucket offset, bucket)
    fn locate(&mut self, key: i64) -> Result<(usize, u64, Bucket)> {
        let pos = self.directory.index(key);
        let offset = self.directory.pointer(pos);
        let bucket = self.store.read_bucket(offset)?;

        if bucket.local_depth > self.directory.global_depth() {
            return Err(BestiaryError::CorruptBucket(format!(
                "bucket at offset {} has local depth {} above global depth {}",
                offset,
                bucket.local_depth,
                self.directory.global_depth()
            )));
        }

        Ok((pos, offset, bucket))
    }

    /// Replay the splits needed to place `key` next to `bucket`'s records
    /// without writing anything
    ///
    /// Each split partitions on bit `depth`; the key's half becomes the next
    /// candidate while it still exceeds the physical slot.
    fn check_split_depth(&self, bucket: &Bucket, key: i64) -> Result<()> {
        let capacity = self.store.load_factor();
        let mut global_depth = self.directory.global_depth();
        let mut depth = bucket.local_depth;
        let mut keys: Vec<i64> = bucket.records().iter().map(|r| r.key).collect();
        keys.push(key);

        loop {
            if depth == global_depth {
                if global_depth >= self.max_global_depth {
                    return Err(BestiaryError::DirectoryFull {
                        max_depth: self.max_global_depth,
                    });
                }
                global_depth += 1;
            }

            let side = key_bit(key, depth);
            keys.retain(|&k| key_bit(k, depth) == side);
            depth += 1;

            if keys.len() <= capacity {
                return Ok(());
            }
        }
    }

    /// Split the bucket at `offset` (reached through slot `pos`) and place `incoming`
    fn split(
        &mut self,
        pos: usize,
        offset: u64,
        mut bucket: Bucket,
        incoming: BucketRecord,
    ) -> Result<Split> {
        let depth = bucket.local_depth;

        if depth == self.directory.global_depth() {
            if depth >= self.max_global_depth {
                return Err(BestiaryError::DirectoryFull {
                    max_depth: self.max_global_depth,
                });
            }
            self.directory.double_global_depth();
            tracing::debug!(
                "Directory doubled to global depth {} ({} slots)",
                self.directory.global_depth(),
                self.directory.len()
            );
        }

        let new_offset = self.store.allocate(1, self.directory.global_depth(), self.directory)?[0];
        let (_, moved) = split_image(pos, depth);
        let new_depth = depth + 1;

        let mut lower = Bucket::new(new_depth);
        let mut upper = Bucket::new(new_depth);
        for record in bucket.take_records().into_iter().chain(iter::once(incoming)) {
            if key_bit(record.key, depth) {
                upper.push(record);
            } else {
                lower.push(record);
            }
        }

        // The incoming record sits last in whichever half it joined
        let capacity = self.store.load_factor();
        let deferred = if lower.len() > capacity {
            lower = Bucket::with_records(new_depth, lower.records()[..capacity].to_vec());
            true
        } else if upper.len() > capacity {
            upper = Bucket::with_records(new_depth, upper.records()[..capacity].to_vec());
            true
        } else {
            false
        };

        self.store.write_bucket(offset, &lower)?;
        self.store.write_bucket(new_offset, &upper)?;
        self.directory.repoint(moved, new_depth, new_offset);

        tracing::debug!(
            "Split bucket at offset {} (depth {} -> {}): {} records stay, {} move to offset {}",
            offset,
            depth,
            new_depth,
            lower.len(),
            upper.len(),
            new_offset
        );

        Ok(if deferred { Split::Deferred } else { Split::Placed })
    }

    /// Fold the empty bucket at `offset` into its buddy
    fn merge(&mut self, pos: usize, offset: u64, local_depth: u32) -> Result<()> {
        let buddy_pos = match buddy_index(pos, local_depth) {
            Some(buddy_pos) => buddy_pos,
            None => {
                tracing::trace!("Bucket at offset {} owns the whole directory, not merging", offset);
                return Ok(());
            }
        };

        let buddy_offset = self.directory.pointer(buddy_pos);
        if buddy_offset == offset {
            return Ok(());
        }

        let mut buddy = self.store.read_bucket(buddy_offset)?;
        if buddy.local_depth != local_depth {
            tracing::trace!(
                "Buddy at offset {} has depth {}, expected {}; not merging",
                buddy_offset,
                buddy.local_depth,
                local_depth
            );
            return Ok(());
        }

        buddy.local_depth -= 1;
        self.store.write_bucket(buddy_offset, &buddy)?;
        self.directory.replace_pointer(offset, buddy_offset);
        self.directory.release(offset);

        tracing::debug!(
            "Merged empty bucket at offset {} into buddy at offset {} (depth {} -> {})",
            offset,
            buddy_offset,
            local_depth,
            buddy.local_depth
        );
        Ok(())
    }
}
