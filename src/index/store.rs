//! Bucket Store
//!
//! One growable file of fixed-size bucket slots. Slots are never truncated:
//! emptied buckets come back through the directory's free list and are
//! overwritten in place.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::{BestiaryError, Result};

use super::{Bucket, Directory};

/// File of fixed-size bucket slots
pub struct BucketStore {
    /// Path of the bucket file
    path: PathBuf,

    /// Open handle (read + write)
    file: File,

    /// Physical records per slot
    load_factor: usize,

    /// Bytes per slot (`16 + load_factor * 16`)
    slot_size: u64,

    /// Current file length, i.e. the offset the next appended slot gets
    len: u64,
}

impl BucketStore {
    /// Create (or truncate) a bucket file
    pub fn create(path: &Path, load_factor: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            load_factor,
            slot_size: codec::bucket_slot_size(load_factor),
            len: 0,
        })
    }

    /// Open an existing bucket file
    pub fn open(path: &Path, load_factor: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let slot_size = codec::bucket_slot_size(load_factor);

        if len % slot_size != 0 {
            return Err(BestiaryError::CorruptBucket(format!(
                "bucket file length {} is not a multiple of the slot size {}",
                len, slot_size
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            load_factor,
            slot_size,
            len,
        })
    }

    /// Write `count` empty buckets of depth `local_depth` and return their offsets
    ///
    /// Offsets come from the directory's free list first (oldest first), then
    /// from the end of the file.
    pub fn allocate(
        &mut self,
        count: usize,
        local_depth: u32,
        directory: &mut Directory,
    ) -> Result<Vec<u64>> {
        let empty = Bucket::new(local_depth);
        let mut offsets = Vec::with_capacity(count);

        for _ in 0..count {
            let offset = match directory.reclaim() {
                Some(offset) => {
                    tracing::trace!("Reusing bucket slot at offset {}", offset);
                    offset
                }
                None => self.len,
            };
            self.write_bucket(offset, &empty)?;
            offsets.push(offset);
        }

        Ok(offsets)
    }

    /// Read and decode the slot at `offset`
    pub fn read_bucket(&mut self, offset: u64) -> Result<Bucket> {
        self.check_offset(offset)?;

        let mut slot = vec![0u8; self.slot_size as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut slot).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => BestiaryError::CorruptBucket(format!(
                "slot at offset {} is truncated",
                offset
            )),
            _ => BestiaryError::Io(e),
        })?;

        codec::decode_bucket(&slot, self.load_factor)
    }

    /// Overwrite the slot at `offset`, or append when `offset` is the file end
    pub fn write_bucket(&mut self, offset: u64, bucket: &Bucket) -> Result<()> {
        if offset != self.len {
            self.check_offset(offset)?;
        }
        if bucket.len() > self.load_factor {
            return Err(BestiaryError::CorruptBucket(format!(
                "refusing to write {} records into a slot of capacity {}",
                bucket.len(),
                self.load_factor
            )));
        }

        let slot = codec::encode_bucket(bucket, self.load_factor);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&slot)?;

        if offset == self.len {
            self.len += self.slot_size;
        }
        Ok(())
    }

    /// Flush file contents to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Physical records per slot
    pub fn load_factor(&self) -> usize {
        self.load_factor
    }

    /// Bytes per slot
    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// Current file length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the file, live or reclaimed
    pub fn slot_count(&self) -> u64 {
        self.len / self.slot_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A valid offset is slot-aligned and inside the file
    fn check_offset(&self, offset: u64) -> Result<()> {
        if offset % self.slot_size != 0 || offset + self.slot_size > self.len {
            return Err(BestiaryError::CorruptBucket(format!(
                "offset {} is not a slot of {} (file length {})",
                offset,
                self.path.display(),
                self.len
            )));
        }
        Ok(())
    }
}
