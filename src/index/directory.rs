//! Directory
//!
//! In-memory table of bucket-slot offsets addressed by the low-order bits of
//! a key, plus the free list of reclaimed slots. The whole structure is read
//! from and written to the directory file in one piece.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::codec;
use crate::error::{BestiaryError, Result};

/// Global depth of a freshly built index
pub const INITIAL_GLOBAL_DEPTH: u32 = 1;

/// Metadata stored ahead of the directory table in the directory file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHeader {
    /// Bucket file path, as recorded when the index was built
    pub bucket_path: String,

    /// Physical records per bucket slot (usable records + 1)
    pub load_factor: usize,

    /// Bytes per bucket slot
    pub slot_size: u64,
}

/// Directory of an extendible hash index
///
/// ## Invariant
/// `bucket_pointers.len() == 2^global_depth` at all times. Several entries may
/// share one bucket offset; a bucket of local depth `d` is referenced by
/// `2^(global_depth - d)` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    global_depth: u32,
    bucket_pointers: Vec<u64>,
    free_list: VecDeque<u64>,
}

impl Directory {
    /// Create a directory from its parts
    ///
    /// Fails with `CorruptDirectory` if the pointer table does not have
    /// exactly `2^global_depth` entries.
    pub fn from_parts(
        global_depth: u32,
        bucket_pointers: Vec<u64>,
        free_list: impl IntoIterator<Item = u64>,
    ) -> Result<Self> {
        let expected = 1usize
            .checked_shl(global_depth)
            .ok_or_else(|| BestiaryError::CorruptDirectory(format!(
                "global depth {} is too large",
                global_depth
            )))?;
        if bucket_pointers.len() != expected {
            return Err(BestiaryError::CorruptDirectory(format!(
                "expected {} bucket pointers for global depth {}, found {}",
                expected,
                global_depth,
                bucket_pointers.len()
            )));
        }

        Ok(Self {
            global_depth,
            bucket_pointers,
            free_list: free_list.into_iter().collect(),
        })
    }

    /// Directory slot for `key`: `key mod 2^global_depth`
    ///
    /// Works on the two's complement bits, so negative keys land on the
    /// Euclidean remainder instead of a negative slot.
    pub fn index(&self, key: i64) -> usize {
        (key as u64 & self.mask()) as usize
    }

    /// Number of low-order key bits currently used
    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Number of directory entries (`2^global_depth`)
    pub fn len(&self) -> usize {
        self.bucket_pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bucket_pointers.is_empty()
    }

    /// Bucket offset addressed by slot `pos`
    pub fn pointer(&self, pos: usize) -> u64 {
        self.bucket_pointers[pos]
    }

    /// All bucket offsets in slot order
    pub fn bucket_pointers(&self) -> &[u64] {
        &self.bucket_pointers
    }

    /// Reclaimed bucket offsets, oldest first
    pub fn free_list(&self) -> &VecDeque<u64> {
        &self.free_list
    }

    /// Double the directory: the new upper half mirrors the lower half
    pub fn double_global_depth(&mut self) {
        self.bucket_pointers.extend_from_within(..);
        self.global_depth += 1;
    }

    /// Point every slot `start, start + 2^depth, start + 2*2^depth, ...` at `offset`
    ///
    /// These are exactly the slots whose low `depth` bits equal `start`.
    pub fn repoint(&mut self, start: usize, depth: u32, offset: u64) {
        let stride = 1usize << depth;
        for pos in (start..self.bucket_pointers.len()).step_by(stride) {
            self.bucket_pointers[pos] = offset;
        }
    }

    /// Replace every entry equal to `from` with `to`; returns how many changed
    pub fn replace_pointer(&mut self, from: u64, to: u64) -> usize {
        let mut changed = 0;
        for pointer in self.bucket_pointers.iter_mut().filter(|p| **p == from) {
            *pointer = to;
            changed += 1;
        }
        changed
    }

    /// Pop the oldest reclaimed offset
    pub fn reclaim(&mut self) -> Option<u64> {
        self.free_list.pop_front()
    }

    /// Hand a bucket offset back for reuse
    pub fn release(&mut self, offset: u64) {
        self.free_list.push_back(offset);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the header and directory to `path`, replacing its contents
    pub fn persist(&self, path: &Path, header: &DirectoryHeader, sync: bool) -> Result<()> {
        let bytes = codec::encode_directory(header, self);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&bytes)?;
        if sync {
            file.sync_all()?;
        }

        Ok(())
    }

    /// Read a directory file written by `persist`
    pub fn load(path: &Path) -> Result<(DirectoryHeader, Directory)> {
        let bytes = fs::read(path)?;
        codec::decode_directory(&bytes)
    }

    /// Check that `path` exists and is a non-empty file
    pub fn exists(path: &Path) -> bool {
        File::open(path)
            .and_then(|f| f.metadata())
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    fn mask(&self) -> u64 {
        (1u64 << self.global_depth) - 1
    }
}
