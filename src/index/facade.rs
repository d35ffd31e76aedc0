//! Index Facade
//!
//! Create/Read/Update/Delete over a persisted index. Each call opens its own
//! session, performs one operation and closes it again, so no file handle
//! outlives a call.
//!
//! Calls are not synchronised with each other: two overlapping mutations on
//! the same files race. Callers hold a single-writer lock (see `Engine`).

use std::io;
use std::path::{Path, PathBuf};

use crate::config::IndexOptions;
use crate::error::Result;

use super::{Directory, DynamicHash, IndexDump, Session};

/// Handle to an index persisted at `directory_path`
#[derive(Debug, Clone)]
pub struct HashIndex {
    directory_path: PathBuf,
    options: IndexOptions,
}

impl HashIndex {
    /// Build a fresh index from `(key, data_offset)` pairs, replacing any
    /// existing files
    ///
    /// The index is built in staging files; the existing pair is only
    /// replaced once every entry is in. On failure the old index stays
    /// readable.
    pub fn build<I>(
        directory_path: &Path,
        bucket_path: &Path,
        options: IndexOptions,
        entries: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (i64, u64)>,
    {
        let mut session = Session::create_staged(directory_path, bucket_path, options)?;
        let count = match Self::fill(&mut session, entries) {
            Ok(count) => count,
            Err(e) => {
                if let Err(cleanup) = session.discard() {
                    tracing::warn!("Failed to remove staged index files: {}", cleanup);
                }
                return Err(e);
            }
        };
        let global_depth = session.directory().global_depth();
        session.commit(directory_path, bucket_path)?;

        tracing::info!(
            "Built hash index {} with {} keys (global depth {})",
            directory_path.display(),
            count,
            global_depth
        );

        Ok(Self {
            directory_path: directory_path.to_path_buf(),
            options,
        })
    }

    /// Attach to an index previously written by `build`
    pub fn open(directory_path: &Path, options: IndexOptions) -> Result<Self> {
        if !Directory::exists(directory_path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no hash directory at {}", directory_path.display()),
            )
            .into());
        }

        Ok(Self {
            directory_path: directory_path.to_path_buf(),
            options,
        })
    }

    /// Index a new key; the caller guarantees it is not already present
    pub fn create(&self, key: i64, data_offset: u64) -> Result<()> {
        self.mutate(|hash| hash.insert(key, data_offset))
    }

    /// Data offset for `key`, or `NotFound`
    pub fn read(&self, key: i64) -> Result<u64> {
        let mut session = self.session()?;
        let result = session.hash().lookup(key);
        result
    }

    /// Point `key` at a new data offset, or `NotFound`
    pub fn update(&self, key: i64, data_offset: u64) -> Result<()> {
        self.mutate(|hash| hash.update(key, data_offset))
    }

    /// Remove `key`, or `NotFound`
    pub fn delete(&self, key: i64) -> Result<()> {
        self.mutate(|hash| hash.delete(key).map(|_| ()))
    }

    /// Diagnostic dump of the directory and buckets
    pub fn dump(&self) -> Result<IndexDump> {
        self.session()?.dump()
    }

    /// Open a session for several operations in a row
    pub fn session(&self) -> Result<Session> {
        Session::open(&self.directory_path, self.options)
    }

    fn fill<I>(session: &mut Session, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (i64, u64)>,
    {
        let mut hash = session.hash();
        let mut count = 0usize;
        for (key, data_offset) in entries {
            hash.insert(key, data_offset)?;
            count += 1;
        }
        Ok(count)
    }

    /// Run one mutation and write the directory back if it succeeds
    ///
    /// Operations fail before their first bucket write on `NotFound` and
    /// `DirectoryFull`, so those leave both files as they were. An I/O error
    /// part-way through a split can still leave them out of step; rebuild
    /// the index from the data file in that case.
    fn mutate<T>(&self, op: impl FnOnce(&mut DynamicHash<'_>) -> Result<T>) -> Result<T> {
        let mut session = self.session()?;
        let value = op(&mut session.hash())?;
        session.close()?;
        Ok(value)
    }
}
