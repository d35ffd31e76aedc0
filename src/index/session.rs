//! Index Session
//!
//! An explicitly opened index: the loaded directory plus the open bucket
//! file. Nothing is shared between sessions; `close` writes the directory
//! back and releases both files.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec;
use crate::config::IndexOptions;
use crate::error::{BestiaryError, Result};

use super::directory::INITIAL_GLOBAL_DEPTH;
use super::{BucketStore, Directory, DirectoryHeader, DynamicHash, IndexDump};

/// An open hash index
pub struct Session {
    /// Where the directory is written on close
    directory_path: PathBuf,

    /// Bucket path and slot geometry, written ahead of the directory
    header: DirectoryHeader,

    /// In-memory directory (private copy for this session)
    directory: Directory,

    /// Open bucket file
    store: BucketStore,

    options: IndexOptions,
}

impl Session {
    /// Build a new, empty index, truncating both files
    ///
    /// Starts at global depth 1 with two empty buckets.
    pub fn create(directory_path: &Path, bucket_path: &Path, options: IndexOptions) -> Result<Self> {
        let recorded = stored_bucket_path(directory_path, bucket_path);
        Self::create_at(directory_path, bucket_path, recorded, options)
    }

    /// Build a new, empty index beside `directory_path` and `bucket_path`
    ///
    /// Both files get a `.tmp` suffix and the existing index is left alone
    /// until `commit` renames them into place.
    pub fn create_staged(
        directory_path: &Path,
        bucket_path: &Path,
        options: IndexOptions,
    ) -> Result<Self> {
        let recorded = stored_bucket_path(directory_path, bucket_path);
        Self::create_at(
            &staging_path(directory_path),
            &staging_path(bucket_path),
            recorded,
            options,
        )
    }

    fn create_at(
        directory_path: &Path,
        bucket_path: &Path,
        recorded_bucket_path: String,
        options: IndexOptions,
    ) -> Result<Self> {
        if options.bucket_records == 0 || options.bucket_records >= codec::MAX_LOAD_FACTOR {
            return Err(BestiaryError::Config(format!(
                "bucket_records must be in 1..{}, got {}",
                codec::MAX_LOAD_FACTOR,
                options.bucket_records
            )));
        }

        let load_factor = options.bucket_records + 1;
        let mut store = BucketStore::create(bucket_path, load_factor)?;

        let initial_slots = 1usize << INITIAL_GLOBAL_DEPTH;
        let mut directory =
            Directory::from_parts(INITIAL_GLOBAL_DEPTH, vec![0; initial_slots], Vec::new())?;
        let offsets = store.allocate(initial_slots, INITIAL_GLOBAL_DEPTH, &mut directory)?;
        let directory = Directory::from_parts(INITIAL_GLOBAL_DEPTH, offsets, Vec::new())?;

        let header = DirectoryHeader {
            bucket_path: recorded_bucket_path,
            load_factor,
            slot_size: store.slot_size(),
        };

        tracing::debug!(
            "Created hash index {} (load factor {})",
            directory_path.display(),
            load_factor
        );

        Ok(Self {
            directory_path: directory_path.to_path_buf(),
            header,
            directory,
            store,
            options,
        })
    }

    /// Load the directory file and open the bucket file it names
    pub fn open(directory_path: &Path, options: IndexOptions) -> Result<Self> {
        let (header, directory) = Directory::load(directory_path)?;
        let bucket_path = resolve_bucket_path(directory_path, &header.bucket_path);
        let store = BucketStore::open(&bucket_path, header.load_factor)?;

        if let Some(bad) = directory
            .bucket_pointers()
            .iter()
            .chain(directory.free_list().iter())
            .find(|&&offset| offset % store.slot_size() != 0 || offset >= store.len())
        {
            return Err(BestiaryError::CorruptDirectory(format!(
                "offset {} does not name a slot in {}",
                bad,
                bucket_path.display()
            )));
        }

        tracing::trace!(
            "Opened hash index {} (global depth {}, {} slots)",
            directory_path.display(),
            directory.global_depth(),
            store.slot_count()
        );

        Ok(Self {
            directory_path: directory_path.to_path_buf(),
            header,
            directory,
            store,
            options,
        })
    }

    /// Index operations against this session
    pub fn hash(&mut self) -> DynamicHash<'_> {
        DynamicHash::new(
            &mut self.directory,
            &mut self.store,
            self.options.max_global_depth,
        )
    }

    /// Read-only dump of the directory and every distinct bucket
    pub fn dump(&mut self) -> Result<IndexDump> {
        IndexDump::collect(&self.directory, &mut self.store)
    }

    /// Persist the directory and release both files
    pub fn close(mut self) -> Result<()> {
        self.directory
            .persist(&self.directory_path, &self.header, self.options.sync_on_close)?;
        if self.options.sync_on_close {
            self.store.sync()?;
        }

        tracing::trace!("Closed hash index {}", self.directory_path.display());
        Ok(())
    }

    /// Close a staged session and move both files over `directory_path`
    /// and `bucket_path`
    ///
    /// The old directory file is removed before either rename, so a crash
    /// part-way leaves no directory rather than a mismatched pair.
    pub fn commit(self, directory_path: &Path, bucket_path: &Path) -> Result<()> {
        let staged_directory = self.directory_path.clone();
        let staged_buckets = self.store.path().to_path_buf();
        self.close()?;

        if directory_path.exists() {
            fs::remove_file(directory_path)?;
        }
        fs::rename(&staged_buckets, bucket_path)?;
        fs::rename(&staged_directory, directory_path)?;

        tracing::debug!("Committed hash index {}", directory_path.display());
        Ok(())
    }

    /// Drop a staged session and delete its files
    pub fn discard(self) -> Result<()> {
        let staged_buckets = self.store.path().to_path_buf();
        let staged_directory = self.directory_path;
        drop(self.store);

        fs::remove_file(&staged_buckets)?;
        if staged_directory.exists() {
            fs::remove_file(&staged_directory)?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn store(&self) -> &BucketStore {
        &self.store
    }

    pub fn header(&self) -> &DirectoryHeader {
        &self.header
    }
}

/// Record the bucket path relative to the directory file when they share a
/// parent, so the pair can be moved together
fn stored_bucket_path(directory_path: &Path, bucket_path: &Path) -> String {
    match (directory_path.parent(), bucket_path.parent(), bucket_path.file_name()) {
        (Some(dir_parent), Some(bucket_parent), Some(name)) if dir_parent == bucket_parent => {
            name.to_string_lossy().into_owned()
        }
        _ => bucket_path.to_string_lossy().into_owned(),
    }
}

/// `path` with `.tmp` appended to its file name
fn staging_path(path: &Path) -> PathBuf {
    let mut staged = OsString::from(path.as_os_str());
    staged.push(".tmp");
    PathBuf::from(staged)
}

/// Relative bucket paths are resolved against the directory file's parent
fn resolve_bucket_path(directory_path: &Path, stored: &str) -> PathBuf {
    let stored = Path::new(stored);
    if stored.is_absolute() {
        return stored.to_path_buf();
    }
    match directory_path.parent() {
        Some(parent) => parent.join(stored),
        None => stored.to_path_buf(),
    }
}
