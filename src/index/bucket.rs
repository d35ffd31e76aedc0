//! Bucket definitions
//!
//! In-memory form of one fixed-size bucket slot.

/// A key → data offset pair stored inside a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketRecord {
    /// Creature id
    pub key: i64,

    /// Byte offset of the full record in the data file
    pub data_offset: u64,
}

impl BucketRecord {
    pub fn new(key: i64, data_offset: u64) -> Self {
        Self { key, data_offset }
    }
}

/// One bucket: its local depth and the occupied records, in slot order
///
/// The physical capacity lives with the bucket store; a decoded bucket only
/// keeps the first `size` records of its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Number of low-order key bits shared by every record in this bucket
    pub local_depth: u32,

    records: Vec<BucketRecord>,
}

impl Bucket {
    /// Create an empty bucket
    pub fn new(local_depth: u32) -> Self {
        Self {
            local_depth,
            records: Vec::new(),
        }
    }

    /// Create a bucket holding `records` in order
    pub fn with_records(local_depth: u32, records: Vec<BucketRecord>) -> Self {
        Self {
            local_depth,
            records,
        }
    }

    /// Number of occupied records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Occupied records in slot order
    pub fn records(&self) -> &[BucketRecord] {
        &self.records
    }

    /// Take the records out, leaving the bucket empty
    pub fn take_records(&mut self) -> Vec<BucketRecord> {
        std::mem::take(&mut self.records)
    }

    /// Append a record after the last occupied slot
    pub fn push(&mut self, record: BucketRecord) {
        self.records.push(record);
    }

    /// Data offset stored for `key`, if present
    pub fn get(&self, key: i64) -> Option<u64> {
        self.records
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.data_offset)
    }

    /// Overwrite the data offset for `key`; false if the key is absent
    pub fn set_offset(&mut self, key: i64, data_offset: u64) -> bool {
        match self.records.iter_mut().find(|r| r.key == key) {
            Some(record) => {
                record.data_offset = data_offset;
                true
            }
            None => false,
        }
    }

    /// Remove `key`, shifting the following records one slot left
    pub fn remove(&mut self, key: i64) -> Option<BucketRecord> {
        let pos = self.records.iter().position(|r| r.key == key)?;
        Some(self.records.remove(pos))
    }
}
