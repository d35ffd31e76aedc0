//! Index inspection
//!
//! Read-only snapshot of a directory and its buckets for diagnostics.

use std::collections::HashSet;
use std::fmt;

use crate::error::Result;

use super::{Bucket, BucketStore, Directory};

/// One directory slot in a dump
#[derive(Debug, Clone)]
pub struct SlotDump {
    /// Directory index
    pub slot: usize,

    /// Bucket offset the slot points at
    pub offset: u64,

    /// Bucket contents, only on the first slot that points at `offset`
    pub bucket: Option<Bucket>,
}

/// Snapshot of a whole index
#[derive(Debug, Clone)]
pub struct IndexDump {
    pub global_depth: u32,
    pub load_factor: usize,
    /// Slots in the bucket file, live or reclaimed
    pub slot_count: u64,
    pub free_list: Vec<u64>,
    pub slots: Vec<SlotDump>,
}

impl IndexDump {
    /// Read every distinct bucket the directory points at
    pub fn collect(directory: &Directory, store: &mut BucketStore) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut slots = Vec::with_capacity(directory.len());

        for (slot, &offset) in directory.bucket_pointers().iter().enumerate() {
            let bucket = if seen.insert(offset) {
                Some(store.read_bucket(offset)?)
            } else {
                None
            };
            slots.push(SlotDump {
                slot,
                offset,
                bucket,
            });
        }

        Ok(Self {
            global_depth: directory.global_depth(),
            load_factor: store.load_factor(),
            slot_count: store.slot_count(),
            free_list: directory.free_list().iter().copied().collect(),
            slots,
        })
    }

    /// Number of distinct buckets reachable from the directory
    pub fn bucket_count(&self) -> usize {
        self.slots.iter().filter(|s| s.bucket.is_some()).count()
    }

    /// Number of indexed keys
    pub fn record_count(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.bucket.as_ref())
            .map(Bucket::len)
            .sum()
    }
}

impl fmt::Display for IndexDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "global depth {} | load factor {} | {} slots in file | free list {:?}",
            self.global_depth, self.load_factor, self.slot_count, self.free_list
        )?;
        writeln!(f, "|  Slot  |  Offset  | Depth | Size || Key / Offset")?;
        writeln!(f, "|--------|----------|-------|------||-------------")?;

        for slot in &self.slots {
            match &slot.bucket {
                Some(bucket) => {
                    write!(
                        f,
                        "| {:>6} | {:>8x} | {:>5} | {:>4} ||",
                        slot.slot,
                        slot.offset,
                        bucket.local_depth,
                        bucket.len()
                    )?;
                    for record in bucket.records() {
                        write!(f, " {{{} {:x}}}", record.key, record.data_offset)?;
                    }
                    writeln!(f)?;
                }
                None => writeln!(f, "| {:>6} | {:>8x} |       |      ||", slot.slot, slot.offset)?,
            }
        }

        Ok(())
    }
}
