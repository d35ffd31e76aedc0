//! Binary codec
//!
//! Fixed-width little-endian layouts for every structure Bestiary writes to
//! disk. Decoders never trust the input: short buffers and out-of-range
//! counts come back as corruption errors.
//!
//! ## Bucket Slot (`16 + load_factor * 16` bytes)
//! ```text
//! ┌──────────────────┬──────────────────┬──────────────────────────────┐
//! │ LocalDepth (i64) │   Size (i64)     │ load_factor × [Key | Offset] │
//! └──────────────────┴──────────────────┴──────────────────────────────┘
//! ```
//! Unused record slots are written as zeroes.
//!
//! ## Directory File
//! ```text
//! ┌──────────┬──────────┬────────────┬──────────┬────────┬────────┬──────────┬─────────┬──────────┐
//! │PathLen(4)│ Path     │LoadFactor 8│SlotSize 8│Depth 8 │DirLen 8│Ptrs 8×N  │FreeLen 8│Free 8×M  │
//! └──────────┴──────────┴────────────┴──────────┴────────┴────────┴──────────┴─────────┴──────────┘
//! ```
//!
//! ## Data File
//! ```text
//! Header (16 bytes): Magic "BSTY" (4) | Version u16 (2) | Reserved (2) | LastId i64 (8)
//! Frame:             Tombstone u8 (1) | PayloadLen u32 (4) | CRC32 u32 (4) | Payload
//! ```

use bytes::{Buf, BufMut};

use crate::error::{BestiaryError, Result};
use crate::index::{Bucket, BucketRecord, Directory, DirectoryHeader};

// =============================================================================
// Layout Constants
// =============================================================================

/// Bucket slot header: LocalDepth (8) + Size (8)
pub const BUCKET_HEADER_SIZE: u64 = 16;

/// One bucket record: Key (8) + DataOffset (8)
pub const BUCKET_RECORD_SIZE: u64 = 16;

/// Largest load factor a directory file may declare
pub const MAX_LOAD_FACTOR: usize = 1 << 16;

/// Largest global depth a directory file may declare
pub const MAX_DIRECTORY_DEPTH: u32 = 48;

/// Magic bytes identifying a Bestiary data file
pub const DATA_MAGIC: &[u8; 4] = b"BSTY";

/// Current data file format version
pub const DATA_VERSION: u16 = 1;

/// Data file header: Magic (4) + Version (2) + Reserved (2) + LastId (8)
pub const DATA_HEADER_SIZE: u64 = 16;

/// Byte position of LastId inside the data file header
pub const LAST_ID_POSITION: u64 = 8;

/// Frame header: Tombstone (1) + PayloadLen (4) + CRC32 (4)
pub const FRAME_HEADER_SIZE: u64 = 9;

/// Tombstone byte values
pub const FRAME_LIVE: u8 = 0;
pub const FRAME_DELETED: u8 = 1;

/// Maximum creature payload size (1 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

// =============================================================================
// Bucket Slots
// =============================================================================

/// Bytes occupied by one bucket slot
///
/// `load_factor` is at most `MAX_LOAD_FACTOR` everywhere it reaches this.
pub fn bucket_slot_size(load_factor: usize) -> u64 {
    BUCKET_HEADER_SIZE + load_factor as u64 * BUCKET_RECORD_SIZE
}

/// Encode a bucket into a full slot, zero-padding unused records
pub fn encode_bucket(bucket: &Bucket, load_factor: usize) -> Vec<u8> {
    debug_assert!(bucket.len() <= load_factor);

    let mut buf = Vec::with_capacity(bucket_slot_size(load_factor) as usize);
    buf.put_i64_le(bucket.local_depth as i64);
    buf.put_i64_le(bucket.len() as i64);

    for record in bucket.records() {
        buf.put_i64_le(record.key);
        buf.put_u64_le(record.data_offset);
    }
    let padding = (load_factor - bucket.len()) as u64 * BUCKET_RECORD_SIZE;
    buf.put_bytes(0, padding as usize);

    buf
}

/// Decode one slot
///
/// Fails with `CorruptBucket` if the slot is short, the local depth is
/// negative or the record count exceeds `load_factor`.
pub fn decode_bucket(bytes: &[u8], load_factor: usize) -> Result<Bucket> {
    let slot_size = bucket_slot_size(load_factor) as usize;
    if bytes.len() < slot_size {
        return Err(BestiaryError::CorruptBucket(format!(
            "truncated slot: expected {} bytes, got {}",
            slot_size,
            bytes.len()
        )));
    }

    let mut buf = &bytes[..slot_size];
    let local_depth = buf.get_i64_le();
    let size = buf.get_i64_le();

    if !(0..=63).contains(&local_depth) {
        return Err(BestiaryError::CorruptBucket(format!(
            "invalid local depth {}",
            local_depth
        )));
    }
    if size < 0 || size as u64 > load_factor as u64 {
        return Err(BestiaryError::CorruptBucket(format!(
            "record count {} exceeds capacity {}",
            size, load_factor
        )));
    }

    let records = (0..size)
        .map(|_| BucketRecord::new(buf.get_i64_le(), buf.get_u64_le()))
        .collect();

    Ok(Bucket::with_records(local_depth as u32, records))
}

// =============================================================================
// Directory File
// =============================================================================

/// Encode the directory file
pub fn encode_directory(header: &DirectoryHeader, directory: &Directory) -> Vec<u8> {
    let path = header.bucket_path.as_bytes();
    let pointers = directory.bucket_pointers();
    let free_list = directory.free_list();

    let mut buf = Vec::with_capacity(4 + path.len() + 8 * (5 + pointers.len() + free_list.len()));
    buf.put_u32_le(path.len() as u32);
    buf.put_slice(path);
    buf.put_i64_le(header.load_factor as i64);
    buf.put_i64_le(header.slot_size as i64);
    buf.put_i64_le(directory.global_depth() as i64);

    buf.put_i64_le(pointers.len() as i64);
    for &pointer in pointers {
        buf.put_u64_le(pointer);
    }

    buf.put_i64_le(free_list.len() as i64);
    for &offset in free_list {
        buf.put_u64_le(offset);
    }

    buf
}

/// Decode the directory file
pub fn decode_directory(bytes: &[u8]) -> Result<(DirectoryHeader, Directory)> {
    let mut buf = bytes;

    let path_len = take_u32(&mut buf, "bucket path length")? as usize;
    if buf.remaining() < path_len {
        return Err(truncated("bucket path"));
    }
    let bucket_path = std::str::from_utf8(&buf[..path_len])
        .map_err(|e| BestiaryError::CorruptDirectory(format!("bucket path is not UTF-8: {}", e)))?
        .to_string();
    buf.advance(path_len);

    let load_factor = take_count(&mut buf, "load factor")?;
    let slot_size = take_count(&mut buf, "slot size")? as u64;
    if !(2..=MAX_LOAD_FACTOR).contains(&load_factor) {
        return Err(BestiaryError::CorruptDirectory(format!(
            "load factor {} outside 2..={}",
            load_factor, MAX_LOAD_FACTOR
        )));
    }
    if slot_size != bucket_slot_size(load_factor) {
        return Err(BestiaryError::CorruptDirectory(format!(
            "slot size {} does not match load factor {}",
            slot_size, load_factor
        )));
    }

    let global_depth = take_count(&mut buf, "global depth")?;
    if global_depth > MAX_DIRECTORY_DEPTH as usize {
        return Err(BestiaryError::CorruptDirectory(format!(
            "global depth {} exceeds {}",
            global_depth, MAX_DIRECTORY_DEPTH
        )));
    }

    let pointers = take_offsets(&mut buf, "bucket pointers")?;
    let free_list = take_offsets(&mut buf, "free list")?;

    let directory = Directory::from_parts(global_depth as u32, pointers, free_list)?;
    let header = DirectoryHeader {
        bucket_path,
        load_factor,
        slot_size,
    };

    Ok((header, directory))
}

fn take_u32(buf: &mut &[u8], what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(truncated(what));
    }
    Ok(buf.get_u32_le())
}

/// Read a non-negative i64 count
fn take_count(buf: &mut &[u8], what: &str) -> Result<usize> {
    if buf.remaining() < 8 {
        return Err(truncated(what));
    }
    let value = buf.get_i64_le();
    usize::try_from(value)
        .map_err(|_| BestiaryError::CorruptDirectory(format!("negative {}: {}", what, value)))
}

/// Read a length-prefixed run of offsets
fn take_offsets(buf: &mut &[u8], what: &str) -> Result<Vec<u64>> {
    let len = take_count(buf, what)?;
    if buf.remaining() / 8 < len {
        return Err(truncated(what));
    }
    Ok((0..len).map(|_| buf.get_u64_le()).collect())
}

fn truncated(what: &str) -> BestiaryError {
    BestiaryError::CorruptDirectory(format!("truncated while reading {}", what))
}

// =============================================================================
// Data File
// =============================================================================

/// Encode the data file header
pub fn encode_data_header(last_id: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATA_HEADER_SIZE as usize);
    buf.put_slice(DATA_MAGIC);
    buf.put_u16_le(DATA_VERSION);
    buf.put_u16_le(0);
    buf.put_i64_le(last_id);
    buf
}

/// Decode the data file header, returning the last assigned id
pub fn decode_data_header(bytes: &[u8]) -> Result<i64> {
    if bytes.len() < DATA_HEADER_SIZE as usize {
        return Err(BestiaryError::CorruptRecord(format!(
            "data header: expected {} bytes, got {}",
            DATA_HEADER_SIZE,
            bytes.len()
        )));
    }
    if &bytes[0..4] != DATA_MAGIC {
        return Err(BestiaryError::CorruptRecord(format!(
            "invalid data file magic: expected BSTY, got {:?}",
            &bytes[0..4]
        )));
    }

    let mut buf = &bytes[4..DATA_HEADER_SIZE as usize];
    let version = buf.get_u16_le();
    if version != DATA_VERSION {
        return Err(BestiaryError::CorruptRecord(format!(
            "unsupported data file version: {}",
            version
        )));
    }
    buf.advance(2);

    Ok(buf.get_i64_le())
}

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub deleted: bool,
    pub payload_len: u32,
    pub crc: u32,
}

/// Encode a live frame around `payload`
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE as usize + payload.len());
    buf.put_u8(FRAME_LIVE);
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(crc32fast::hash(payload));
    buf.put_slice(payload);
    buf
}

/// Decode a frame header
pub fn decode_frame_header(bytes: &[u8]) -> Result<FrameHeader> {
    if bytes.len() < FRAME_HEADER_SIZE as usize {
        return Err(BestiaryError::CorruptRecord(format!(
            "frame header: expected {} bytes, got {}",
            FRAME_HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut buf = bytes;
    let deleted = match buf.get_u8() {
        FRAME_LIVE => false,
        FRAME_DELETED => true,
        other => {
            return Err(BestiaryError::CorruptRecord(format!(
                "unknown tombstone byte: 0x{:02x}",
                other
            )))
        }
    };
    let payload_len = buf.get_u32_le();
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(BestiaryError::CorruptRecord(format!(
            "payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }
    let crc = buf.get_u32_le();

    Ok(FrameHeader {
        deleted,
        payload_len,
        crc,
    })
}

/// Check a payload against the CRC from its frame header
pub fn verify_payload(header: &FrameHeader, payload: &[u8]) -> Result<()> {
    let actual = crc32fast::hash(payload);
    if actual != header.crc {
        return Err(BestiaryError::CorruptRecord(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            header.crc, actual
        )));
    }
    Ok(())
}
