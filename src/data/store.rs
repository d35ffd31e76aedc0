//! Data Store
//!
//! Append-only file of creature frames. Records are never rewritten: an
//! update appends a new frame and tombstones the old one.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{self, FrameHeader, DATA_HEADER_SIZE, FRAME_DELETED, FRAME_HEADER_SIZE};
use crate::error::{BestiaryError, Result};

use super::Creature;

/// A frame read back from the data file
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Byte offset of the frame
    pub offset: u64,

    /// Tombstone flag
    pub deleted: bool,

    pub creature: Creature,
}

/// Append-only creature file
pub struct DataStore {
    path: PathBuf,
    file: File,

    /// Current file length (offset of the next frame)
    len: u64,

    /// Highest id ever assigned, mirrored in the file header
    last_id: i64,

    /// fsync after every append / tombstone
    sync_writes: bool,
}

impl DataStore {
    /// Open or create a data file
    ///
    /// A missing or empty file gets a fresh header with `last_id = 0`.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.metadata()?.len();

        let (len, last_id) = if len == 0 {
            file.write_all(&codec::encode_data_header(0))?;
            file.sync_all()?;
            (DATA_HEADER_SIZE, 0)
        } else {
            let mut header = [0u8; DATA_HEADER_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header).map_err(|e| truncated(e, "data header"))?;
            (len, codec::decode_data_header(&header)?)
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            last_id,
            sync_writes,
        })
    }

    /// Append a creature payload as a live frame; returns the frame offset
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        if payload.len() > codec::MAX_PAYLOAD_SIZE as usize {
            return Err(BestiaryError::Serialization(format!(
                "payload of {} bytes exceeds {}",
                payload.len(),
                codec::MAX_PAYLOAD_SIZE
            )));
        }

        let offset = self.len;
        let frame = codec::encode_frame(payload);

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&frame)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }

        self.len += frame.len() as u64;
        tracing::trace!("Appended {} byte frame at offset {}", frame.len(), offset);
        Ok(offset)
    }

    /// Serialize and append a creature
    pub fn append_creature(&mut self, creature: &Creature) -> Result<u64> {
        let payload = creature.to_bytes()?;
        self.append(&payload)
    }

    /// Read the frame at `offset`
    pub fn read_at(&mut self, offset: u64) -> Result<StoredRecord> {
        if offset < DATA_HEADER_SIZE || offset + FRAME_HEADER_SIZE > self.len {
            return Err(BestiaryError::CorruptRecord(format!(
                "offset {} is outside {} (length {})",
                offset,
                self.path.display(),
                self.len
            )));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        read_frame(&mut self.file, offset).map(|(record, _)| record)
    }

    /// Tombstone the frame at `offset`
    ///
    /// Fails with `NotFound` if the frame is already deleted.
    pub fn soft_delete(&mut self, offset: u64) -> Result<()> {
        let record = self.read_at(offset)?;
        if record.deleted {
            return Err(BestiaryError::NotFound);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[FRAME_DELETED])?;
        if self.sync_writes {
            self.file.sync_data()?;
        }

        tracing::trace!("Tombstoned frame at offset {}", offset);
        Ok(())
    }

    /// Highest id ever assigned
    pub fn last_id(&self) -> i64 {
        self.last_id
    }

    /// Record a newly assigned id in the header
    pub fn set_last_id(&mut self, id: i64) -> Result<()> {
        self.file.seek(SeekFrom::Start(codec::LAST_ID_POSITION))?;
        self.file.write_all(&id.to_le_bytes())?;
        self.last_id = id;
        Ok(())
    }

    /// Iterate over every frame, live and deleted, in file order
    pub fn iter(&mut self) -> Result<DataIterator<'_>> {
        DataIterator::new(&mut self.file, self.len)
    }

    /// Flush file contents to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Current file length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the file holds no frames
    pub fn is_empty(&self) -> bool {
        self.len == DATA_HEADER_SIZE
    }
}

/// Sequential iteration over data file frames
pub struct DataIterator<'a> {
    reader: BufReader<&'a mut File>,
    /// Stop reading at this offset (file end)
    end_offset: u64,
    current_offset: u64,
    failed: bool,
}

impl<'a> DataIterator<'a> {
    fn new(file: &'a mut File, end_offset: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(DATA_HEADER_SIZE))?;
        Ok(Self {
            reader: BufReader::new(file),
            end_offset,
            current_offset: DATA_HEADER_SIZE,
            failed: false,
        })
    }
}

impl<'a> Iterator for DataIterator<'a> {
    type Item = Result<StoredRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }

        match read_frame(&mut self.reader, self.current_offset) {
            Ok((record, frame_len)) => {
                self.current_offset += frame_len;
                Some(Ok(record))
            }
            Err(e) => {
                // Frame boundaries are lost after a bad frame
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read one frame from the current position of `reader`, returning it with
/// its total length in bytes
fn read_frame<R: Read>(reader: &mut R, offset: u64) -> Result<(StoredRecord, u64)> {
    let mut header = [0u8; FRAME_HEADER_SIZE as usize];
    reader
        .read_exact(&mut header)
        .map_err(|e| truncated(e, "frame header"))?;
    let header: FrameHeader = codec::decode_frame_header(&header)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| truncated(e, "frame payload"))?;
    codec::verify_payload(&header, &payload)?;

    let record = StoredRecord {
        offset,
        deleted: header.deleted,
        creature: Creature::from_bytes(&payload)?,
    };
    Ok((record, FRAME_HEADER_SIZE + header.payload_len as u64))
}

fn truncated(e: std::io::Error, what: &str) -> BestiaryError {
    match e.kind() {
        ErrorKind::UnexpectedEof => BestiaryError::CorruptRecord(format!("truncated {}", what)),
        _ => BestiaryError::Io(e),
    }
}
