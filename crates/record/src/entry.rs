use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::{Record, MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Size of the fixed entry header in bytes.
///
/// ```text
/// [crc32: u32][timestamp: u64][tombstone: u8][key_len: u64][value_len: u64]
/// ```
pub const ENTRY_HEADER_SIZE: usize = 4 + 8 + 1 + 8 + 8;

const CRC_END: usize = 4;
const TIMESTAMP_END: usize = CRC_END + 8;
const TOMBSTONE_END: usize = TIMESTAMP_END + 1;
const KEY_LEN_END: usize = TOMBSTONE_END + 8;

/// Errors produced while decoding an [`Entry`].
#[derive(Debug, Error)]
pub enum EntryError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended in the middle of an entry.
    #[error("truncated entry")]
    Truncated,

    /// The stored checksum does not match the payload. The reader has already
    /// consumed the whole entry, so the caller may skip it and keep reading.
    #[error("checksum mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Structurally invalid bytes (oversized lengths, non UTF-8 key).
    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

/// A key and its record, as stored on disk.
///
/// # Binary Layout (big-endian)
///
/// ```text
/// ┌───────┬───────────┬───────────┬─────────┬───────────┬─────┬───────┐
/// │ crc32 │ timestamp │ tombstone │ key_len │ value_len │ key │ value │
/// │  u32  │    u64    │    u8     │   u64   │    u64    │     │       │
/// └───────┴───────────┴───────────┴─────────┴───────────┴─────┴───────┘
/// ```
///
/// The CRC is IEEE CRC-32 over everything after itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub record: Record,
}

impl Entry {
    pub fn new(key: impl Into<String>, record: Record) -> Self {
        Self {
            key: key.into(),
            record,
        }
    }

    /// Number of bytes [`encode`](Entry::encode) produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.key.len() + self.record.value.len()
    }

    /// Serializes the entry, checksum included.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&[0u8; CRC_END]);
        // Writes into a Vec cannot fail.
        let _ = buf.write_u64::<BigEndian>(self.record.timestamp);
        buf.push(u8::from(self.record.tombstone));
        let _ = buf.write_u64::<BigEndian>(self.key.len() as u64);
        let _ = buf.write_u64::<BigEndian>(self.record.value.len() as u64);
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&self.record.value);

        let crc = checksum(&buf[CRC_END..]);
        BigEndian::write_u32(&mut buf[..CRC_END], crc);
        buf
    }

    /// Encodes and writes the entry in one `write_all` call.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.encode())
    }

    /// Decodes one entry from the front of `buf`, returning it together with
    /// the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), EntryError> {
        let mut cursor = io::Cursor::new(buf);
        match Self::read_from(&mut cursor)? {
            Some(entry) => Ok((entry, cursor.position() as usize)),
            None => Err(EntryError::Truncated),
        }
    }

    /// Reads the next entry from `r`.
    ///
    /// Returns `Ok(None)` on a clean end of stream (no bytes left before the
    /// header). A partially present entry yields [`EntryError::Truncated`].
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>, EntryError> {
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        match read_full(r, &mut header)? {
            0 => return Ok(None),
            n if n < ENTRY_HEADER_SIZE => return Err(EntryError::Truncated),
            _ => {}
        }

        let expected = BigEndian::read_u32(&header[..CRC_END]);
        let timestamp = BigEndian::read_u64(&header[CRC_END..TIMESTAMP_END]);
        let tombstone = match header[TIMESTAMP_END] {
            0 => false,
            1 => true,
            other => {
                return Err(EntryError::Corrupt(format!("bad tombstone flag {other}")));
            }
        };
        let key_len = BigEndian::read_u64(&header[TOMBSTONE_END..KEY_LEN_END]) as usize;
        let value_len = BigEndian::read_u64(&header[KEY_LEN_END..]) as usize;

        if key_len > MAX_KEY_SIZE {
            return Err(EntryError::Corrupt(format!("key length {key_len} too large")));
        }
        if value_len > MAX_VALUE_SIZE {
            return Err(EntryError::Corrupt(format!(
                "value length {value_len} too large"
            )));
        }

        let mut payload = vec![0u8; key_len + value_len];
        r.read_exact(&mut payload).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => EntryError::Truncated,
            _ => EntryError::Io(e),
        })?;

        let mut hasher = Crc32::new();
        hasher.update(&header[CRC_END..]);
        hasher.update(&payload);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(EntryError::ChecksumMismatch { expected, actual });
        }

        let value = payload.split_off(key_len);
        let key = String::from_utf8(payload)
            .map_err(|_| EntryError::Corrupt("key is not valid utf-8".into()))?;

        Ok(Some(Self {
            key,
            record: Record {
                value,
                tombstone,
                timestamp,
            },
        }))
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Fills `buf` as far as the stream allows, returning the bytes read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
