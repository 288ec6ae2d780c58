//! Table zone codecs.
//!
//! ## Single-file header (24 bytes, big-endian)
//!
//! ```text
//! [data_len: u64][index_len: u64][summary_len: u64]
//! ```
//!
//! followed by the data, index, summary and filter zones back to back. The
//! filter zone runs to the end of the file.
//!
//! ## Index record
//!
//! ```text
//! [offset: u64][key_len: u32][key]
//! ```
//!
//! `offset` is relative to the start of the data zone.
//!
//! ## Summary
//!
//! ```text
//! [first_len: u32][last_len: u32][count: u32][first_key][last_key]
//! count x index record
//! ```
//!
//! Each summary checkpoint is an index record whose offset points into the
//! *index* zone: the first index row of its interval.

use anyhow::{bail, ensure, Context, Result};
use byteorder::{BigEndian, ReadBytesExt};
use record::MAX_KEY_SIZE;
use std::io::{self, Read};

/// Size of the single-file zone-length header.
pub const HEADER_BYTES: u64 = 8 + 8 + 8;

/// Zone lengths stored at the front of a single-file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneHeader {
    pub data_len: u64,
    pub index_len: u64,
    pub summary_len: u64,
}

impl ZoneHeader {
    pub fn encode(&self) -> [u8; HEADER_BYTES as usize] {
        let mut buf = [0u8; HEADER_BYTES as usize];
        buf[0..8].copy_from_slice(&self.data_len.to_be_bytes());
        buf[8..16].copy_from_slice(&self.index_len.to_be_bytes());
        buf[16..24].copy_from_slice(&self.summary_len.to_be_bytes());
        buf
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            data_len: r.read_u64::<BigEndian>()?,
            index_len: r.read_u64::<BigEndian>()?,
            summary_len: r.read_u64::<BigEndian>()?,
        })
    }
}

/// One `{offset, key}` row of the sparse index (or a summary checkpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub offset: u64,
    pub key: String,
}

impl IndexRecord {
    pub fn new(offset: u64, key: impl Into<String>) -> Self {
        Self {
            offset,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        8 + 4 + self.key.len()
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.key.as_bytes());
    }

    /// Reads the next record, or `None` at a clean end of stream.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>> {
        let offset = match r.read_u64::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let key = read_key(r, None)?;
        Ok(Some(Self { offset, key }))
    }
}

/// Key range and checkpoints of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub first_key: String,
    pub last_key: String,
    pub checkpoints: Vec<IndexRecord>,
}

impl Summary {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.first_key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(self.last_key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(self.checkpoints.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.first_key.as_bytes());
        buf.extend_from_slice(self.last_key.as_bytes());
        for cp in &self.checkpoints {
            cp.encode_into(&mut buf);
        }
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let first_len = buf.read_u32::<BigEndian>().context("summary header")? as usize;
        let last_len = buf.read_u32::<BigEndian>().context("summary header")? as usize;
        let count = buf.read_u32::<BigEndian>().context("summary header")? as usize;
        let first_key = read_key(&mut buf, Some(first_len))?;
        let last_key = read_key(&mut buf, Some(last_len))?;

        let mut checkpoints = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            match IndexRecord::read_from(&mut buf)? {
                Some(cp) => checkpoints.push(cp),
                None => bail!("summary truncated: expected {count} checkpoints"),
            }
        }
        ensure!(!checkpoints.is_empty(), "summary has no checkpoints");
        ensure!(buf.is_empty(), "trailing bytes after summary");
        Ok(Self {
            first_key,
            last_key,
            checkpoints,
        })
    }

    /// Returns `true` if `key` lies inside `[first_key, last_key]`.
    #[must_use]
    pub fn covers(&self, key: &str) -> bool {
        key >= self.first_key.as_str() && key <= self.last_key.as_str()
    }

    /// Position of the last checkpoint whose key is `<= key` (0 if none).
    #[must_use]
    pub fn checkpoint_for(&self, key: &str) -> usize {
        self.checkpoints
            .partition_point(|cp| cp.key.as_str() <= key)
            .saturating_sub(1)
    }
}

/// Reads `[key_len: u32][key]`, or just the key bytes when the length is
/// already known.
fn read_key<R: Read>(r: &mut R, known_len: Option<usize>) -> Result<String> {
    let len = match known_len {
        Some(n) => n,
        None => r.read_u32::<BigEndian>()? as usize,
    };
    ensure!(len <= MAX_KEY_SIZE, "corrupt key length {len}");
    let mut key = vec![0u8; len];
    r.read_exact(&mut key)?;
    String::from_utf8(key).context("key is not valid utf-8")
}
