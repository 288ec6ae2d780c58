//! # Record - shared value types for StrataKV
//!
//! Every layer of the store (WAL, memtable, tables, read cache) moves the same
//! three things around:
//!
//! - [`Record`]: the versioned value stored under a key.
//! - [`Entry`]: a key plus its record, with the checksummed binary encoding
//!   used by the WAL segments, the table data zones and the cache file.
//! - [`ScanContext`]: per-query pagination and deduplication state shared by
//!   the memtable and every table a ranged or prefix query visits.
//!
//! ## Ordering
//!
//! Two records for the same key are ordered by `timestamp`; the higher one is
//! the newer write and always wins.
mod entry;
mod scan;

pub use entry::{Entry, EntryError, ENTRY_HEADER_SIZE};
pub use scan::ScanContext;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// A versioned value.
///
/// A logical delete is a record with `tombstone = true` and an empty value.
/// Records are never mutated after construction; replacing a key's value means
/// storing a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub value: Vec<u8>,
    pub tombstone: bool,
    pub timestamp: u64,
}

impl Record {
    /// A live value written at `timestamp`.
    pub fn live(value: impl Into<Vec<u8>>, timestamp: u64) -> Self {
        Self {
            value: value.into(),
            tombstone: false,
            timestamp,
        }
    }

    /// A deletion marker written at `timestamp`.
    pub fn tombstone(timestamp: u64) -> Self {
        Self {
            value: Vec::new(),
            tombstone: true,
            timestamp,
        }
    }

    /// Returns `true` if this record should replace `other` for the same key.
    #[must_use]
    pub fn is_newer_than(&self, other: &Record) -> bool {
        self.timestamp > other.timestamp
    }
}
