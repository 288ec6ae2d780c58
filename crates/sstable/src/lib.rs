//! # SSTable - Immutable Sorted Tables
//!
//! A table is an immutable, sorted run of entries produced by a memtable
//! flush or by compaction. Tables are identified by `(level, index)` and live
//! in `root/level<L>/sstable<I>/`.
//!
//! ## Zones
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────────────┐
//! │ data         │ entries in ascending key order                         │
//! │ index        │ one {data offset, key} row per entry                   │
//! │ summary      │ first key, last key, every interval-th index row       │
//! │ filter       │ bloom filter over every key                            │
//! │ metadata.txt │ Merkle root (hex) over the encoded entries             │
//! └──────────────┴────────────────────────────────────────────────────────┘
//! ```
//!
//! Zones are stored either in one file per zone or in a single file with a
//! zone-length header; see [`layout`](crate::layout).
//!
//! ## Read Path
//!
//! ```text
//! find(key)
//!   bloom says no?            -> None
//!   key outside [first,last]? -> None
//!   binary search summary     -> checkpoint offset into index
//!   scan <= interval rows     -> data offset
//!   read one entry            -> Some(record)
//! ```
//!
//! ## Modules
//!
//! | Module   | Purpose                                              |
//! |----------|------------------------------------------------------|
//! | `format` | header, index row and summary codecs                 |
//! | `layout` | zone placement for single-file and multi-file tables |
//! | `merkle` | Merkle tree built during flush                       |
//! | `writer` | [`SSTable::flush`]: staged, fsynced table creation   |
//! | `reader` | [`SSTable`]: lookups, range/prefix scans, integrity  |
//! | `merge`  | [`MergeIterator`]: newest-wins streaming merge       |

mod format;
mod layout;
mod merge;
mod merkle;
mod reader;
mod writer;

pub use format::{IndexRecord, Summary, ZoneHeader, HEADER_BYTES};
pub use merge::{MergeIterator, TableIter};
pub use merkle::MerkleTree;
pub use reader::SSTable;

use config::{Config, TableLayout};
use std::path::{Path, PathBuf};

/// Build-time and read-time parameters shared by every table of a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableOptions {
    pub layout: TableLayout,
    /// Index rows per summary checkpoint.
    pub interval: usize,
    pub bloom_fpr: f64,
}

impl TableOptions {
    pub fn new(layout: TableLayout, interval: usize, bloom_fpr: f64) -> Self {
        Self {
            layout,
            interval: interval.max(1),
            bloom_fpr,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.table_layout,
            config.table_interval,
            config.bloom_false_positive_rate,
        )
    }
}

/// `root/level<L>`
#[must_use]
pub fn level_dir(root: &Path, level: u32) -> PathBuf {
    root.join(format!("level{level}"))
}

/// `root/level<L>/sstable<I>`
#[must_use]
pub fn table_dir(root: &Path, level: u32, index: u32) -> PathBuf {
    level_dir(root, level).join(format!("sstable{index}"))
}

/// `root/level<L>/sstable<I>.tmp`, where a table is assembled before the
/// rename that publishes it.
#[must_use]
pub fn staging_dir(root: &Path, level: u32, index: u32) -> PathBuf {
    level_dir(root, level).join(format!("sstable{index}.tmp"))
}

#[cfg(test)]
mod tests;
