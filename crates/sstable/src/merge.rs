//! Streaming merge over several tables.
//!
//! Produces `(key, Record)` pairs in ascending key order. When the same key
//! appears in several inputs only the record with the **highest timestamp**
//! is emitted; on equal timestamps the input listed first wins, so callers
//! pass inputs newest first.
//!
//! Tombstones are merged like any other record and carried into the output.
//!
//! This is the core primitive for compaction: two-way for size-tiered pairs,
//! N-way for leveled promotions.

use anyhow::{Context, Result};
use record::{Entry, Record};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, Take};
use std::path::PathBuf;

use crate::SSTable;

/// Sequential reader over one table's data zone.
pub struct TableIter {
    reader: Take<BufReader<File>>,
    table: PathBuf,
}

impl TableIter {
    pub(crate) fn new(reader: Take<BufReader<File>>, table: PathBuf) -> Self {
        Self { reader, table }
    }

    /// Returns the next entry, or `None` at the end of the data zone.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        Entry::read_from(&mut self.reader)
            .with_context(|| format!("read data zone of {}", self.table.display()))
    }
}

/// The current head key of one input.
struct HeapEntry {
    key: String,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; smallest key first, then lowest source.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges several tables into one sorted, key-deduplicated stream.
pub struct MergeIterator {
    sources: Vec<TableIter>,
    /// Record belonging to each source's key currently in the heap.
    heads: Vec<Option<Record>>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// Opens every input and primes the heap with its first key.
    pub fn new(tables: &[&SSTable]) -> Result<Self> {
        let mut merge = Self {
            sources: Vec::with_capacity(tables.len()),
            heads: vec![None; tables.len()],
            heap: BinaryHeap::with_capacity(tables.len()),
        };
        for table in tables {
            merge.sources.push(table.entries()?);
        }
        for source in 0..merge.sources.len() {
            merge.advance(source)?;
        }
        Ok(merge)
    }

    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(entry) = self.sources[source].next_entry()? {
            self.heads[source] = Some(entry.record);
            self.heap.push(HeapEntry {
                key: entry.key,
                source,
            });
        }
        Ok(())
    }

    /// Returns the next `(key, record)` in sorted order, or `None` when every
    /// input is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(String, Record)>> {
        loop {
            let Some(top) = self.heap.pop() else {
                return Ok(None);
            };
            let best = self.heads[top.source].take();
            self.advance(top.source)?;

            let mut best = match best {
                Some(r) => r,
                None => continue,
            };

            while self.heap.peek().is_some_and(|p| p.key == top.key) {
                let Some(dup) = self.heap.pop() else {
                    break;
                };
                if let Some(candidate) = self.heads[dup.source].take() {
                    if candidate.is_newer_than(&best) {
                        best = candidate;
                    }
                }
                self.advance(dup.source)?;
            }

            return Ok(Some((top.key, best)));
        }
    }

    /// Collects all remaining entries into a `Vec`.
    pub fn collect_all(&mut self) -> Result<Vec<(String, Record)>> {
        let mut result = Vec::new();
        while let Some(pair) = self.next_entry()? {
            result.push(pair);
        }
        Ok(result)
    }
}
