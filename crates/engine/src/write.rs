//! Write path: `put()`, `delete()`, `force_flush()`, `compact()`.
//!
//! Every mutation passes the admission gate, is appended to the WAL, and is
//! then applied to the memtable. The memtable flushes itself into a new
//! level-1 table through [`FlushSink`] when it reaches capacity.
use anyhow::{ensure, Result};
use memtable::FlushTarget;
use record::{Entry, Record, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use wal::Wal;

use crate::levels::LevelManager;
use crate::Engine;

/// Flush destination handed to the memtable: writes the next level-1 table,
/// then starts a fresh WAL segment so the previous one is never replayed.
pub(crate) struct FlushSink<'a> {
    levels: &'a mut LevelManager,
    /// `None` during WAL replay, where rotation is deferred.
    wal: Option<&'a mut Wal>,
    pub(crate) flushes: usize,
}

impl<'a> FlushSink<'a> {
    pub(crate) fn new(levels: &'a mut LevelManager, wal: Option<&'a mut Wal>) -> Self {
        Self {
            levels,
            wal,
            flushes: 0,
        }
    }
}

impl FlushTarget for FlushSink<'_> {
    fn flush_sorted(&mut self, records: Vec<(String, Record)>) -> Result<()> {
        self.levels.flush_memtable(records)?;
        if let Some(wal) = self.wal.as_deref_mut() {
            wal.rotate()?;
        }
        self.flushes += 1;
        Ok(())
    }
}

fn check_key(key: &str) -> Result<()> {
    ensure!(!key.is_empty(), "key must not be empty");
    ensure!(
        key.len() <= MAX_KEY_SIZE,
        "key too large: {} bytes (max {})",
        key.len(),
        MAX_KEY_SIZE
    );
    Ok(())
}

impl Engine {
    /// Stores `value` under `key`.
    ///
    /// Returns `Ok(false)` without doing anything if the admission gate
    /// denies the call.
    ///
    /// # Errors
    ///
    /// Rejects an empty or oversized key and an oversized value; propagates
    /// WAL, flush and cache I/O failures.
    pub fn put(&mut self, key: &str, value: impl Into<Vec<u8>>) -> Result<bool> {
        let value = value.into();
        check_key(key)?;
        ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );
        if !self.admit("put") {
            return Ok(false);
        }

        let record = Record::live(value, self.next_timestamp());
        self.wal.write_entry(&Entry::new(key, record.clone()))?;
        let mut sink = FlushSink::new(&mut self.levels, Some(&mut self.wal));
        self.mem.put(key, record, &mut sink)?;
        self.cache_mut().delete(key)?;
        Ok(true)
    }

    /// Logically deletes `key` by writing a tombstone, which shadows every
    /// older value in the tables. Deleting an absent key still writes one.
    ///
    /// Returns `Ok(false)` if the admission gate denies the call.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        check_key(key)?;
        if !self.admit("delete") {
            return Ok(false);
        }

        let timestamp = self.next_timestamp();
        self.wal
            .write_entry(&Entry::new(key, Record::tombstone(timestamp)))?;
        let mut sink = FlushSink::new(&mut self.levels, Some(&mut self.wal));
        self.mem.remove(key, timestamp, &mut sink)?;
        self.cache_mut().delete(key)?;
        Ok(true)
    }

    /// Flushes the memtable now, even if it is not full.
    ///
    /// Returns `false` if the memtable was empty. Not gated.
    pub fn force_flush(&mut self) -> Result<bool> {
        if self.mem.is_empty() {
            return Ok(false);
        }
        let mut sink = FlushSink::new(&mut self.levels, Some(&mut self.wal));
        self.mem.flush(&mut sink)?;
        Ok(true)
    }

    /// Runs one compaction pass with the configured policy.
    ///
    /// Returns `Ok(false)` if the admission gate denies the call, `Ok(true)`
    /// once the pass completed (whether or not any level needed work).
    pub fn compact(&mut self) -> Result<bool> {
        if !self.admit("compact") {
            return Ok(false);
        }
        let merged = self.levels.compact()?;
        debug!(merged, level_sizes = ?self.levels.level_sizes(), "compact finished");
        Ok(true)
    }

    /// Next write timestamp: wall-clock microseconds, forced strictly above
    /// the previous one.
    pub(crate) fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_micros() as u64);
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }
}
