//! Cold-start path: rebuilding the memtable from the newest WAL segment.
//!
//! Only the newest segment is replayed. Every older segment was rotated away
//! right after a memtable flush, so its records already live in a table.
//! That invariant is assumed, not checked: segments left behind by a crash
//! between a flush and its rotation would be replayed again, which is
//! harmless because replayed records keep their original timestamps.
//!
//! The timestamp clock is seeded from both the replayed records and every
//! table, since the newest segment is empty right after a flush.
use anyhow::{Context, Result};
use memtable::Memtable;
use record::Entry;
use tracing::info;
use wal::Wal;

use crate::levels::LevelManager;
use crate::write::FlushSink;

/// Replays the newest WAL segment into `mem`, returning the highest
/// timestamp seen (0 for an empty log).
///
/// If the replay itself fills the memtable, the flushed prefix is in a table
/// but still in the replayed segment. The WAL is then rotated and whatever
/// remains in the memtable is re-logged, so the newest segment once again
/// covers exactly the memtable.
pub fn replay_wal(wal: &mut Wal, mem: &mut Memtable, levels: &mut LevelManager) -> Result<u64> {
    let mut replayed: Vec<Entry> = Vec::new();
    wal.replay_latest(|entry| replayed.push(entry))
        .context("failed to replay WAL")?;

    let mut last_timestamp = 0u64;
    let mut sink = FlushSink::new(levels, None);
    let count = replayed.len();
    for entry in replayed {
        last_timestamp = last_timestamp.max(entry.record.timestamp);
        mem.put(&entry.key, entry.record, &mut sink)?;
    }

    if sink.flushes > 0 {
        wal.rotate()?;
        for (key, record) in mem.sorted_entries() {
            wal.write_entry(&Entry::new(key, record))?;
        }
    }
    info!(records = count, flushes = sink.flushes, last_timestamp, "recovered memtable from WAL");
    Ok(last_timestamp)
}

/// Highest timestamp stored in any table (0 when there are none).
pub fn newest_table_timestamp(levels: &LevelManager) -> Result<u64> {
    let mut newest = 0u64;
    for level in 1..=levels.max_level() {
        for table in levels.tables(level) {
            let mut iter = table.entries()?;
            while let Some(entry) = iter.next_entry()? {
                newest = newest.max(entry.record.timestamp);
            }
        }
    }
    Ok(newest)
}
