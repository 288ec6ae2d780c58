//! Compaction: moves tables down the levels.
//!
//! Two policies, picked once from the configuration:
//!
//! ```text
//! size-tiered                             leveled
//! L:   [1 2] [3 4] [5]                    L:   over cap -> oldest (lowest index) tables
//!        |     |                                         + overlapping tables of L+1
//!        v     v                                          |
//! L+1: ... [n+1] [n+2]   L: [5] -> [1]    L+1: N-way merge, cut every memtable_size
//!                                              rows, re-sorted by first key, renumbered
//! ```
//!
//! Both walk levels `1..max_level` in order, so output pushed into level
//! `L + 1` is compacted again in the same pass if that level overflows too.
//! The deepest level is never compacted.
//!
//! Inputs are merged with [`MergeIterator`] (highest timestamp wins).
//! Tombstones are kept: a dropped tombstone could uncover an older value in
//! a deeper level that this pass did not read.
use anyhow::{Context, Result};
use config::CompactionPolicy;
use record::Record;
use sstable::{staging_dir, MergeIterator, SSTable};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::levels::{renumber, LevelManager};

impl LevelManager {
    /// Runs the configured policy over every level but the deepest.
    ///
    /// Returns `true` if any table was merged. The level state is saved as
    /// each level finishes, so an error part way through leaves the earlier
    /// levels recorded as they are on disk.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure while merging, writing, deleting or
    /// renaming tables.
    pub fn compact(&mut self) -> Result<bool> {
        let mut changed = false;
        for level in 1..self.state.max_level {
            let merged = match self.policy {
                CompactionPolicy::SizeTiered => self.size_tiered(level)?,
                CompactionPolicy::Leveled => self.leveled(level)?,
            };
            changed |= merged;
        }
        if changed {
            self.state.save()?;
            info!(level_sizes = ?self.state.level_sizes, "compaction finished");
        }
        Ok(changed)
    }

    /// Merges tables `(1,2), (3,4), ...` of `level` pairwise into new tables
    /// of `level + 1`. An odd last table stays behind as `sstable1`.
    fn size_tiered(&mut self, level: u32) -> Result<bool> {
        let count = self.state.size(level);
        if count < 2 {
            return Ok(false);
        }
        let pairs = count / 2;
        // Each input is expected to hold 2^(level-1) memtables' worth of keys.
        let expected = self
            .memtable_size
            .saturating_mul(1usize.checked_shl(level).unwrap_or(usize::MAX));
        info!(level, tables = count, pairs, "size-tiered compaction");

        let mut next_size = self.state.size(level + 1);
        let mut consumed = Vec::with_capacity(pairs as usize * 2);
        for pair in 0..pairs as usize {
            let tables = self.tables(level);
            let (older, newer) = (&tables[pair * 2], &tables[pair * 2 + 1]);
            next_size += 1;
            self.merge_into_table(&[newer, older], level + 1, next_size, expected)?;
            consumed.push(older.dir().to_path_buf());
            consumed.push(newer.dir().to_path_buf());
            // The output is recorded before its inputs go away.
            self.state.set_size(level + 1, next_size);
            self.state.save()?;
        }

        remove_tables(&consumed);
        let leftover: Vec<PathBuf> = self.tables(level)[consumed.len()..]
            .iter()
            .map(|t| t.dir().to_path_buf())
            .collect();
        renumber(&self.root, level, &leftover)?;
        self.state.set_size(level, leftover.len() as u32);
        // Persist before the next level runs; a later failure must not leave
        // the deleted inputs recorded.
        self.state.save()?;
        self.reload(level)?;
        self.reload(level + 1)?;
        Ok(true)
    }

    /// Brings `level` back under its cap by merging its oldest tables with
    /// every overlapping table of `level + 1`.
    fn leveled(&mut self, level: u32) -> Result<bool> {
        let count = self.state.size(level) as usize;
        let cap = self.level_cap(level);
        if count <= cap {
            return Ok(false);
        }
        let take = count - cap;

        let sources = &self.tables(level)[..take];
        let mut min_key = sources[0].get_range().0;
        let mut max_key = sources[0].get_range().1;
        for table in &sources[1..] {
            let (first, last) = table.get_range();
            min_key = min_key.min(first);
            max_key = max_key.max(last);
        }

        let next = self.tables(level + 1);
        let (overlapping, survivors): (Vec<&SSTable>, Vec<&SSTable>) =
            next.iter().partition(|t| t.overlaps(min_key, max_key));
        info!(
            level,
            promoted = take,
            overlapping = overlapping.len(),
            cap,
            "leveled compaction"
        );

        // Newest first: the level's own tables by descending index, then the
        // older tables below.
        let inputs: Vec<&SSTable> = sources.iter().rev().chain(overlapping.iter().copied()).collect();
        let first_index = self.state.size(level + 1) + 1;
        let written = self.merge_in_chunks(&inputs, level + 1, first_index)?;

        let mut consumed: Vec<PathBuf> = sources.iter().map(|t| t.dir().to_path_buf()).collect();
        consumed.extend(overlapping.iter().map(|t| t.dir().to_path_buf()));

        let mut next_level: Vec<(String, PathBuf)> = survivors
            .iter()
            .map(|t| (t.get_range().0.to_string(), t.dir().to_path_buf()))
            .collect();
        next_level.extend(
            written
                .iter()
                .map(|t| (t.get_range().0.to_string(), t.dir().to_path_buf())),
        );
        next_level.sort_by(|a, b| a.0.cmp(&b.0));

        let remaining: Vec<PathBuf> = self.tables(level)[take..]
            .iter()
            .map(|t| t.dir().to_path_buf())
            .collect();

        self.state
            .set_size(level + 1, first_index - 1 + written.len() as u32);
        self.state.save()?;

        remove_tables(&consumed);
        let next_dirs: Vec<PathBuf> = next_level.into_iter().map(|(_, dir)| dir).collect();
        renumber(&self.root, level + 1, &next_dirs)?;
        renumber(&self.root, level, &remaining)?;
        self.state.set_size(level + 1, next_dirs.len() as u32);
        self.state.set_size(level, remaining.len() as u32);
        self.state.save()?;
        self.reload(level)?;
        self.reload(level + 1)?;
        Ok(true)
    }

    /// Table cap of `level` under leveled compaction: 0 for level 1,
    /// `multiplier^(level-1)` below it.
    #[must_use]
    pub fn level_cap(&self, level: u32) -> usize {
        if level <= 1 {
            return 0;
        }
        self.multiplier.saturating_pow(level - 1)
    }

    /// Streams the merge of `inputs` into one table.
    fn merge_into_table(
        &self,
        inputs: &[&SSTable],
        level: u32,
        index: u32,
        expected: usize,
    ) -> Result<SSTable> {
        let mut merge = MergeIterator::new(inputs)?;

        // MergeIterator::next_entry() is fallible; surface the first error
        // after the writer has consumed the stream.
        let mut merge_error: Option<anyhow::Error> = None;
        let stream = std::iter::from_fn(|| match merge.next_entry() {
            Ok(next) => next,
            Err(e) => {
                merge_error = Some(e);
                None
            }
        });
        let written = SSTable::flush(&self.root, level, index, &self.opts, expected, stream);

        if let Some(e) = merge_error {
            let _ = fs::remove_dir_all(staging_dir(&self.root, level, index));
            if let Ok(table) = &written {
                let _ = fs::remove_dir_all(table.dir());
            }
            return Err(e.context(format!("merge into level {level} failed")));
        }
        let table = written?;
        debug!(level, index, inputs = inputs.len(), "wrote merged table");
        Ok(table)
    }

    /// Merges `inputs` into consecutive tables of `level`, starting at
    /// `first_index`, each holding at most `memtable_size` records.
    fn merge_in_chunks(&self, inputs: &[&SSTable], level: u32, first_index: u32) -> Result<Vec<SSTable>> {
        let mut merge = MergeIterator::new(inputs)?;
        let mut written = Vec::new();
        let mut chunk: Vec<(String, Record)> = Vec::with_capacity(self.memtable_size);

        let result = (|| -> Result<()> {
            while let Some(pair) = merge.next_entry()? {
                chunk.push(pair);
                if chunk.len() >= self.memtable_size {
                    let index = first_index + written.len() as u32;
                    let rows = std::mem::take(&mut chunk);
                    written.push(SSTable::flush(&self.root, level, index, &self.opts, rows.len(), rows)?);
                }
            }
            if !chunk.is_empty() {
                let index = first_index + written.len() as u32;
                let rows = std::mem::take(&mut chunk);
                written.push(SSTable::flush(&self.root, level, index, &self.opts, rows.len(), rows)?);
            }
            Ok(())
        })();

        if let Err(e) = result {
            for table in &written {
                let _ = fs::remove_dir_all(table.dir());
            }
            return Err(e).with_context(|| format!("merge into level {level} failed"));
        }
        Ok(written)
    }
}

/// Deletes consumed input tables. A failure only leaves garbage behind, so
/// it is logged rather than returned.
fn remove_tables(dirs: &[PathBuf]) {
    for dir in dirs {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to delete compacted table");
        }
    }
}
