//! Level manager: the set of live tables, level by level.
//!
//! ```text
//! root/
//!   lsm.bin                  level state (see manifest.rs)
//!   level1/sstable1/ ...     memtable flushes, highest index is newest
//!   level2/sstable1/ ...     compaction output
//!   ...
//!   level<max>/
//! ```
//!
//! Every table listed in the state file is opened at startup; its bloom
//! filter and summary stay in memory. After a compaction the affected levels
//! are reopened from disk, since tables may have been renumbered.
use anyhow::{Context, Result};
use config::{CompactionPolicy, Config};
use record::{Record, ScanContext};
use sstable::{level_dir, table_dir, SSTable, TableOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::manifest::LevelState;

/// Suffix of a table directory caught between the two renames of a
/// renumbering pass.
pub(crate) const RENUMBER_SUFFIX: &str = ".renumber";

pub struct LevelManager {
    pub(crate) root: PathBuf,
    pub(crate) opts: TableOptions,
    pub(crate) policy: CompactionPolicy,
    pub(crate) multiplier: usize,
    pub(crate) memtable_size: usize,
    pub(crate) state: LevelState,
    /// `levels[L - 1]` holds level `L`'s tables ordered by index (1..=size).
    pub(crate) levels: Vec<Vec<SSTable>>,
}

impl LevelManager {
    /// Opens (or initializes) the table root.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create `root/` and one directory per level.
    /// 2. Load `lsm.bin`, extending it if `lsm_max_level` grew.
    /// 3. Per level: drop staging directories, finish interrupted renumbering,
    ///    and remove tables numbered past the recorded size.
    /// 4. Open every recorded table.
    pub fn open(root: &Path, config: &Config) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))?;
        let state = LevelState::load_or_create(root, config.lsm_max_level as u32)?;

        let mut manager = Self {
            root: root.to_path_buf(),
            opts: TableOptions::from_config(config),
            policy: config.compaction,
            multiplier: config.leveled_multiplier,
            memtable_size: config.memtable_size,
            levels: Vec::with_capacity(state.max_level as usize),
            state,
        };

        for level in 1..=manager.state.max_level {
            let dir = level_dir(root, level);
            fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
            manager.repair_level(level)?;
            manager.levels.push(Vec::new());
            manager.reload(level)?;
        }
        Ok(manager)
    }

    /// Reopens tables `1..=size` of `level` from disk.
    pub(crate) fn reload(&mut self, level: u32) -> Result<()> {
        let size = self.state.size(level);
        let mut tables = Vec::with_capacity(size as usize);
        for index in 1..=size {
            let table = SSTable::open(&self.root, level, index, &self.opts)
                .with_context(|| format!("failed to open table {index} of level {level}"))?;
            tables.push(table);
        }
        self.levels[level as usize - 1] = tables;
        Ok(())
    }

    /// Cleans up what an interrupted flush, compaction or renumbering left
    /// behind in one level directory.
    fn repair_level(&self, level: u32) -> Result<()> {
        let dir = level_dir(&self.root, level);
        let size = self.state.size(level);

        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.ends_with(".tmp") {
                warn!(dir = %path.display(), "removing staged table left by an interrupted write");
                fs::remove_dir_all(&path)?;
            } else if let Some(base) = name.strip_suffix(RENUMBER_SUFFIX) {
                let target = dir.join(base);
                if !target.exists() {
                    fs::rename(&path, &target)?;
                }
            }
        }

        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            let index = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("sstable"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(index) = index {
                if index > size {
                    warn!(level, index, "removing table not recorded in level state");
                    fs::remove_dir_all(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Writes a drained memtable as the next level-1 table.
    pub fn flush_memtable(&mut self, records: Vec<(String, Record)>) -> Result<()> {
        let index = self.state.size(1) + 1;
        let count = records.len();
        let table = SSTable::flush(&self.root, 1, index, &self.opts, count, records)?;
        self.levels[0].push(table);
        self.state.set_size(1, index);
        self.state.save()?;
        info!(level = 1, index, records = count, "flushed memtable");
        Ok(())
    }

    /// Tables of `level` in lookup order.
    ///
    /// Level 1 and size-tiered levels may overlap, so the newest (highest
    /// index) table is consulted first. Leveled levels above 1 are disjoint
    /// and sorted, and are walked in key order.
    pub(crate) fn search_order(&self, level: u32) -> Box<dyn Iterator<Item = &SSTable> + '_> {
        let tables = &self.levels[level as usize - 1];
        if level == 1 || self.policy == CompactionPolicy::SizeTiered {
            Box::new(tables.iter().rev())
        } else {
            Box::new(tables.iter())
        }
    }

    /// Point lookup across every level. Tombstones are returned as records.
    pub fn find(&self, key: &str) -> Result<Option<Record>> {
        for level in 1..=self.state.max_level {
            for table in self.search_order(level) {
                if let Some(record) = table.find(key)? {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    pub fn range_scan(&self, min: &str, max: &str, scan: &mut ScanContext) -> Result<()> {
        for level in 1..=self.state.max_level {
            for table in self.search_order(level) {
                table.range_scan(min, max, scan)?;
                if scan.is_full() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    pub fn list_scan(&self, prefix: &str, scan: &mut ScanContext) -> Result<()> {
        for level in 1..=self.state.max_level {
            for table in self.search_order(level) {
                table.list_scan(prefix, scan)?;
                if scan.is_full() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Positions of tables whose Merkle root no longer matches their data.
    /// A table whose data cannot even be decoded counts as failed.
    pub fn verify_all(&self) -> Result<Vec<(u32, u32)>> {
        let mut failed = Vec::new();
        for table in self.levels.iter().flatten() {
            let ok = match table.verify_integrity() {
                Ok(ok) => ok,
                Err(e) => {
                    warn!(dir = %table.dir().display(), error = %e, "table failed to decode during verification");
                    false
                }
            };
            if !ok {
                failed.push(table.get_position());
            }
        }
        Ok(failed)
    }

    #[must_use]
    pub fn level_sizes(&self) -> &[u32] {
        &self.state.level_sizes
    }

    #[must_use]
    pub fn current_level(&self) -> u32 {
        self.state.current_level
    }

    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.state.max_level
    }

    /// Open tables of `level`, ordered by index.
    #[must_use]
    pub fn tables(&self, level: u32) -> &[SSTable] {
        &self.levels[level as usize - 1]
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for LevelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelManager")
            .field("root", &self.root)
            .field("policy", &self.policy)
            .field("current_level", &self.state.current_level)
            .field("level_sizes", &self.state.level_sizes)
            .finish()
    }
}

/// Renames the tables in `dirs` to `sstable1..=sstableN` of `level` in the
/// given order.
///
/// Every table first moves to `sstable<I>.renumber`, then to its final name,
/// so no rename ever targets a directory that still holds another table.
pub(crate) fn renumber(root: &Path, level: u32, dirs: &[PathBuf]) -> Result<()> {
    let mut staged = Vec::with_capacity(dirs.len());
    for (i, dir) in dirs.iter().enumerate() {
        let target = table_dir(root, level, i as u32 + 1);
        if *dir == target {
            continue;
        }
        let parked = PathBuf::from(format!("{}{RENUMBER_SUFFIX}", target.display()));
        fs::rename(dir, &parked)
            .with_context(|| format!("failed to park {} for renumbering", dir.display()))?;
        staged.push((parked, target));
    }
    for (parked, target) in staged {
        fs::rename(&parked, &target)
            .with_context(|| format!("failed to move table into {}", target.display()))?;
    }
    Ok(())
}
