//! # Config - StrataKV configuration
//!
//! A single [`Config`] value is built once at startup and handed to
//! `Engine::open`. Nothing reads configuration from global state.
//!
//! Values come from three places, in order:
//!
//! 1. [`Config::default`] - built-in defaults.
//! 2. [`Config::from_env`] - `STRATA_*` environment variables override them;
//!    unparsable values fall back to the default.
//! 3. [`Config::normalized`] - out-of-range values are reset to defaults or
//!    clamped, so an environment-loaded config is always usable.
//!
//! Programmatically built configs (tests, embedders) skip normalization and
//! are checked by [`Config::validate`] instead.
use anyhow::{ensure, Result};
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_WAL_BUFFER_CAPACITY: usize = 10;
const DEFAULT_WAL_WATER_MARK: usize = 20;
const MAX_WAL_WATER_MARK: usize = 99_999;
const DEFAULT_MEMTABLE_SIZE: usize = 20;
const DEFAULT_TABLE_INTERVAL: usize = 10;
const DEFAULT_BLOOM_FPR: f64 = 0.01;
const DEFAULT_BTREE_FANOUT: usize = 3;
const DEFAULT_SKIPLIST_MAX_HEIGHT: usize = 10;
const DEFAULT_LSM_MAX_LEVEL: usize = 4;
const DEFAULT_TOKEN_CAPACITY: u64 = 25;
const DEFAULT_TOKEN_RATE: u64 = 15;
const DEFAULT_LEVELED_MULTIPLIER: usize = 10;
const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Which ordered structure backs the memtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemtableKind {
    #[default]
    BTree,
    SkipList,
}

/// Physical layout of a table on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableLayout {
    /// One `sstable.bin` holding a zone-length header and every zone.
    #[default]
    SingleFile,
    /// One file per zone inside the table directory.
    MultiFile,
}

/// Compaction policy run by the level manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactionPolicy {
    #[default]
    SizeTiered,
    Leveled,
}

impl FromStr for MemtableKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b_tree" | "btree" => Ok(Self::BTree),
            "skiplist" | "skip_list" => Ok(Self::SkipList),
            other => anyhow::bail!("unknown memtable structure {other:?}"),
        }
    }
}

impl FromStr for TableLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::SingleFile),
            "multi" => Ok(Self::MultiFile),
            other => anyhow::bail!("unknown table layout {other:?}"),
        }
    }
}

impl FromStr for CompactionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "size_tiered" => Ok(Self::SizeTiered),
            "leveled" => Ok(Self::Leveled),
            other => anyhow::bail!("unknown compaction policy {other:?}"),
        }
    }
}

/// Every tunable of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root directory; holds `wal/`, `sstable/` and `cache/`.
    pub data_dir: PathBuf,
    /// Entries accumulated by the WAL's buffered mode before a segment is written.
    pub wal_buffer_capacity: usize,
    /// Segment count above which the WAL truncates to its newest segment.
    pub wal_water_mark: usize,
    /// `fsync` every WAL append before acknowledging it.
    pub wal_sync: bool,
    /// Element count that triggers a memtable flush.
    pub memtable_size: usize,
    pub memtable_kind: MemtableKind,
    /// Index records between two summary checkpoints.
    pub table_interval: usize,
    pub bloom_false_positive_rate: f64,
    /// Maximum children per B-tree node.
    pub btree_fanout: usize,
    pub skiplist_max_height: usize,
    pub table_layout: TableLayout,
    pub lsm_max_level: usize,
    pub compaction: CompactionPolicy,
    /// Level `L > 1` holds at most `leveled_multiplier^(L-1)` tables.
    pub leveled_multiplier: usize,
    pub token_capacity: u64,
    /// Tokens added per second.
    pub token_rate: u64,
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            wal_buffer_capacity: DEFAULT_WAL_BUFFER_CAPACITY,
            wal_water_mark: DEFAULT_WAL_WATER_MARK,
            wal_sync: true,
            memtable_size: DEFAULT_MEMTABLE_SIZE,
            memtable_kind: MemtableKind::default(),
            table_interval: DEFAULT_TABLE_INTERVAL,
            bloom_false_positive_rate: DEFAULT_BLOOM_FPR,
            btree_fanout: DEFAULT_BTREE_FANOUT,
            skiplist_max_height: DEFAULT_SKIPLIST_MAX_HEIGHT,
            table_layout: TableLayout::default(),
            lsm_max_level: DEFAULT_LSM_MAX_LEVEL,
            compaction: CompactionPolicy::default(),
            leveled_multiplier: DEFAULT_LEVELED_MULTIPLIER,
            token_capacity: DEFAULT_TOKEN_CAPACITY,
            token_rate: DEFAULT_TOKEN_RATE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Config {
    /// Reads `STRATA_*` environment variables over the defaults, then normalizes.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Config::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        Self {
            data_dir: get("STRATA_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            wal_buffer_capacity: parse_or(get("STRATA_WAL_BUFFER_CAPACITY"), d.wal_buffer_capacity),
            wal_water_mark: parse_or(get("STRATA_WAL_WATER_MARK"), d.wal_water_mark),
            wal_sync: parse_or(get("STRATA_WAL_SYNC"), d.wal_sync),
            memtable_size: parse_or(get("STRATA_MEMTABLE_SIZE"), d.memtable_size),
            memtable_kind: parse_or(get("STRATA_MEMTABLE"), d.memtable_kind),
            table_interval: parse_or(get("STRATA_TABLE_INTERVAL"), d.table_interval),
            bloom_false_positive_rate: parse_or(get("STRATA_BLOOM_FPR"), d.bloom_false_positive_rate),
            btree_fanout: parse_or(get("STRATA_BTREE_FANOUT"), d.btree_fanout),
            skiplist_max_height: parse_or(get("STRATA_SKIPLIST_MAX_HEIGHT"), d.skiplist_max_height),
            table_layout: parse_or(get("STRATA_TABLE_LAYOUT"), d.table_layout),
            lsm_max_level: parse_or(get("STRATA_LSM_MAX_LEVEL"), d.lsm_max_level),
            compaction: parse_or(get("STRATA_COMPACTION"), d.compaction),
            leveled_multiplier: parse_or(get("STRATA_LEVELED_MULTIPLIER"), d.leveled_multiplier),
            token_capacity: parse_or(get("STRATA_TOKEN_CAPACITY"), d.token_capacity),
            token_rate: parse_or(get("STRATA_TOKEN_RATE"), d.token_rate),
            cache_capacity: parse_or(get("STRATA_CACHE_CAPACITY"), d.cache_capacity),
        }
        .normalized()
    }

    /// Resets out-of-range values to their defaults and clamps the rest.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.wal_buffer_capacity < 2 {
            self.wal_buffer_capacity = DEFAULT_WAL_BUFFER_CAPACITY;
        }
        if self.wal_water_mark < 10 {
            self.wal_water_mark = DEFAULT_WAL_WATER_MARK;
        } else if self.wal_water_mark > MAX_WAL_WATER_MARK {
            self.wal_water_mark = MAX_WAL_WATER_MARK;
        }
        if self.memtable_size == 0 {
            self.memtable_size = DEFAULT_MEMTABLE_SIZE;
        }
        if self.table_interval == 0 {
            self.table_interval = DEFAULT_TABLE_INTERVAL;
        }
        if !(self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0) {
            self.bloom_false_positive_rate = DEFAULT_BLOOM_FPR;
        }
        if self.btree_fanout < 3 {
            self.btree_fanout = DEFAULT_BTREE_FANOUT;
        }
        if self.skiplist_max_height == 0 {
            self.skiplist_max_height = DEFAULT_SKIPLIST_MAX_HEIGHT;
        } else if self.skiplist_max_height > 100 {
            self.skiplist_max_height = 99;
        }
        if self.lsm_max_level < DEFAULT_LSM_MAX_LEVEL {
            self.lsm_max_level = DEFAULT_LSM_MAX_LEVEL;
        }
        if self.token_capacity == 0 {
            self.token_capacity = DEFAULT_TOKEN_CAPACITY;
        }
        if self.token_rate == 0 {
            self.token_rate = DEFAULT_TOKEN_RATE;
        }
        if self.leveled_multiplier < 2 {
            self.leveled_multiplier = DEFAULT_LEVELED_MULTIPLIER;
        }
        if self.cache_capacity == 0 {
            self.cache_capacity = DEFAULT_CACHE_CAPACITY;
        }
        self
    }

    /// Checks the invariants the engine relies on.
    ///
    /// `token_rate` may be 0 here: a bucket that never refills is a valid
    /// (if unusual) choice when the config is built in code.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.wal_buffer_capacity >= 1, "wal_buffer_capacity must be >= 1");
        ensure!(self.wal_water_mark >= 1, "wal_water_mark must be >= 1");
        ensure!(self.memtable_size >= 1, "memtable_size must be >= 1");
        ensure!(self.table_interval >= 1, "table_interval must be >= 1");
        ensure!(
            self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0,
            "bloom_false_positive_rate must be in (0, 1)"
        );
        ensure!(self.btree_fanout >= 3, "btree_fanout must be >= 3");
        ensure!(self.skiplist_max_height >= 1, "skiplist_max_height must be >= 1");
        ensure!(self.lsm_max_level >= 2, "lsm_max_level must be >= 2");
        ensure!(self.leveled_multiplier >= 2, "leveled_multiplier must be >= 2");
        ensure!(self.token_capacity >= 1, "token_capacity must be >= 1");
        ensure!(self.cache_capacity >= 1, "cache_capacity must be >= 1");
        Ok(())
    }

    #[must_use]
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    #[must_use]
    pub fn sstable_dir(&self) -> PathBuf {
        self.data_dir.join("sstable")
    }

    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("cache").join("cache.bin")
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests;
