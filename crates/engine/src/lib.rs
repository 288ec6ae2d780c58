//! # Engine - StrataKV Storage Engine
//!
//! The orchestrator that ties the [`memtable`], [`wal`] and [`sstable`]
//! crates together with a level manager, a read cache and an admission gate
//! into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌────────────────────────────────────────────────────┐
//! │                      ENGINE                        │
//! │                                                    │
//! │ admission gate (token bucket) on every operation   │
//! │                                                    │
//! │ write.rs → WAL append → Memtable insert            │
//! │              |                                     │
//! │              |  (memtable full?)  yes              │
//! │              v                                     │
//! │           flush → level-1 table, WAL rotation      │
//! │                                                    │
//! │ compact() → size-tiered or leveled, level by level │
//! │                                                    │
//! │ read.rs → Memtable → LRU cache → levels 1..max     │
//! │            (first match wins)                      │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                |
//! |----------------|--------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, `open`, accessors, `Debug`            |
//! | [`recovery`]   | WAL replay into the memtable                           |
//! | `write`        | `put()`, `delete()`, `force_flush()`, `compact()`      |
//! | `read`         | `get()`, `range_scan()`, `list_scan()`                 |
//! | [`levels`]     | Live tables per level, lookups across levels           |
//! | `compaction`   | Size-tiered and leveled compaction                     |
//! | [`manifest`]   | Persistent per-level table counts (`lsm.bin`)          |
//! | [`cache`]      | Disk-persisted LRU read cache                          |
//! | [`admission`]  | Token bucket                                           |
//!
//! ## Crash Safety
//!
//! Every write is appended to the WAL **before** the memtable update. The WAL
//! rotates to a fresh segment only **after** the flushed table and the level
//! state are on disk. Tables are assembled in a staging directory and renamed
//! into place; `lsm.bin` and the cache file are replaced by rename.
pub mod admission;
pub mod cache;
mod compaction;
pub mod levels;
pub mod manifest;
mod read;
pub mod recovery;
mod write;

use anyhow::{Context, Result};
use config::Config;
use memtable::Memtable;
use record::Entry;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use wal::Wal;

pub use admission::TokenBucket;
pub use cache::LruCache;
pub use levels::LevelManager;
pub use read::Page;
pub use record::Record;

/// The storage engine.
///
/// # Write Path
///
/// 1. Take an admission token (denied → `Ok(false)`).
/// 2. Assign a timestamp strictly above every previous one.
/// 3. Append the entry to the WAL.
/// 4. Apply it to the memtable; a full memtable flushes into level 1.
/// 5. Invalidate the key in the read cache.
///
/// # Read Path
///
/// 1. Take an admission token (denied → `Ok(None)`).
/// 2. Memtable (tombstones included), then the LRU cache, then the levels.
/// 3. A tombstone anywhere along the way means not found.
///
/// # Concurrency
///
/// Mutations take `&mut self`. Reads take `&self`; the cache and the token
/// bucket carry their own locks, so an `Engine` behind an `RwLock` serves
/// concurrent readers.
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) mem: Memtable,
    pub(crate) wal: Wal,
    pub(crate) levels: LevelManager,
    pub(crate) cache: Mutex<LruCache>,
    pub(crate) gate: TokenBucket,
    /// Timestamp of the newest write, replayed or live.
    pub(crate) last_timestamp: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.config.data_dir)
            .field("memtable_kind", &self.mem.kind())
            .field("memtable_entries", &self.mem.len())
            .field("memtable_capacity", &self.mem.capacity())
            .field("wal_segments", &self.wal.current_offset())
            .field("compaction", &self.config.compaction)
            .field("current_level", &self.levels.current_level())
            .field("level_sizes", &self.levels.level_sizes())
            .field("cache_entries", &self.cache().len())
            .field("tokens", &self.gate.available())
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

impl Engine {
    /// Opens the store described by `config`, recovering whatever is on disk.
    ///
    /// # Recovery Steps
    ///
    /// 1. Validate the configuration and create `data_dir`.
    /// 2. Open the level manager: load `lsm.bin`, clean up interrupted writes,
    ///    open every recorded table.
    /// 3. Open the WAL directory and the persisted cache.
    /// 4. Replay the newest WAL segment into a fresh memtable and seed the
    ///    timestamp clock from it.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal for the store: the state file, the WAL
    /// directory or the cache file could not be established.
    pub fn open(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create {}", config.data_dir.display()))?;

        let mut levels = LevelManager::open(&config.sstable_dir(), &config)?;
        let mut wal = Wal::open(
            config.wal_dir(),
            config.wal_water_mark,
            config.wal_buffer_capacity,
            config.wal_sync,
        )
        .context("failed to open WAL directory")?;
        let cache = LruCache::open(&config.cache_path(), config.cache_capacity)?;

        let mut mem = Memtable::from_config(&config);
        let replayed = recovery::replay_wal(&mut wal, &mut mem, &mut levels)?;
        let last_timestamp = replayed.max(recovery::newest_table_timestamp(&levels)?);

        info!(
            data_dir = %config.data_dir.display(),
            memtable = mem.len(),
            level_sizes = ?levels.level_sizes(),
            last_timestamp,
            "engine opened"
        );

        Ok(Self {
            gate: TokenBucket::new(config.token_capacity, config.token_rate),
            cache: Mutex::new(cache),
            config,
            mem,
            wal,
            levels,
            last_timestamp,
        })
    }

    /// Takes one admission token, logging a denial.
    pub(crate) fn admit(&self, op: &'static str) -> bool {
        let admitted = self.gate.take();
        if !admitted {
            debug!(op, "admission denied");
        }
        admitted
    }

    pub(crate) fn cache(&self) -> MutexGuard<'_, LruCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn cache_mut(&mut self) -> &mut LruCache {
        self.cache.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks every live table's Merkle root and returns the `(level, index)`
    /// of each table that fails.
    pub fn verify_tables(&self) -> Result<Vec<(u32, u32)>> {
        self.levels.verify_all()
    }

    /// Every record of every WAL segment, oldest first.
    pub fn wal_entries(&self) -> Result<Vec<Entry>> {
        Ok(self.wal.read_all()?)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Keys in the memtable, tombstones included.
    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    #[must_use]
    pub fn levels(&self) -> &LevelManager {
        &self.levels
    }

    /// Table count per level, level 1 first.
    #[must_use]
    pub fn level_sizes(&self) -> Vec<u32> {
        self.levels.level_sizes().to_vec()
    }

    /// Cached keys from most to least recently used.
    #[must_use]
    pub fn cache_keys(&self) -> Vec<String> {
        self.cache().keys()
    }

    #[must_use]
    pub fn wal_segments(&self) -> usize {
        self.wal.current_offset()
    }

    #[must_use]
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }
}

#[cfg(test)]
mod tests;
