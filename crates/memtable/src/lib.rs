//! # Memtable
//!
//! The mutable, bounded, in-memory sorted map that absorbs writes before they
//! become an immutable level-1 table.
//!
//! Two backings implement the same [`OrderedStore`] contract:
//!
//! | Backing          | Module       | Notes                                   |
//! |------------------|--------------|-----------------------------------------|
//! | [`BTree`]        | `btree`      | bounded fan-out, rotate before split    |
//! | [`SkipList`]     | `skiplist`   | coin-flip tower heights                 |
//!
//! [`Memtable`] wraps whichever one the configuration picked and owns the
//! flush trigger: the `put` or `remove` that brings the element count up to
//! capacity drains the structure into a [`FlushTarget`] before returning.
//!
//! Deletes never unlink anything. A removed key holds a tombstone record so
//! the flush writes the deletion to disk, where it shadows older tables.
mod btree;
mod skiplist;

pub use btree::BTree;
pub use skiplist::SkipList;

use anyhow::Result;
use config::{Config, MemtableKind};
use record::{Record, ScanContext};

/// Shared capability of the memtable backings.
pub trait OrderedStore {
    /// Inserts or replaces `key`. Returns `true` if the key was new.
    fn upsert(&mut self, key: &str, record: Record) -> bool;

    fn get(&self, key: &str) -> Option<&Record>;

    /// Number of keys, tombstones included.
    fn len(&self) -> usize;

    /// Visits keys `>= from` in ascending order until `visit` returns `false`.
    fn walk_from(&self, from: &str, visit: &mut dyn FnMut(&str, &Record) -> bool);

    fn clear(&mut self);
}

/// Receives the sorted contents of a full memtable.
///
/// The engine implements this by writing a new level-1 table and rotating the
/// WAL; tests implement it with a plain `Vec`.
pub trait FlushTarget {
    fn flush_sorted(&mut self, records: Vec<(String, Record)>) -> Result<()>;
}

#[derive(Debug)]
enum Backing {
    BTree(BTree),
    SkipList(SkipList),
}

impl Backing {
    fn store(&self) -> &dyn OrderedStore {
        match self {
            Backing::BTree(t) => t,
            Backing::SkipList(s) => s,
        }
    }

    fn store_mut(&mut self) -> &mut dyn OrderedStore {
        match self {
            Backing::BTree(t) => t,
            Backing::SkipList(s) => s,
        }
    }
}

/// Capacity-bounded sorted map from key to [`Record`].
#[derive(Debug)]
pub struct Memtable {
    backing: Backing,
    capacity: usize,
}

impl Memtable {
    /// Creates an empty memtable that flushes once it holds `capacity` keys.
    pub fn new(kind: MemtableKind, capacity: usize, btree_fanout: usize, skiplist_height: usize) -> Self {
        let backing = match kind {
            MemtableKind::BTree => Backing::BTree(BTree::new(btree_fanout)),
            MemtableKind::SkipList => Backing::SkipList(SkipList::new(skiplist_height)),
        };
        Self {
            backing,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.memtable_kind,
            config.memtable_size,
            config.btree_fanout,
            config.skiplist_max_height,
        )
    }

    #[must_use]
    pub fn kind(&self) -> MemtableKind {
        match self.backing {
            Backing::BTree(_) => MemtableKind::BTree,
            Backing::SkipList(_) => MemtableKind::SkipList,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backing.store().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores `record` under `key`, flushing into `target` if the memtable
    /// is now full. Returns `true` if a flush happened.
    pub fn put(&mut self, key: &str, record: Record, target: &mut dyn FlushTarget) -> Result<bool> {
        self.backing.store_mut().upsert(key, record);
        if self.len() >= self.capacity {
            self.flush(target)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Replaces `key` with a tombstone stamped `timestamp`, inserting one if
    /// the key is absent. May flush, like [`put`](Memtable::put).
    pub fn remove(&mut self, key: &str, timestamp: u64, target: &mut dyn FlushTarget) -> Result<bool> {
        self.put(key, Record::tombstone(timestamp), target)
    }

    /// Returns the stored record, tombstones included.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&Record> {
        self.backing.store().get(key)
    }

    /// Every entry in ascending key order.
    pub fn sorted_entries(&self) -> Vec<(String, Record)> {
        let mut out = Vec::with_capacity(self.len());
        self.backing.store().walk_from("", &mut |k, r| {
            out.push((k.to_string(), r.clone()));
            true
        });
        out
    }

    /// Hands every entry to `target` in sorted order, then empties the
    /// structure. An empty memtable flushes nothing.
    ///
    /// If `target` fails the contents are kept, so nothing acknowledged is lost.
    pub fn flush(&mut self, target: &mut dyn FlushTarget) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        target.flush_sorted(self.sorted_entries())?;
        self.backing.store_mut().clear();
        Ok(())
    }

    /// Feeds keys in `[min, max]` to `scan` in ascending order.
    pub fn range_scan(&self, min: &str, max: &str, scan: &mut ScanContext) {
        if min > max {
            return;
        }
        self.backing.store().walk_from(min, &mut |k, r| {
            if k > max {
                return false;
            }
            scan.offer(k, r);
            !scan.is_full()
        });
    }

    /// Feeds keys starting with `prefix` to `scan` in ascending order.
    pub fn list_scan(&self, prefix: &str, scan: &mut ScanContext) {
        self.backing.store().walk_from(prefix, &mut |k, r| {
            if !k.starts_with(prefix) {
                return false;
            }
            scan.offer(k, r);
            !scan.is_full()
        });
    }
}

#[cfg(test)]
mod tests;
