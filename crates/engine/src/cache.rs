//! # Read Cache - disk-persisted LRU
//!
//! Sits between the memtable and the tables on the read path. Recency is a
//! doubly linked list threaded through an arena of slots (indices, not
//! pointers) plus a key -> slot map.
//!
//! ```text
//! head (most recent)                               tail (least recent)
//!   [slot 3] <-> [slot 0] <-> [slot 2] <-> [slot 1]
//! ```
//!
//! Every `get` hit, every `set`, and every `delete` that removes something
//! rewrites `cache.bin` in full: the entries from most to least recent,
//! encoded as [`Entry`] records. The rewrite goes through a temp file and a
//! rename. [`LruCache::open`] reads the file back in the same order.
use anyhow::{Context, Result};
use record::{Entry, Record};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct Slot {
    key: String,
    record: Record,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity least-recently-used cache of records.
#[derive(Debug)]
pub struct LruCache {
    path: PathBuf,
    capacity: usize,
    slots: Vec<Slot>,
    free: Vec<usize>,
    map: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruCache {
    /// Opens the cache persisted at `path`, creating its directory if needed.
    ///
    /// At most `capacity` entries are loaded; a missing file yields an empty
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but holds a corrupt entry.
    pub fn open(path: &Path, capacity: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut cache = Self {
            path: path.to_path_buf(),
            capacity: capacity.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            map: HashMap::new(),
            head: None,
            tail: None,
        };
        if !path.exists() {
            return Ok(cache);
        }

        let mut reader = BufReader::new(
            File::open(path).with_context(|| format!("failed to open cache at {}", path.display()))?,
        );
        while cache.map.len() < cache.capacity {
            let entry = Entry::read_from(&mut reader)
                .with_context(|| format!("corrupt cache file {}", path.display()))?;
            let Some(entry) = entry else {
                break;
            };
            if cache.map.contains_key(&entry.key) {
                continue;
            }
            // The file is most-recent first, so each entry goes to the back.
            let slot = cache.alloc(entry.key.clone(), entry.record);
            cache.push_back(slot);
            cache.map.insert(entry.key, slot);
        }
        Ok(cache)
    }

    /// Returns the cached record and marks it most recently used.
    pub fn get(&mut self, key: &str) -> Result<Option<Record>> {
        let Some(&slot) = self.map.get(key) else {
            return Ok(None);
        };
        self.unlink(slot);
        self.push_front(slot);
        self.persist()?;
        Ok(Some(self.slots[slot].record.clone()))
    }

    /// Inserts or replaces `key` as the most recently used entry, evicting
    /// the least recently used one when over capacity.
    pub fn set(&mut self, key: &str, record: Record) -> Result<()> {
        if let Some(&slot) = self.map.get(key) {
            self.slots[slot].record = record;
            self.unlink(slot);
            self.push_front(slot);
        } else {
            let slot = self.alloc(key.to_string(), record);
            self.push_front(slot);
            self.map.insert(key.to_string(), slot);
            if self.map.len() > self.capacity {
                self.evict();
            }
        }
        self.persist()
    }

    /// Removes `key`. Returns `true` if it was cached.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let Some(slot) = self.map.remove(key) else {
            return Ok(false);
        };
        self.unlink(slot);
        self.free.push(slot);
        self.persist()?;
        Ok(true)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            keys.push(self.slots[slot].key.clone());
            cursor = self.slots[slot].next;
        }
        keys
    }

    /// Rewrites the cache file from the in-memory list.
    fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("bin.tmp");
        {
            let file = File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
            let mut out = BufWriter::new(file);
            let mut cursor = self.head;
            while let Some(slot) = cursor {
                let s = &self.slots[slot];
                Entry::new(s.key.clone(), s.record.clone()).write_to(&mut out)?;
                cursor = s.next;
            }
            out.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace cache file {}", self.path.display()))?;
        Ok(())
    }

    fn evict(&mut self) {
        if let Some(slot) = self.tail {
            self.unlink(slot);
            let key = std::mem::take(&mut self.slots[slot].key);
            self.map.remove(&key);
            self.free.push(slot);
        }
    }

    fn alloc(&mut self, key: String, record: Record) -> usize {
        let slot = Slot {
            key,
            record,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = slot;
                i
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[slot].prev = None;
        self.slots[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].next = self.head;
        match self.head {
            Some(h) => self.slots[h].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn push_back(&mut self, slot: usize) {
        self.slots[slot].prev = self.tail;
        match self.tail {
            Some(t) => self.slots[t].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }
}
