//! Arena-backed skip list.
//!
//! ```text
//! Level 2:  HEAD ──────────────► g ──────────────────► NIL
//! Level 1:  HEAD ──────► c ────► g ──────► q ────────► NIL
//! Level 0:  HEAD ► a ──► c ► e ► g ► m ──► q ► t ────► NIL
//! ```
//!
//! Forward pointers are `Option<usize>` slots into `nodes`; slot 0 is the
//! head sentinel and carries `max_height` pointers. A new node's height is the
//! number of consecutive heads from a fair coin, capped at `max_height`.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use record::Record;

use crate::OrderedStore;

const HEAD: usize = 0;

#[derive(Debug)]
struct SkipNode {
    key: String,
    record: Record,
    forward: Vec<Option<usize>>,
}

/// Probabilistic sorted list keyed by string.
#[derive(Debug)]
pub struct SkipList {
    nodes: Vec<SkipNode>,
    /// Slots freed by [`SkipList::remove_physical`].
    free: Vec<usize>,
    max_height: usize,
    height: usize,
    len: usize,
    rng: StdRng,
}

impl SkipList {
    /// # Panics
    ///
    /// Panics if `max_height` is 0.
    pub fn new(max_height: usize) -> Self {
        Self::with_rng(max_height, StdRng::from_entropy())
    }

    /// Deterministic tower heights, for tests and benchmarks.
    pub fn with_seed(max_height: usize, seed: u64) -> Self {
        Self::with_rng(max_height, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_height: usize, rng: StdRng) -> Self {
        assert!(max_height > 0, "max_height must be > 0");
        Self {
            nodes: vec![Self::head(max_height)],
            free: Vec::new(),
            max_height,
            height: 1,
            len: 0,
            rng,
        }
    }

    fn head(max_height: usize) -> SkipNode {
        SkipNode {
            key: String::new(),
            record: Record::tombstone(0),
            forward: vec![None; max_height],
        }
    }

    /// Tallest tower currently linked.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    fn roll(&mut self) -> usize {
        let mut level = 1;
        while level < self.max_height && self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    /// Returns the last node before `key` on every level, bottom first.
    fn predecessors(&self, key: &str) -> Vec<usize> {
        let mut update = vec![HEAD; self.max_height];
        let mut x = HEAD;
        for level in (0..self.height).rev() {
            while let Some(next) = self.nodes[x].forward[level] {
                if self.nodes[next].key.as_str() < key {
                    x = next;
                } else {
                    break;
                }
            }
            update[level] = x;
        }
        update
    }

    fn find_slot(&self, key: &str) -> Option<usize> {
        let update = self.predecessors(key);
        self.nodes[update[0]].forward[0].filter(|&n| self.nodes[n].key == key)
    }

    /// Unlinks `key` entirely. The engine never calls this; deletes are
    /// tombstones so that flushes carry them to disk.
    pub fn remove_physical(&mut self, key: &str) -> bool {
        let update = self.predecessors(key);
        let Some(target) = self.nodes[update[0]].forward[0].filter(|&n| self.nodes[n].key == key)
        else {
            return false;
        };

        for level in 0..self.height {
            if self.nodes[update[level]].forward[level] == Some(target) {
                self.nodes[update[level]].forward[level] = self.nodes[target].forward[level];
            }
        }
        while self.height > 1 && self.nodes[HEAD].forward[self.height - 1].is_none() {
            self.height -= 1;
        }

        self.nodes[target].forward.clear();
        self.nodes[target].key.clear();
        self.free.push(target);
        self.len -= 1;
        true
    }
}

impl OrderedStore for SkipList {
    fn upsert(&mut self, key: &str, record: Record) -> bool {
        let mut update = self.predecessors(key);
        if let Some(n) = self.nodes[update[0]].forward[0] {
            if self.nodes[n].key == key {
                self.nodes[n].record = record;
                return false;
            }
        }

        let height = self.roll();
        if height > self.height {
            for slot in update.iter_mut().take(height).skip(self.height) {
                *slot = HEAD;
            }
            self.height = height;
        }

        let forward = (0..height)
            .map(|level| self.nodes[update[level]].forward[level])
            .collect();
        let node = SkipNode {
            key: key.to_string(),
            record,
            forward,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        for (level, &prev) in update.iter().enumerate().take(height) {
            self.nodes[prev].forward[level] = Some(id);
        }
        self.len += 1;
        true
    }

    fn get(&self, key: &str) -> Option<&Record> {
        self.find_slot(key).map(|n| &self.nodes[n].record)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn walk_from(&self, from: &str, visit: &mut dyn FnMut(&str, &Record) -> bool) {
        let update = self.predecessors(from);
        let mut cursor = self.nodes[update[0]].forward[0];
        while let Some(n) = cursor {
            let node = &self.nodes[n];
            if !visit(&node.key, &node.record) {
                return;
            }
            cursor = node.forward[0];
        }
    }

    fn clear(&mut self) {
        self.nodes = vec![Self::head(self.max_height)];
        self.free.clear();
        self.height = 1;
        self.len = 0;
    }
}
