use std::collections::HashSet;

use crate::Record;

/// Pagination and deduplication state for one ranged or prefix query.
///
/// Sources are visited newest to oldest (memtable first, then tables). The
/// first time a key is seen decides its fate:
///
/// - a live record is *accepted*: it counts as a match and, if the running
///   match number falls inside the requested page, it is kept;
/// - a tombstone marks the key *removed*, hiding every older copy.
///
/// Pages are 1-based: page `n` of length `len` covers matches
/// `(n - 1) * len + 1 ..= n * len`.
#[derive(Debug, Default)]
pub struct ScanContext {
    found: usize,
    page_start: usize,
    page_end: usize,
    keys: Vec<String>,
    records: Vec<Record>,
    removed: HashSet<String>,
    selected: HashSet<String>,
}

impl ScanContext {
    /// Creates the context for page `page_num` of `page_len` matches.
    ///
    /// Both arguments must be at least 1; the engine rejects other values
    /// before building a context. A window past `usize::MAX` saturates and
    /// matches nothing.
    pub fn new(page_len: usize, page_num: usize) -> Self {
        let page_len = page_len.max(1);
        let page_num = page_num.max(1);
        Self {
            page_start: (page_num - 1).saturating_mul(page_len).saturating_add(1),
            page_end: page_num.saturating_mul(page_len),
            ..Self::default()
        }
    }

    /// Feeds one candidate (already known to satisfy the range or prefix).
    pub fn offer(&mut self, key: &str, record: &Record) {
        if self.removed.contains(key) || self.selected.contains(key) {
            return;
        }
        if record.tombstone {
            self.removed.insert(key.to_string());
            return;
        }
        self.selected.insert(key.to_string());
        self.found += 1;
        if self.found >= self.page_start && self.found <= self.page_end {
            self.keys.push(key.to_string());
            self.records.push(record.clone());
        }
    }

    /// Returns `true` once `key` has been decided by a newer source.
    #[must_use]
    pub fn is_decided(&self, key: &str) -> bool {
        self.removed.contains(key) || self.selected.contains(key)
    }

    /// Returns `true` once the page end has been reached; sources stop early.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.found >= self.page_end
    }

    /// Matches counted so far, across pages.
    #[must_use]
    pub fn found(&self) -> usize {
        self.found
    }

    #[must_use]
    pub fn page_start(&self) -> usize {
        self.page_start
    }

    #[must_use]
    pub fn page_end(&self) -> usize {
        self.page_end
    }

    /// Consumes the context, returning the page or `None` if it is empty.
    pub fn into_page(self) -> Option<(Vec<String>, Vec<Record>)> {
        if self.keys.is_empty() {
            None
        } else {
            Some((self.keys, self.records))
        }
    }
}
