//! Read path: `get()`, `range_scan()`, `list_scan()`.
//!
//! Point lookups check the memtable, then the read cache, then the tables
//! level by level. The first record found decides: a tombstone means the key
//! is gone. Live records found outside the cache are cached on the way out.
//!
//! Scans feed the memtable and then the tables into one [`ScanContext`],
//! which keeps the newest copy of each key and cuts out the requested page.
use anyhow::{ensure, Result};
use record::{Record, ScanContext};

use crate::Engine;

/// One page of scan results: keys and their records, in scan order.
pub type Page = (Vec<String>, Vec<Record>);

impl Engine {
    /// Looks up `key`, returning its live record.
    ///
    /// Returns `Ok(None)` for a missing or deleted key, and when the
    /// admission gate denies the call.
    ///
    /// # Errors
    ///
    /// Returns an error if a table or the cache file cannot be read.
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        if !self.admit("get") {
            return Ok(None);
        }

        if let Some(record) = self.mem.find(key) {
            if record.tombstone {
                return Ok(None);
            }
            self.cache().set(key, record.clone())?;
            return Ok(Some(record.clone()));
        }

        if let Some(record) = self.cache().get(key)? {
            return Ok(Some(record));
        }

        match self.levels.find(key)? {
            Some(record) if !record.tombstone => {
                self.cache().set(key, record.clone())?;
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    /// Page `page_num` (1-based) of `page_len` live keys in `[min_key, max_key]`.
    ///
    /// Returns `Ok(None)` for an empty page or a denied call.
    ///
    /// # Errors
    ///
    /// `page_len` and `page_num` must both be at least 1.
    pub fn range_scan(
        &self,
        min_key: &str,
        max_key: &str,
        page_len: usize,
        page_num: usize,
    ) -> Result<Option<Page>> {
        check_page(page_len, page_num)?;
        if !self.admit("range_scan") {
            return Ok(None);
        }

        let mut scan = ScanContext::new(page_len, page_num);
        self.mem.range_scan(min_key, max_key, &mut scan);
        if !scan.is_full() {
            self.levels.range_scan(min_key, max_key, &mut scan)?;
        }
        Ok(scan.into_page())
    }

    /// Page `page_num` (1-based) of `page_len` live keys starting with `prefix`.
    pub fn list_scan(&self, prefix: &str, page_len: usize, page_num: usize) -> Result<Option<Page>> {
        check_page(page_len, page_num)?;
        if !self.admit("list_scan") {
            return Ok(None);
        }

        let mut scan = ScanContext::new(page_len, page_num);
        self.mem.list_scan(prefix, &mut scan);
        if !scan.is_full() {
            self.levels.list_scan(prefix, &mut scan)?;
        }
        Ok(scan.into_page())
    }
}

fn check_page(page_len: usize, page_num: usize) -> Result<()> {
    ensure!(page_len >= 1, "page length must be at least 1");
    ensure!(page_num >= 1, "page number must be at least 1");
    Ok(())
}
