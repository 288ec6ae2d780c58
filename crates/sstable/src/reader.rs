use anyhow::{Context, Result};
use bloom::BloomFilter;
use record::{Entry, EntryError, Record, ScanContext};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::format::{IndexRecord, Summary};
use crate::layout::{Zone, Zones, METADATA_FILE};
use crate::merge::TableIter;
use crate::merkle::MerkleTree;
use crate::{table_dir, TableOptions};

/// An immutable on-disk table.
///
/// [`open`](SSTable::open) loads the bloom filter and the summary into memory.
/// The index and data zones stay on disk: a lookup reads at most one index
/// interval plus one entry.
pub struct SSTable {
    dir: PathBuf,
    level: u32,
    index: u32,
    interval: usize,
    bloom: BloomFilter,
    summary: Summary,
    zones: Zones,
}

impl SSTable {
    /// Opens table `index` of `level` under `root`.
    pub fn open(root: &Path, level: u32, index: u32, opts: &TableOptions) -> Result<Self> {
        let dir = table_dir(root, level, index);
        let zones = Zones::locate(&dir, opts.layout)
            .with_context(|| format!("locate zones of {}", dir.display()))?;

        let bloom = BloomFilter::read_from(&mut zones.filter.reader_at(0)?)
            .with_context(|| format!("read bloom filter of {}", dir.display()))?;
        let summary = Summary::decode(&zones.summary.read_all()?)
            .with_context(|| format!("read summary of {}", dir.display()))?;

        Ok(Self {
            dir,
            level,
            index,
            interval: opts.interval,
            bloom,
            summary,
            zones,
        })
    }

    /// `(first_key, last_key)` of this table.
    #[must_use]
    pub fn get_range(&self) -> (&str, &str) {
        (&self.summary.first_key, &self.summary.last_key)
    }

    /// `(level, index)` this table was opened as.
    #[must_use]
    pub fn get_position(&self) -> (u32, u32) {
        (self.level, self.index)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn is_in_bloom(&self, key: &str) -> bool {
        self.bloom.may_contain(key.as_bytes())
    }

    /// Returns `true` if this table's key range intersects `[min, max]`.
    #[must_use]
    pub fn overlaps(&self, min: &str, max: &str) -> bool {
        self.summary.first_key.as_str() <= max && self.summary.last_key.as_str() >= min
    }

    /// Point lookup. Tombstones are returned as records; the caller decides
    /// what they mean.
    ///
    /// 1. bloom filter, 2. key range, 3. checkpoint binary search,
    /// 4. scan at most one interval of index rows, 5. read one entry.
    pub fn find(&self, key: &str) -> Result<Option<Record>> {
        if !self.is_in_bloom(key) || !self.summary.covers(key) {
            return Ok(None);
        }

        let checkpoint = &self.summary.checkpoints[self.summary.checkpoint_for(key)];
        let mut rows = self.zones.index.reader_at(checkpoint.offset)?;
        for _ in 0..self.interval {
            let Some(row) = IndexRecord::read_from(&mut rows)? else {
                break;
            };
            match row.key.as_str().cmp(key) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Equal => {
                    let mut data = DataReader::open(&self.zones.data)?;
                    return Ok(Some(data.read_at(row.offset, &self.dir)?.record));
                }
            }
        }
        Ok(None)
    }

    /// Feeds every key in `[min, max]` not already decided to `scan`,
    /// stopping once the page is full.
    pub fn range_scan(&self, min: &str, max: &str, scan: &mut ScanContext) -> Result<()> {
        if min > max || !self.overlaps(min, max) {
            return Ok(());
        }
        self.scan_from(min, scan, |k| k > max, |_| true)
    }

    /// Feeds every key starting with `prefix` not already decided to `scan`.
    pub fn list_scan(&self, prefix: &str, scan: &mut ScanContext) -> Result<()> {
        let (first, last) = self.get_range();
        if last < prefix || (first > prefix && !first.starts_with(prefix)) {
            return Ok(());
        }
        self.scan_from(
            prefix,
            scan,
            |k| k > prefix && !k.starts_with(prefix),
            |k| k.starts_with(prefix),
        )
    }

    /// Sequential iterator over every entry, in key order.
    pub fn entries(&self) -> Result<TableIter> {
        Ok(TableIter::new(self.zones.data.reader_at(0)?, self.dir.clone()))
    }

    /// Merkle root recorded when the table was written.
    pub fn merkle_root(&self) -> Result<String> {
        let path = self.dir.join(METADATA_FILE);
        let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(raw.trim().to_string())
    }

    /// Recomputes the Merkle root from the data zone and compares it with
    /// the recorded one.
    pub fn verify_integrity(&self) -> Result<bool> {
        let mut tree = MerkleTree::new();
        let mut iter = self.entries()?;
        while let Some(entry) = iter.next_entry()? {
            tree.add_leaf(&entry.encode());
        }
        Ok(tree.root_hex() == self.merkle_root()?)
    }

    /// Walks index intervals from the checkpoint covering `lower`, reading
    /// data only for rows that pass `accept` and are still undecided.
    fn scan_from<S, A>(&self, lower: &str, scan: &mut ScanContext, past_end: S, accept: A) -> Result<()>
    where
        S: Fn(&str) -> bool,
        A: Fn(&str) -> bool,
    {
        if scan.is_full() {
            return Ok(());
        }
        let start = self.summary.checkpoint_for(lower);
        let mut rows = self.zones.index.reader_at(self.summary.checkpoints[start].offset)?;
        let mut data = DataReader::open(&self.zones.data)?;

        while let Some(row) = IndexRecord::read_from(&mut rows)? {
            let key = row.key.as_str();
            if key < lower {
                continue;
            }
            if past_end(key) {
                break;
            }
            if !accept(key) || scan.is_decided(key) {
                continue;
            }
            let entry = data.read_at(row.offset, &self.dir)?;
            scan.offer(&entry.key, &entry.record);
            if scan.is_full() {
                break;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("level", &self.level)
            .field("index", &self.index)
            .field("first_key", &self.summary.first_key)
            .field("last_key", &self.summary.last_key)
            .field("checkpoints", &self.summary.checkpoints.len())
            .finish()
    }
}

/// Random-access reader over a data zone.
struct DataReader {
    file: BufReader<File>,
    zone_start: u64,
    zone_len: u64,
}

impl DataReader {
    fn open(zone: &Zone) -> Result<Self> {
        let file = File::open(&zone.path).with_context(|| format!("open {}", zone.path.display()))?;
        Ok(Self {
            file: BufReader::new(file),
            zone_start: zone.start,
            zone_len: zone.len,
        })
    }

    fn read_at(&mut self, offset: u64, table: &Path) -> Result<Entry> {
        anyhow::ensure!(
            offset < self.zone_len,
            "index points past data zone in {}",
            table.display()
        );
        self.file.seek(SeekFrom::Start(self.zone_start + offset))?;
        let mut limited = (&mut self.file).take(self.zone_len - offset);
        Entry::read_from(&mut limited)
            .and_then(|entry| entry.ok_or(EntryError::Truncated))
            .with_context(|| format!("read entry at {offset} in {}", table.display()))
    }
}
