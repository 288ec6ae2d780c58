use anyhow::{bail, ensure, Context, Result};
use bloom::BloomFilter;
use record::{Entry, Record};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::format::{IndexRecord, Summary};
use crate::layout::{write_synced, write_zones, ZoneBytes, METADATA_FILE};
use crate::merkle::MerkleTree;
use crate::{staging_dir, table_dir, SSTable, TableOptions};

impl SSTable {
    /// Writes `records` as table `index` of `level` under `root` and opens it.
    ///
    /// `records` must be in strictly ascending key order (a drained memtable
    /// or a merge stream). `expected` sizes the bloom filter.
    ///
    /// # Crash Safety
    ///
    /// Every zone is written and fsynced inside `sstable<I>.tmp/`, which is
    /// then renamed to `sstable<I>/`. A crash leaves at most a staging
    /// directory, which the level manager removes on the next open.
    ///
    /// # Errors
    ///
    /// Refuses an empty input, unsorted keys, or a destination that already
    /// exists; propagates any I/O failure.
    pub fn flush<I>(
        root: &Path,
        level: u32,
        index: u32,
        opts: &TableOptions,
        expected: usize,
        records: I,
    ) -> Result<SSTable>
    where
        I: IntoIterator<Item = (String, Record)>,
    {
        let mut bloom = BloomFilter::new(expected.max(1), opts.bloom_fpr);
        let mut merkle = MerkleTree::new();
        let mut data = Vec::new();
        let mut index_zone = Vec::new();
        let mut checkpoints = Vec::new();
        let mut first_key: Option<String> = None;
        let mut last_key: Option<String> = None;
        let mut count = 0usize;

        for (key, record) in records {
            if let Some(prev) = &last_key {
                ensure!(
                    key.as_str() > prev.as_str(),
                    "keys out of order: {prev:?} then {key:?}"
                );
            }

            // Every interval-th index row (starting with the first) is a checkpoint.
            if count % opts.interval == 0 {
                checkpoints.push(IndexRecord::new(index_zone.len() as u64, key.clone()));
            }
            IndexRecord::new(data.len() as u64, key.clone()).encode_into(&mut index_zone);

            bloom.insert(key.as_bytes());
            let entry = Entry::new(key, record);
            let encoded = entry.encode();
            merkle.add_leaf(&encoded);
            data.extend_from_slice(&encoded);

            if first_key.is_none() {
                first_key = Some(entry.key.clone());
            }
            last_key = Some(entry.key);
            count += 1;
        }

        let (Some(first_key), Some(last_key)) = (first_key, last_key) else {
            bail!("refusing to write an empty table");
        };

        let summary = Summary {
            first_key,
            last_key,
            checkpoints,
        }
        .encode();
        let mut filter = Vec::with_capacity(bloom.serialized_size());
        bloom.write_to(&mut filter)?;

        let final_dir = table_dir(root, level, index);
        ensure!(
            !final_dir.exists(),
            "table {} already exists",
            final_dir.display()
        );
        let staging = staging_dir(root, level, index);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("create {}", staging.display()))?;

        write_zones(
            &staging,
            opts.layout,
            &ZoneBytes {
                data: &data,
                index: &index_zone,
                summary: &summary,
                filter: &filter,
            },
        )?;
        write_synced(&staging.join(METADATA_FILE), merkle.root_hex().as_bytes())?;

        fs::rename(&staging, &final_dir)
            .with_context(|| format!("rename {} into place", staging.display()))?;
        if let Some(parent) = final_dir.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(level, index, records = count, dir = %final_dir.display(), "wrote table");
        SSTable::open(root, level, index, opts)
    }
}
