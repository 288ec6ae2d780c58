mod merge_tests;
mod writer_tests;

use crate::{SSTable, TableOptions};
use anyhow::Result;
use config::TableLayout;
use record::Record;
use std::path::Path;

pub(crate) const LAYOUTS: [TableLayout; 2] = [TableLayout::SingleFile, TableLayout::MultiFile];

pub(crate) fn opts(layout: TableLayout, interval: usize) -> TableOptions {
    TableOptions::new(layout, interval, 0.01)
}

/// `(key, value, timestamp)`; a `None` value writes a tombstone.
pub(crate) fn write_table(
    root: &Path,
    level: u32,
    index: u32,
    opts: &TableOptions,
    rows: &[(&str, Option<&str>, u64)],
) -> Result<SSTable> {
    let records: Vec<(String, Record)> = rows
        .iter()
        .map(|&(k, v, ts)| {
            let record = match v {
                Some(v) => Record::live(v.as_bytes().to_vec(), ts),
                None => Record::tombstone(ts),
            };
            (k.to_string(), record)
        })
        .collect();
    SSTable::flush(root, level, index, opts, records.len(), records)
}

/// Keys `k000..k{n-1}` with value `v{i}` at timestamp `i`.
pub(crate) fn numbered(n: usize) -> Vec<(String, Record)> {
    (0..n)
        .map(|i| {
            (
                format!("k{i:03}"),
                Record::live(format!("v{i}").into_bytes(), i as u64),
            )
        })
        .collect()
}
