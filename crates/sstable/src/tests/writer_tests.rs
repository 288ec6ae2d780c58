use super::*;
use crate::layout::{DATA_FILE, FILTER_FILE, INDEX_FILE, METADATA_FILE, SINGLE_FILE, SUMMARY_FILE};
use crate::{staging_dir, table_dir, IndexRecord, MerkleTree, Summary, ZoneHeader, HEADER_BYTES};
use bloom::BloomFilter;
use record::{Entry, Record};
use std::fs;
use std::io::Cursor;
use tempfile::tempdir;

// -------------------- Directory layout --------------------

#[test]
fn single_file_layout_files() -> Result<()> {
    let dir = tempdir()?;
    let t = write_table(dir.path(), 1, 1, &opts(TableLayout::SingleFile, 2), &[("a", Some("1"), 1)])?;
    assert_eq!(t.dir(), table_dir(dir.path(), 1, 1));
    assert!(t.dir().join(SINGLE_FILE).exists());
    assert!(t.dir().join(METADATA_FILE).exists());
    assert!(!t.dir().join(DATA_FILE).exists());
    Ok(())
}

#[test]
fn multi_file_layout_files() -> Result<()> {
    let dir = tempdir()?;
    let t = write_table(dir.path(), 2, 3, &opts(TableLayout::MultiFile, 2), &[("a", Some("1"), 1)])?;
    assert_eq!(t.get_position(), (2, 3));
    for name in [DATA_FILE, INDEX_FILE, SUMMARY_FILE, FILTER_FILE, METADATA_FILE] {
        assert!(t.dir().join(name).exists(), "{name} missing");
    }
    assert!(!t.dir().join(SINGLE_FILE).exists());
    Ok(())
}

#[test]
fn staging_directory_is_gone_after_flush() -> Result<()> {
    let dir = tempdir()?;
    write_table(dir.path(), 1, 1, &opts(TableLayout::SingleFile, 2), &[("a", Some("1"), 1)])?;
    assert!(!staging_dir(dir.path(), 1, 1).exists());
    Ok(())
}

#[test]
fn stale_staging_directory_is_replaced() -> Result<()> {
    let dir = tempdir()?;
    let staging = staging_dir(dir.path(), 1, 1);
    fs::create_dir_all(&staging)?;
    fs::write(staging.join("junk"), b"left over from a crash")?;

    let t = write_table(dir.path(), 1, 1, &opts(TableLayout::MultiFile, 2), &[("a", Some("1"), 1)])?;
    assert!(!t.dir().join("junk").exists());
    Ok(())
}

// -------------------- Zone contents --------------------

#[test]
fn single_file_bytes_match_zone_codecs() -> Result<()> {
    let dir = tempdir()?;
    let rows = numbered(5);
    let opts = opts(TableLayout::SingleFile, 2);
    let t = SSTable::flush(dir.path(), 1, 1, &opts, rows.len(), rows.clone())?;
    let bytes = fs::read(t.dir().join(SINGLE_FILE))?;

    let header = ZoneHeader::read_from(&mut Cursor::new(&bytes))?;
    let data_start = HEADER_BYTES as usize;
    let index_start = data_start + header.data_len as usize;
    let summary_start = index_start + header.index_len as usize;
    let filter_start = summary_start + header.summary_len as usize;

    // Data zone: the encoded entries back to back.
    let expected_data: Vec<u8> = rows
        .iter()
        .flat_map(|(k, r)| Entry::new(k.clone(), r.clone()).encode())
        .collect();
    assert_eq!(&bytes[data_start..index_start], expected_data.as_slice());

    // Index zone: one row per entry pointing into the data zone.
    let mut index = Cursor::new(&bytes[index_start..summary_start]);
    let mut offsets = Vec::new();
    while let Some(row) = IndexRecord::read_from(&mut index)? {
        offsets.push((row.key, row.offset));
    }
    assert_eq!(offsets.len(), 5);
    assert_eq!(offsets[0], ("k000".to_string(), 0));
    let first_len = Entry::new("k000", rows[0].1.clone()).encoded_len() as u64;
    assert_eq!(offsets[1], ("k001".to_string(), first_len));

    // Summary: rows 0, 2, 4 are checkpoints for interval 2.
    let summary = Summary::decode(&bytes[summary_start..filter_start])?;
    assert_eq!(summary.first_key, "k000");
    assert_eq!(summary.last_key, "k004");
    let cps: Vec<&str> = summary.checkpoints.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(cps, vec!["k000", "k002", "k004"]);
    assert_eq!(summary.checkpoints[0].offset, 0);

    // Filter: the rest of the file.
    let bloom = BloomFilter::read_from(&mut Cursor::new(&bytes[filter_start..]))?;
    assert_eq!(bloom.expected_items(), 5);
    for (k, _) in &rows {
        assert!(bloom.may_contain(k.as_bytes()));
    }
    Ok(())
}

#[test]
fn metadata_holds_merkle_root_of_entries() -> Result<()> {
    let dir = tempdir()?;
    let rows = numbered(7);
    let t = SSTable::flush(dir.path(), 1, 1, &opts(TableLayout::MultiFile, 3), 7, rows.clone())?;

    let mut tree = MerkleTree::new();
    for (k, r) in rows {
        tree.add_leaf(&Entry::new(k, r).encode());
    }
    assert_eq!(t.merkle_root()?, tree.root_hex());
    Ok(())
}

// -------------------- Refusals --------------------

#[test]
fn empty_input_is_refused() {
    let dir = tempdir().unwrap();
    let res = SSTable::flush(
        dir.path(),
        1,
        1,
        &opts(TableLayout::SingleFile, 2),
        1,
        Vec::<(String, Record)>::new(),
    );
    assert!(res.is_err());
    assert!(!table_dir(dir.path(), 1, 1).exists());
}

#[test]
fn unsorted_input_is_refused() {
    let dir = tempdir().unwrap();
    let res = write_table(
        dir.path(),
        1,
        1,
        &opts(TableLayout::SingleFile, 2),
        &[("b", Some("1"), 1), ("a", Some("2"), 2)],
    );
    assert!(res.is_err());
}

#[test]
fn existing_destination_is_refused() -> Result<()> {
    let dir = tempdir()?;
    let o = opts(TableLayout::SingleFile, 2);
    write_table(dir.path(), 1, 1, &o, &[("a", Some("1"), 1)])?;
    assert!(write_table(dir.path(), 1, 1, &o, &[("b", Some("2"), 2)]).is_err());
    Ok(())
}
