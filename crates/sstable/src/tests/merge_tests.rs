use super::*;
use crate::MergeIterator;
use tempfile::tempdir;

type Row<'a> = (&'a str, Option<&'a str>, u64);

fn merged(tables: &[&SSTable]) -> Result<Vec<(String, Record)>> {
    MergeIterator::new(tables)?.collect_all()
}

fn table(root: &Path, index: u32, rows: &[Row<'_>]) -> Result<SSTable> {
    write_table(root, 1, index, &opts(TableLayout::SingleFile, 2), rows)
}

// -------------------- Basic merge --------------------

#[test]
fn merge_single_table() -> Result<()> {
    let dir = tempdir()?;
    let t = table(dir.path(), 1, &[("a", Some("1"), 1), ("b", Some("2"), 2), ("c", Some("3"), 3)])?;
    let out = merged(&[&t])?;
    let keys: Vec<&str> = out.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn merge_interleaves_disjoint_tables() -> Result<()> {
    let dir = tempdir()?;
    let t1 = table(dir.path(), 1, &[("a", Some("1"), 1), ("c", Some("3"), 1), ("e", Some("5"), 1)])?;
    let t2 = table(dir.path(), 2, &[("b", Some("2"), 2), ("d", Some("4"), 2), ("f", Some("6"), 2)])?;
    let out = merged(&[&t2, &t1])?;
    let keys: Vec<&str> = out.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c", "d", "e", "f"]);
    Ok(())
}

// -------------------- Conflicts --------------------

#[test]
fn newest_timestamp_wins_regardless_of_input_order() -> Result<()> {
    let dir = tempdir()?;
    let old = table(dir.path(), 1, &[("k", Some("old"), 1)])?;
    let new = table(dir.path(), 2, &[("k", Some("new"), 7)])?;

    for inputs in [[&new, &old], [&old, &new]] {
        let out = merged(&inputs)?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.value, b"new");
        assert_eq!(out[0].1.timestamp, 7);
    }
    Ok(())
}

#[test]
fn equal_timestamps_prefer_first_input() -> Result<()> {
    let dir = tempdir()?;
    let first = table(dir.path(), 1, &[("k", Some("first"), 5)])?;
    let second = table(dir.path(), 2, &[("k", Some("second"), 5)])?;
    let out = merged(&[&first, &second])?;
    assert_eq!(out[0].1.value, b"first");
    Ok(())
}

#[test]
fn tombstones_are_carried_through() -> Result<()> {
    let dir = tempdir()?;
    let old = table(dir.path(), 1, &[("a", Some("1"), 1), ("b", Some("2"), 1)])?;
    let new = table(dir.path(), 2, &[("a", None, 4)])?;
    let out = merged(&[&new, &old])?;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].0, "a");
    assert!(out[0].1.tombstone);
    assert_eq!(out[0].1.timestamp, 4);
    assert_eq!(out[1].0, "b");
    assert!(!out[1].1.tombstone);
    Ok(())
}

#[test]
fn older_tombstone_loses_to_newer_put() -> Result<()> {
    let dir = tempdir()?;
    let old = table(dir.path(), 1, &[("a", None, 2)])?;
    let new = table(dir.path(), 2, &[("a", Some("back"), 3)])?;
    let out = merged(&[&old, &new])?;
    assert_eq!(out.len(), 1);
    assert!(!out[0].1.tombstone);
    assert_eq!(out[0].1.value, b"back");
    Ok(())
}

// -------------------- N-way --------------------

#[test]
fn three_way_merge_dedups_and_sorts() -> Result<()> {
    let dir = tempdir()?;
    let t1 = table(dir.path(), 1, &[("a", Some("a1"), 1), ("b", Some("b1"), 1), ("d", Some("d1"), 1)])?;
    let t2 = table(dir.path(), 2, &[("b", Some("b2"), 2), ("c", Some("c2"), 2)])?;
    let t3 = table(dir.path(), 3, &[("a", Some("a3"), 3), ("d", None, 3), ("e", Some("e3"), 3)])?;

    let out = merged(&[&t1, &t2, &t3])?;
    let view: Vec<(&str, Option<&[u8]>)> = out
        .iter()
        .map(|(k, r)| (k.as_str(), (!r.tombstone).then_some(r.value.as_slice())))
        .collect();
    assert_eq!(
        view,
        vec![
            ("a", Some(&b"a3"[..])),
            ("b", Some(&b"b2"[..])),
            ("c", Some(&b"c2"[..])),
            ("d", None),
            ("e", Some(&b"e3"[..])),
        ]
    );
    Ok(())
}

#[test]
fn merge_output_feeds_a_new_table() -> Result<()> {
    let dir = tempdir()?;
    let t1 = SSTable::flush(dir.path(), 1, 1, &opts(TableLayout::MultiFile, 3), 30, numbered(30))?;
    let newer: Vec<(String, Record)> = numbered(30)
        .into_iter()
        .step_by(2)
        .map(|(k, _)| (k, Record::live(b"updated".to_vec(), 100)))
        .collect();
    let t2 = SSTable::flush(dir.path(), 1, 2, &opts(TableLayout::MultiFile, 3), newer.len(), newer)?;

    let out = merged(&[&t2, &t1])?;
    assert_eq!(out.len(), 30);
    let merged_table = SSTable::flush(dir.path(), 2, 1, &opts(TableLayout::MultiFile, 3), 30, out)?;

    assert_eq!(merged_table.find("k000")?.map(|r| r.value), Some(b"updated".to_vec()));
    assert_eq!(merged_table.find("k001")?.map(|r| r.value), Some(b"v1".to_vec()));
    assert!(merged_table.verify_integrity()?);
    Ok(())
}
