use crate::{FlushTarget, Memtable};
use anyhow::Result;
use config::MemtableKind;
use record::{Record, ScanContext};

/// Collects every flushed batch.
#[derive(Default)]
struct Sink {
    batches: Vec<Vec<(String, Record)>>,
    fail: bool,
}

impl FlushTarget for Sink {
    fn flush_sorted(&mut self, records: Vec<(String, Record)>) -> Result<()> {
        if self.fail {
            anyhow::bail!("disk full");
        }
        self.batches.push(records);
        Ok(())
    }
}

fn both(capacity: usize) -> Vec<Memtable> {
    vec![
        Memtable::new(MemtableKind::BTree, capacity, 3, 10),
        Memtable::new(MemtableKind::SkipList, capacity, 3, 10),
    ]
}

fn live(v: &str, ts: u64) -> Record {
    Record::live(v.as_bytes().to_vec(), ts)
}

// -------------------- Point operations --------------------

#[test]
fn put_find_remove() -> Result<()> {
    for mut m in both(100) {
        let mut sink = Sink::default();
        m.put("k1", live("v1", 1), &mut sink)?;
        m.put("k1", live("v2", 2), &mut sink)?;
        assert_eq!(m.len(), 1);
        assert_eq!(m.find("k1").unwrap().value, b"v2");

        m.remove("k1", 3, &mut sink)?;
        let r = m.find("k1").unwrap();
        assert!(r.tombstone);
        assert!(r.value.is_empty());
        assert_eq!(r.timestamp, 3);
        assert_eq!(m.len(), 1);
    }
    Ok(())
}

#[test]
fn remove_absent_inserts_tombstone() -> Result<()> {
    for mut m in both(100) {
        let mut sink = Sink::default();
        m.remove("ghost", 7, &mut sink)?;
        assert_eq!(m.len(), 1);
        assert!(m.find("ghost").unwrap().tombstone);
    }
    Ok(())
}

// -------------------- Flush --------------------

#[test]
fn reaching_capacity_flushes_once_in_order() -> Result<()> {
    for mut m in both(5) {
        let mut sink = Sink::default();
        let mut flushed = 0;
        for (i, k) in ["e", "b", "d", "a", "c"].iter().enumerate() {
            if m.put(k, live(k, i as u64), &mut sink)? {
                flushed += 1;
            }
        }
        assert_eq!(flushed, 1);
        assert!(m.is_empty());
        assert_eq!(sink.batches.len(), 1);
        let keys: Vec<&str> = sink.batches[0].iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }
    Ok(())
}

#[test]
fn overwrites_do_not_count_toward_capacity() -> Result<()> {
    let mut m = Memtable::new(MemtableKind::BTree, 3, 3, 10);
    let mut sink = Sink::default();
    for ts in 0..10 {
        m.put("same", live("v", ts), &mut sink)?;
    }
    assert!(sink.batches.is_empty());
    assert_eq!(m.len(), 1);
    Ok(())
}

#[test]
fn tombstones_are_flushed() -> Result<()> {
    let mut m = Memtable::new(MemtableKind::SkipList, 2, 3, 10);
    let mut sink = Sink::default();
    m.put("a", live("1", 1), &mut sink)?;
    m.remove("b", 2, &mut sink)?;
    assert_eq!(sink.batches.len(), 1);
    assert!(sink.batches[0][1].1.tombstone);
    Ok(())
}

#[test]
fn failed_flush_keeps_contents() -> Result<()> {
    let mut m = Memtable::new(MemtableKind::BTree, 2, 3, 10);
    let mut sink = Sink {
        fail: true,
        ..Sink::default()
    };
    m.put("a", live("1", 1), &mut sink)?;
    assert!(m.put("b", live("2", 2), &mut sink).is_err());
    assert_eq!(m.len(), 2);
    Ok(())
}

#[test]
fn empty_flush_is_noop() -> Result<()> {
    let mut m = Memtable::new(MemtableKind::BTree, 2, 3, 10);
    let mut sink = Sink::default();
    m.flush(&mut sink)?;
    assert!(sink.batches.is_empty());
    Ok(())
}

// -------------------- Scans --------------------

fn seeded(m: &mut Memtable) -> Result<()> {
    let mut sink = Sink::default();
    for (i, k) in ["a", "b", "m", "z"].iter().enumerate() {
        m.put(k, live(&(i + 1).to_string(), i as u64 + 1), &mut sink)?;
    }
    Ok(())
}

#[test]
fn range_scan_pages() -> Result<()> {
    for mut m in both(100) {
        seeded(&mut m)?;

        let mut first = ScanContext::new(2, 1);
        m.range_scan("a", "z", &mut first);
        assert_eq!(first.into_page().unwrap().0, vec!["a", "b"]);

        let mut second = ScanContext::new(2, 2);
        m.range_scan("a", "z", &mut second);
        let (keys, records) = second.into_page().unwrap();
        assert_eq!(keys, vec!["m", "z"]);
        assert_eq!(records[1].value, b"4");

        let mut third = ScanContext::new(2, 3);
        m.range_scan("a", "z", &mut third);
        assert!(third.into_page().is_none());
    }
    Ok(())
}

#[test]
fn range_scan_respects_bounds_and_tombstones() -> Result<()> {
    for mut m in both(100) {
        seeded(&mut m)?;
        let mut sink = Sink::default();
        m.remove("m", 10, &mut sink)?;

        let mut scan = ScanContext::new(10, 1);
        m.range_scan("b", "y", &mut scan);
        assert!(scan.is_decided("m"));
        assert_eq!(scan.into_page().unwrap().0, vec!["b"]);

        let mut inverted = ScanContext::new(10, 1);
        m.range_scan("z", "a", &mut inverted);
        assert_eq!(inverted.found(), 0);
    }
    Ok(())
}

#[test]
fn list_scan_matches_prefix_only() -> Result<()> {
    for mut m in both(100) {
        let mut sink = Sink::default();
        for (i, k) in ["user:1", "user:2", "users", "video:1", "use"].iter().enumerate() {
            m.put(k, live("x", i as u64), &mut sink)?;
        }
        let mut scan = ScanContext::new(10, 1);
        m.list_scan("user:", &mut scan);
        assert_eq!(scan.into_page().unwrap().0, vec!["user:1", "user:2"]);
    }
    Ok(())
}

#[test]
fn scan_stops_at_page_end() -> Result<()> {
    for mut m in both(100) {
        let mut sink = Sink::default();
        for i in 0..50 {
            m.put(&format!("k{i:02}"), live("v", i), &mut sink)?;
        }
        let mut scan = ScanContext::new(5, 2);
        m.list_scan("k", &mut scan);
        assert_eq!(scan.found(), 10);
        assert_eq!(scan.into_page().unwrap().0.first().map(String::as_str), Some("k05"));
    }
    Ok(())
}
