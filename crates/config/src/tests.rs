use super::*;
use std::collections::HashMap;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let c = Config::default();
    c.validate().unwrap();
    assert_eq!(c.memtable_size, 20);
    assert_eq!(c.table_interval, 10);
    assert_eq!(c.lsm_max_level, 4);
    assert_eq!(c.memtable_kind, MemtableKind::BTree);
    assert_eq!(c.table_layout, TableLayout::SingleFile);
    assert_eq!(c.compaction, CompactionPolicy::SizeTiered);
}

#[test]
fn empty_environment_gives_defaults() {
    assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
}

#[test]
fn environment_overrides_defaults() {
    let c = Config::from_lookup(lookup(&[
        ("STRATA_DATA_DIR", "/tmp/strata"),
        ("STRATA_MEMTABLE_SIZE", "64"),
        ("STRATA_MEMTABLE", "skiplist"),
        ("STRATA_TABLE_LAYOUT", "multi"),
        ("STRATA_COMPACTION", "leveled"),
        ("STRATA_LEVELED_MULTIPLIER", "4"),
        ("STRATA_CACHE_CAPACITY", "3"),
        ("STRATA_WAL_SYNC", "false"),
    ]));
    assert_eq!(c.data_dir, PathBuf::from("/tmp/strata"));
    assert_eq!(c.memtable_size, 64);
    assert_eq!(c.memtable_kind, MemtableKind::SkipList);
    assert_eq!(c.table_layout, TableLayout::MultiFile);
    assert_eq!(c.compaction, CompactionPolicy::Leveled);
    assert_eq!(c.leveled_multiplier, 4);
    assert_eq!(c.cache_capacity, 3);
    assert!(!c.wal_sync);
}

#[test]
fn unparsable_values_fall_back() {
    let c = Config::from_lookup(lookup(&[
        ("STRATA_MEMTABLE_SIZE", "lots"),
        ("STRATA_MEMTABLE", "hash_map"),
        ("STRATA_COMPACTION", "universal"),
    ]));
    assert_eq!(c.memtable_size, 20);
    assert_eq!(c.memtable_kind, MemtableKind::BTree);
    assert_eq!(c.compaction, CompactionPolicy::SizeTiered);
}

#[test]
fn normalization_clamps_out_of_range() {
    let c = Config::from_lookup(lookup(&[
        ("STRATA_WAL_BUFFER_CAPACITY", "1"),
        ("STRATA_WAL_WATER_MARK", "500000"),
        ("STRATA_BLOOM_FPR", "2.0"),
        ("STRATA_BTREE_FANOUT", "2"),
        ("STRATA_SKIPLIST_MAX_HEIGHT", "500"),
        ("STRATA_LSM_MAX_LEVEL", "2"),
        ("STRATA_LEVELED_MULTIPLIER", "1"),
    ]));
    assert_eq!(c.wal_buffer_capacity, 10);
    assert_eq!(c.wal_water_mark, 99_999);
    assert_eq!(c.bloom_false_positive_rate, 0.01);
    assert_eq!(c.btree_fanout, 3);
    assert_eq!(c.skiplist_max_height, 99);
    assert_eq!(c.lsm_max_level, 4);
    assert_eq!(c.leveled_multiplier, 10);

    let low_mark = Config::from_lookup(lookup(&[("STRATA_WAL_WATER_MARK", "3")]));
    assert_eq!(low_mark.wal_water_mark, 20);
}

#[test]
fn validate_rejects_broken_values() {
    let mut c = Config::default();
    c.btree_fanout = 2;
    assert!(c.validate().is_err());

    let mut c = Config::default();
    c.memtable_size = 0;
    assert!(c.validate().is_err());

    let mut c = Config::default();
    c.bloom_false_positive_rate = 1.5;
    assert!(c.validate().is_err());

    let mut c = Config::default();
    c.token_rate = 0;
    assert!(c.validate().is_ok());
}

#[test]
fn derived_paths_live_under_data_dir() {
    let mut c = Config::default();
    c.data_dir = PathBuf::from("/srv/kv");
    assert_eq!(c.wal_dir(), PathBuf::from("/srv/kv/wal"));
    assert_eq!(c.sstable_dir(), PathBuf::from("/srv/kv/sstable"));
    assert_eq!(c.cache_path(), PathBuf::from("/srv/kv/cache/cache.bin"));
}
