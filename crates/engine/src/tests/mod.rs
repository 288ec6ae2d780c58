
use crate::Engine;
use anyhow::Result;
use config::{CompactionPolicy, Config, MemtableKind};
use std::path::Path;

/// A config rooted at `dir` with a generous admission gate and no fsync.
pub(crate) fn test_config(dir: &Path) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        wal_sync: false,
        memtable_size: 4,
        table_interval: 2,
        token_capacity: 1_000_000,
        token_rate: 1_000_000,
        cache_capacity: 3,
        ..Config::default()
    }
}

pub(crate) fn open(dir: &Path) -> Result<Engine> {
    Engine::open(test_config(dir))
}

pub(crate) fn open_with(dir: &Path, policy: CompactionPolicy, kind: MemtableKind) -> Result<Engine> {
    Engine::open(Config {
        compaction: policy,
        memtable_kind: kind,
        ..test_config(dir)
    })
}

/// Value of a live key as a string, `None` if absent or deleted.
pub(crate) fn get_str(engine: &Engine, key: &str) -> Result<Option<String>> {
    Ok(engine
        .get(key)?
        .map(|r| String::from_utf8_lossy(&r.value).into_owned()))
}

/// Keys of one scan page, empty for `None`.
pub(crate) fn page_keys(page: Option<crate::Page>) -> Vec<String> {
    page.map(|(keys, _)| keys).unwrap_or_default()
}
