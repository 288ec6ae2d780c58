use config::{CompactionPolicy, Config, MemtableKind};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::Engine;
use std::path::Path;
use tempfile::tempdir;

const N: usize = 1_000;
const VAL_SIZE: usize = 100;

fn bench_config(dir: &Path, kind: MemtableKind) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        wal_sync: false,
        memtable_size: 100,
        memtable_kind: kind,
        token_capacity: u64::MAX / 2,
        token_rate: u64::MAX / 2,
        ..Config::default()
    }
}

fn engine_put_benchmark(c: &mut Criterion) {
    for (name, kind) in [("btree", MemtableKind::BTree), ("skiplist", MemtableKind::SkipList)] {
        c.bench_function(&format!("engine_put_{name}_1k"), |b| {
            b.iter_batched(
                || {
                    let dir = tempdir().unwrap();
                    let engine = Engine::open(bench_config(dir.path(), kind)).unwrap();
                    (dir, engine)
                },
                |(_dir, mut engine)| {
                    for i in 0..N {
                        engine.put(&format!("k{i:05}"), vec![b'x'; VAL_SIZE]).unwrap();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
}

fn engine_get_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(bench_config(dir.path(), MemtableKind::BTree)).unwrap();
    for i in 0..N {
        engine.put(&format!("k{i:05}"), vec![b'x'; VAL_SIZE]).unwrap();
    }

    c.bench_function("engine_get_after_flushes_1k", |b| {
        b.iter(|| {
            for i in 0..N {
                assert!(engine.get(&format!("k{i:05}")).unwrap().is_some());
            }
        });
    });
}

fn engine_compact_benchmark(c: &mut Criterion) {
    for (name, policy) in [
        ("size_tiered", CompactionPolicy::SizeTiered),
        ("leveled", CompactionPolicy::Leveled),
    ] {
        c.bench_function(&format!("engine_compact_{name}_1k"), |b| {
            b.iter_batched(
                || {
                    let dir = tempdir().unwrap();
                    let mut engine = Engine::open(Config {
                        compaction: policy,
                        ..bench_config(dir.path(), MemtableKind::BTree)
                    })
                    .unwrap();
                    for i in 0..N {
                        engine.put(&format!("k{i:05}"), vec![b'x'; VAL_SIZE]).unwrap();
                    }
                    (dir, engine)
                },
                |(_dir, mut engine)| {
                    engine.compact().unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(
    benches,
    engine_put_benchmark,
    engine_get_benchmark,
    engine_compact_benchmark
);
criterion_main!(benches);
