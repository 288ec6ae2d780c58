use config::TableLayout;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use record::Record;
use sstable::{SSTable, TableOptions};
use std::path::Path;
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn rows() -> Vec<(String, Record)> {
    (0..N_KEYS)
        .map(|i| (format!("key{i:05}"), Record::live(vec![b'x'; VALUE_SIZE], i as u64 + 1)))
        .collect()
}

fn write_table(root: &Path, opts: &TableOptions) -> SSTable {
    SSTable::flush(root, 1, 1, opts, N_KEYS, rows()).unwrap()
}

fn sstable_write_benchmark(c: &mut Criterion) {
    for (name, layout) in [("multi", TableLayout::MultiFile), ("single", TableLayout::SingleFile)] {
        let opts = TableOptions::new(layout, 10, 0.01);
        c.bench_function(&format!("sstable_write_{name}_10k"), |b| {
            b.iter_batched(
                || (tempdir().unwrap(), rows()),
                |(dir, rows)| {
                    SSTable::flush(dir.path(), 1, 1, &opts, N_KEYS, rows).unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }
}

fn sstable_find_hit_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let opts = TableOptions::new(TableLayout::MultiFile, 10, 0.01);
    let table = write_table(dir.path(), &opts);

    c.bench_function("sstable_find_hit_10k", |b| {
        b.iter(|| {
            for i in (0..N_KEYS).step_by(10) {
                let found = table.find(&format!("key{i:05}")).unwrap();
                assert!(found.is_some());
            }
        });
    });
}

fn sstable_find_miss_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let opts = TableOptions::new(TableLayout::MultiFile, 10, 0.01);
    let table = write_table(dir.path(), &opts);

    // Mostly answered by the bloom filter.
    c.bench_function("sstable_find_miss_10k", |b| {
        b.iter(|| {
            for i in (0..N_KEYS).step_by(10) {
                let found = table.find(&format!("missing{i}")).unwrap();
                assert!(found.is_none());
            }
        });
    });
}

fn sstable_verify_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let opts = TableOptions::new(TableLayout::SingleFile, 10, 0.01);
    let table = write_table(dir.path(), &opts);

    c.bench_function("sstable_verify_10k", |b| {
        b.iter(|| assert!(table.verify_integrity().unwrap()));
    });
}

criterion_group!(
    benches,
    sstable_write_benchmark,
    sstable_find_hit_benchmark,
    sstable_find_miss_benchmark,
    sstable_verify_benchmark
);
criterion_main!(benches);
