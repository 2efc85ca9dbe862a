use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vectra::prelude::*;

fn unlimited() -> Arc<dyn BufferAllocator> {
    Arc::new(TrackingAllocator::unlimited())
}

fn random_scan(rows: usize, seed: u64) -> Box<dyn Operation> {
    let schema = TupleSchema::new(vec![
        Attribute::not_nullable("a", DataType::Int64),
        Attribute::not_nullable("b", DataType::Int32),
    ])
    .unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut block = Block::allocate(schema, rows, unlimited()).unwrap();
    for _ in 0..rows {
        block
            .append_datum_row(&[
                Datum::Int64(rng.gen_range(0..1000)),
                Datum::Int32(rng.gen()),
            ])
            .unwrap();
    }
    Box::new(ScanBlockOperation::new(Arc::new(block)))
}

fn drain(cursor: &mut dyn Cursor) -> usize {
    let mut rows = 0;
    loop {
        match cursor.next(1024).unwrap() {
            Batch::Rows(v) => rows += v.row_count(),
            Batch::Eos => return rows,
            Batch::WaitingOnBarrier => unreachable!(),
        }
    }
}

fn bench_in_memory_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_in_memory");
    for &rows in &[1_000usize, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.iter(|| {
                let operation = sort(
                    SortOrder::new()
                        .add("a", ColumnOrder::Ascending)
                        .add("b", ColumnOrder::Descending),
                    None,
                    1 << 30,
                    unlimited(),
                    random_scan(rows, 7),
                );
                let mut cursor = operation.create_cursor().unwrap();
                black_box(drain(cursor.as_mut()))
            });
        });
    }
    group.finish();
}

fn bench_spilling_sort(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("sort_spilling");
    group.sample_size(10);
    for &rows in &[10_000usize, 50_000] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.iter(|| {
                let operation = sort_with_temp_dir_prefix(
                    SortOrder::new().add("a", ColumnOrder::Ascending),
                    None,
                    16 * 1024,
                    dir.path(),
                    unlimited(),
                    random_scan(rows, 11),
                );
                let mut cursor = operation.create_cursor().unwrap();
                black_box(drain(cursor.as_mut()))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_in_memory_sort, bench_spilling_sort);
criterion_main!(benches);
