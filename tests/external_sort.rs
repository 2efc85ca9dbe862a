//! External-memory sort: spill correctness, temp file hygiene, memory
//! exhaustion, and barrier propagation during the drain phase.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vectra::block::View;
use vectra::prelude::*;

fn unlimited() -> Arc<dyn BufferAllocator> {
    Arc::new(TrackingAllocator::unlimited())
}

fn int_schema() -> TupleSchema {
    TupleSchema::new(vec![Attribute::not_nullable("n", DataType::Int32)]).unwrap()
}

fn int_scan(values: &[i32]) -> Box<dyn Operation> {
    let mut block = Block::allocate(int_schema(), values.len().max(1), unlimited()).unwrap();
    for &v in values {
        block.append_datum_row(&[Datum::Int32(v)]).unwrap();
    }
    Box::new(ScanBlockOperation::new(Arc::new(block)))
}

fn drain_ints(cursor: &mut dyn Cursor) -> Vec<i32> {
    let mut out = Vec::new();
    loop {
        match cursor.next(128).unwrap() {
            Batch::Rows(v) => {
                for row in v.to_datum_rows() {
                    match row[0] {
                        Datum::Int32(x) => out.push(x),
                        _ => unreachable!(),
                    }
                }
            }
            Batch::Eos => return out,
            Batch::WaitingOnBarrier => unreachable!(),
        }
    }
}

#[test]
fn thousand_random_rows_with_ten_row_quota() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let values: Vec<i32> = (0..1000).map(|_| rng.gen()).collect();

    // Quota of roughly ten 4-byte rows; virtually everything spills.
    let operation = sort_with_temp_dir_prefix(
        SortOrder::new().add("n", ColumnOrder::Ascending),
        None,
        40,
        dir.path(),
        unlimited(),
        int_scan(&values),
    );
    let mut cursor = operation.create_cursor().unwrap();
    let output = drain_ints(cursor.as_mut());

    let mut expected = values;
    expected.sort_unstable();
    assert_eq!(output, expected);

    // Spill files are gone once the cursor is dropped.
    drop(cursor);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn spilled_and_in_memory_results_agree() {
    let mut rng = StdRng::seed_from_u64(42);
    let values: Vec<i32> = (0..500).map(|_| rng.gen_range(-100..100)).collect();
    let order = || SortOrder::new().add("n", ColumnOrder::Descending);

    let dir = tempfile::tempdir().unwrap();
    let spilled = {
        let operation = sort_with_temp_dir_prefix(
            order(),
            None,
            64,
            dir.path(),
            unlimited(),
            int_scan(&values),
        );
        let mut cursor = operation.create_cursor().unwrap();
        drain_ints(cursor.as_mut())
    };
    let in_memory = {
        let operation = sort(order(), None, 1 << 24, unlimited(), int_scan(&values));
        let mut cursor = operation.create_cursor().unwrap();
        drain_ints(cursor.as_mut())
    };
    assert_eq!(spilled, in_memory);
}

#[test]
fn string_payloads_survive_the_spill() {
    let schema = TupleSchema::new(vec![
        Attribute::not_nullable("k", DataType::Int32),
        Attribute::nullable("s", DataType::String),
    ])
    .unwrap();
    let rows = 200;
    let mut block = Block::allocate(schema, rows, unlimited()).unwrap();
    for i in 0..rows as i32 {
        let payload = if i % 7 == 0 {
            Datum::Null
        } else {
            Datum::String(format!("payload-{:04}", i).into_bytes())
        };
        block
            .append_datum_row(&[Datum::Int32(rows as i32 - i), payload])
            .unwrap();
    }
    let scan: Box<dyn Operation> = Box::new(ScanBlockOperation::new(Arc::new(block)));

    let dir = tempfile::tempdir().unwrap();
    let operation = sort_with_temp_dir_prefix(
        SortOrder::new().add("k", ColumnOrder::Ascending),
        None,
        2048,
        dir.path(),
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    let mut previous = i32::MIN;
    let mut seen = 0;
    loop {
        match cursor.next(64).unwrap() {
            Batch::Rows(v) => {
                for row in v.to_datum_rows() {
                    let Datum::Int32(k) = row[0] else { unreachable!() };
                    assert!(k >= previous);
                    previous = k;
                    let i = rows as i32 - k;
                    if i % 7 == 0 {
                        assert_eq!(row[1], Datum::Null);
                    } else {
                        assert_eq!(
                            row[1],
                            Datum::String(format!("payload-{:04}", i).into_bytes())
                        );
                    }
                    seen += 1;
                }
            }
            Batch::Eos => break,
            Batch::WaitingOnBarrier => unreachable!(),
        }
    }
    assert_eq!(seen, rows);
}

#[test]
fn hard_quota_exhaustion_surfaces_memory_exceeded() {
    // The engine allocator's hard quota is too small for even one
    // table block, so the sort cannot materialize anything.
    let tiny: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::with_limits(16, 16));
    let dir = tempfile::tempdir().unwrap();
    let operation = sort_with_temp_dir_prefix(
        SortOrder::new().add("n", ColumnOrder::Ascending),
        None,
        1 << 20,
        dir.path(),
        tiny,
        int_scan(&[3, 1, 2]),
    );
    let err = match operation.create_cursor() {
        Ok(_) => panic!("expected create_cursor to fail"),
        Err(e) => e,
    };
    assert_eq!(error_code(&err), Some(ErrorCode::MemoryExceeded));
}

/// Scripted source: a batch, then a barrier, then a batch, then EOS.
struct BarrierScript {
    block: Arc<Block>,
    step: usize,
    interruption: Interruption,
}

impl Cursor for BarrierScript {
    fn schema(&self) -> &TupleSchema {
        self.block.schema()
    }

    fn next(&mut self, max_rows: usize) -> eyre::Result<Batch<'_>> {
        self.step += 1;
        match self.step {
            1 => {
                let len = self.block.row_count().min(max_rows).min(2);
                Ok(Batch::Rows(self.block.view().window(0, len)))
            }
            2 => Ok(Batch::WaitingOnBarrier),
            3 => {
                let remaining = self.block.row_count() - 2;
                let len = remaining.min(max_rows);
                Ok(Batch::Rows(self.block.view().window(2, len)))
            }
            _ => Ok(Batch::Eos),
        }
    }

    fn is_waiting_on_barrier_supported(&self) -> bool {
        true
    }

    fn interruption(&self) -> Interruption {
        self.interruption.clone()
    }
}

#[test]
fn barrier_during_drain_is_retriable_without_data_loss() {
    let mut block = Block::allocate(int_schema(), 4, unlimited()).unwrap();
    for v in [4, 2, 3, 1] {
        block.append_datum_row(&[Datum::Int32(v)]).unwrap();
    }
    let child = Box::new(BarrierScript {
        block: Arc::new(block),
        step: 0,
        interruption: Interruption::new(),
    });

    let dir = tempfile::tempdir().unwrap();
    let mut cursor = vectra::sort::bound_sort(
        SortOrder::new()
            .add("n", ColumnOrder::Ascending)
            .bind(&int_schema())
            .unwrap(),
        None,
        1 << 20,
        dir.path(),
        unlimited(),
        child,
    )
    .unwrap();

    assert!(cursor.is_waiting_on_barrier_supported());
    // First pull hits the barrier mid-drain.
    assert!(matches!(
        cursor.next(16).unwrap(),
        Batch::WaitingOnBarrier
    ));
    // Retry completes the drain; no rows were lost across the barrier.
    let output = drain_ints(cursor.as_mut());
    assert_eq!(output, vec![1, 2, 3, 4]);
}

#[test]
fn interrupt_releases_spill_files() {
    let dir = tempfile::tempdir().unwrap();
    let values: Vec<i32> = (0..400).rev().collect();
    let operation = sort_with_temp_dir_prefix(
        SortOrder::new().add("n", ColumnOrder::Ascending),
        None,
        64,
        dir.path(),
        unlimited(),
        int_scan(&values),
    );
    let mut cursor = operation.create_cursor().unwrap();
    // Pull once so runs exist on disk, then interrupt.
    match cursor.next(8).unwrap() {
        Batch::Rows(v) => assert!(v.row_count() <= 8),
        other => panic!("expected rows, got {:?}", other),
    }
    cursor.interruption().interrupt();
    let err = cursor.next(8).unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::Interrupted));
    drop(cursor);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn view_windows_round_trip_through_sort() {
    // Feed the sorter through explicit view windows to confirm partial
    // writes resume correctly.
    let values: Vec<i32> = (0..50).map(|i| 49 - i).collect();
    let mut block = Block::allocate(int_schema(), values.len(), unlimited()).unwrap();
    for &v in &values {
        block.append_datum_row(&[Datum::Int32(v)]).unwrap();
    }
    let order = SortOrder::new()
        .add("n", ColumnOrder::Ascending)
        .bind(&int_schema())
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut sorter = vectra::sort::BufferingSorter::new(
        int_schema(),
        order,
        128,
        dir.path(),
        unlimited(),
    )
    .unwrap();

    let view: View<'_> = block.view();
    let mut offset = 0;
    while offset < view.row_count() {
        let written = sorter
            .write(&view.window(offset, view.row_count() - offset))
            .unwrap();
        assert!(written > 0);
        offset += written;
    }
    let mut result = sorter.into_result_cursor().unwrap();
    assert_eq!(drain_ints(result.as_mut()), (0..50).collect::<Vec<_>>());
}
