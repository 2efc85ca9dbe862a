//! End-to-end sort scenarios through the public operation API.

use std::sync::Arc;

use vectra::prelude::*;

fn unlimited() -> Arc<dyn BufferAllocator> {
    Arc::new(TrackingAllocator::unlimited())
}

fn two_int_scan(rows: &[(i32, i32)]) -> Box<dyn Operation> {
    let schema = TupleSchema::new(vec![
        Attribute::not_nullable("a", DataType::Int32),
        Attribute::not_nullable("b", DataType::Int32),
    ])
    .unwrap();
    let mut block = Block::allocate(schema, rows.len().max(1), unlimited()).unwrap();
    for &(a, b) in rows {
        block
            .append_datum_row(&[Datum::Int32(a), Datum::Int32(b)])
            .unwrap();
    }
    Box::new(ScanBlockOperation::new(Arc::new(block)))
}

fn nullable_scan(values: &[Option<i32>]) -> Box<dyn Operation> {
    let schema = TupleSchema::new(vec![Attribute::nullable("a", DataType::Int32)]).unwrap();
    let mut block = Block::allocate(schema, values.len().max(1), unlimited()).unwrap();
    for v in values {
        block
            .append_datum_row(&[v.map(Datum::Int32).unwrap_or(Datum::Null)])
            .unwrap();
    }
    Box::new(ScanBlockOperation::new(Arc::new(block)))
}

fn drain_pairs(cursor: &mut dyn Cursor, max_rows: usize) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    loop {
        match cursor.next(max_rows).unwrap() {
            Batch::Rows(v) => {
                assert!(v.row_count() <= max_rows, "batch larger than requested");
                for row in v.to_datum_rows() {
                    match (row[0].clone(), row[1].clone()) {
                        (Datum::Int32(a), Datum::Int32(b)) => out.push((a, b)),
                        other => panic!("unexpected row {:?}", other),
                    }
                }
            }
            Batch::Eos => return out,
            Batch::WaitingOnBarrier => unreachable!("no barriers in these scans"),
        }
    }
}

fn drain_nullable(cursor: &mut dyn Cursor) -> Vec<Option<i32>> {
    let mut out = Vec::new();
    loop {
        match cursor.next(64).unwrap() {
            Batch::Rows(v) => {
                for row in v.to_datum_rows() {
                    out.push(match row[0] {
                        Datum::Int32(x) => Some(x),
                        Datum::Null => None,
                        _ => unreachable!(),
                    });
                }
            }
            Batch::Eos => return out,
            Batch::WaitingOnBarrier => unreachable!(),
        }
    }
}

#[test]
fn two_key_ascending_ascending() {
    let scan = two_int_scan(&[(5, 3), (4, 2), (1, 2), (4, 5), (3, 1), (3, 3), (4, 1)]);
    let operation = sort(
        SortOrder::new()
            .add("a", ColumnOrder::Ascending)
            .add("b", ColumnOrder::Ascending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    assert_eq!(
        drain_pairs(cursor.as_mut(), 3),
        vec![(1, 2), (3, 1), (3, 3), (4, 1), (4, 2), (4, 5), (5, 3)]
    );
}

#[test]
fn unique_first_key() {
    let scan = two_int_scan(&[(5, 3), (4, 2), (1, 2), (3, 3)]);
    let operation = sort(
        SortOrder::new()
            .add("a", ColumnOrder::Ascending)
            .add("b", ColumnOrder::Ascending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    assert_eq!(
        drain_pairs(cursor.as_mut(), 100),
        vec![(1, 2), (3, 3), (4, 2), (5, 3)]
    );
}

#[test]
fn nulls_precede_values_ascending() {
    let scan = nullable_scan(&[Some(5), None, Some(3), None, Some(1)]);
    let operation = sort(
        SortOrder::new().add("a", ColumnOrder::Ascending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    assert_eq!(
        drain_nullable(cursor.as_mut()),
        vec![None, None, Some(1), Some(3), Some(5)]
    );
}

#[test]
fn nulls_follow_values_descending() {
    let scan = nullable_scan(&[Some(5), None, Some(3), None, Some(1)]);
    let operation = sort(
        SortOrder::new().add("a", ColumnOrder::Descending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    assert_eq!(
        drain_nullable(cursor.as_mut()),
        vec![Some(5), Some(3), Some(1), None, None]
    );
}

#[test]
fn case_insensitive_string_sort_is_stable() {
    let schema = TupleSchema::new(vec![Attribute::not_nullable("s", DataType::String)]).unwrap();
    let mut block = Block::allocate(schema, 4, unlimited()).unwrap();
    for s in ["banana", "Apple", "cherry", "apple"] {
        block
            .append_datum_row(&[Datum::String(s.as_bytes().to_vec())])
            .unwrap();
    }
    let scan: Box<dyn Operation> = Box::new(ScanBlockOperation::new(Arc::new(block)));
    let operation = extended_sort(
        ExtendedSortSpecification::new().add_key("s", ColumnOrder::Ascending, false),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    let mut out = Vec::new();
    loop {
        match cursor.next(16).unwrap() {
            Batch::Rows(v) => {
                for row in v.to_datum_rows() {
                    match &row[0] {
                        Datum::String(b) => out.push(String::from_utf8(b.clone()).unwrap()),
                        _ => unreachable!(),
                    }
                }
            }
            Batch::Eos => break,
            Batch::WaitingOnBarrier => unreachable!(),
        }
    }
    // "Apple" and "apple" are equal under the key; input order decides.
    assert_eq!(out, vec!["Apple", "apple", "banana", "cherry"]);
}

#[test]
fn output_is_a_permutation_of_the_input() {
    let input: Vec<(i32, i32)> = (0..97).map(|i| ((i * 31) % 13, (i * 7) % 5)).collect();
    let scan = two_int_scan(&input);
    let operation = sort(
        SortOrder::new()
            .add("a", ColumnOrder::Ascending)
            .add("b", ColumnOrder::Descending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    let output = drain_pairs(cursor.as_mut(), 10);

    let mut expected = input.clone();
    expected.sort_by(|x, y| x.0.cmp(&y.0).then(y.1.cmp(&x.1)));
    assert_eq!(output, expected);

    let mut sorted_in = input;
    let mut sorted_out = output;
    sorted_in.sort_unstable();
    sorted_out.sort_unstable();
    assert_eq!(sorted_in, sorted_out, "sort lost or invented rows");
}

#[test]
fn equal_rows_keep_input_order() {
    // Key column has two values; payload records input position.
    let input: Vec<(i32, i32)> = (0..40).map(|i| (i % 2, i)).collect();
    let scan = two_int_scan(&input);
    let operation = sort(
        SortOrder::new().add("a", ColumnOrder::Ascending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    let output = drain_pairs(cursor.as_mut(), 7);
    let evens: Vec<i32> = output[..20].iter().map(|&(_, b)| b).collect();
    let odds: Vec<i32> = output[20..].iter().map(|&(_, b)| b).collect();
    assert_eq!(evens, (0..40).filter(|i| i % 2 == 0).collect::<Vec<_>>());
    assert_eq!(odds, (0..40).filter(|i| i % 2 == 1).collect::<Vec<_>>());
}

#[test]
fn eos_is_idempotent() {
    let scan = two_int_scan(&[(1, 1)]);
    let operation = sort(
        SortOrder::new().add("a", ColumnOrder::Ascending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    drain_pairs(cursor.as_mut(), 10);
    for _ in 0..3 {
        assert!(matches!(cursor.next(10).unwrap(), Batch::Eos));
    }
}

#[test]
fn empty_input_sorts_to_empty_output() {
    let scan = two_int_scan(&[]);
    let operation = sort(
        SortOrder::new().add("a", ColumnOrder::Ascending),
        None,
        1 << 20,
        unlimited(),
        scan,
    );
    let mut cursor = operation.create_cursor().unwrap();
    assert_eq!(drain_pairs(cursor.as_mut(), 10), Vec::<(i32, i32)>::new());
}
