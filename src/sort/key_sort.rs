//! # Column-Progressive Permutation Sort
//!
//! Sorts the input progressively by successive key columns. First the
//! whole permutation is sorted by the first key; then maximal runs of
//! equal first-key values become ranges, and each range is sorted by
//! the second key. Rinse and repeat until there are no more key
//! columns or no more ranges.
//!
//! NULLs compare equal to each other and smaller than any non-null
//! value, so each range is first partitioned to percolate NULL rows to
//! the top (ascending) or bottom (descending); the non-null remainder
//! is then sorted with no null checks in the comparator at all.
//!
//! Both the partition and the range sort are stable, and ranges only
//! ever shrink, so rows equal under every key keep their input order.
//!
//! The inner loops are monomorphized per (native type, direction,
//! nullability) through const generics; the only dispatch is one match
//! per key column.

use std::cmp::Ordering;

use crate::block::{BitmapSlice, ColumnSlice, ColumnView, Permutation, View};
use crate::memory::BytesRef;

use super::order::BoundSortOrder;

/// A row range `[from, to)` that still needs sorting by further keys.
#[derive(Debug, Clone, Copy)]
struct Range {
    from: usize,
    to: usize,
}

/// Value types that can serve as sort keys. `key_cmp` must be a total
/// order; floats use IEEE total ordering.
trait SortKeyValue: Copy {
    fn key_cmp(&self, other: &Self) -> Ordering;
}

macro_rules! ord_sort_key {
    ($($t:ty),*) => {
        $(impl SortKeyValue for $t {
            #[inline]
            fn key_cmp(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }
        })*
    };
}

ord_sort_key!(i32, u32, i64, u64, bool);

impl SortKeyValue for f32 {
    #[inline]
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl SortKeyValue for f64 {
    #[inline]
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl SortKeyValue for BytesRef {
    #[inline]
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

#[inline]
fn compare<T: SortKeyValue, const DESC: bool>(a: &T, b: &T) -> Ordering {
    if DESC {
        b.key_cmp(a)
    } else {
        a.key_cmp(b)
    }
}

/// Sorts the non-null subrange and, unless this is the last key,
/// records runs of equal values as ranges for the next key.
fn sort_non_null_range<T: SortKeyValue, const DESC: bool>(
    values: &[T],
    range: Range,
    target: &mut Vec<Range>,
    permutation: &mut Permutation,
    is_last_column: bool,
) {
    permutation.sort_range_by(range.from, range.to, |a, b| {
        compare::<T, DESC>(&values[a], &values[b])
    });
    if is_last_column {
        return;
    }
    let mut run_start = range.from;
    for position in range.from + 1..range.to {
        let earlier = &values[permutation.at(run_start)];
        let current = &values[permutation.at(position)];
        if compare::<T, DESC>(earlier, current) == Ordering::Less {
            if position - run_start > 1 {
                target.push(Range {
                    from: run_start,
                    to: position,
                });
            }
            run_start = position;
        }
    }
    if range.to - run_start > 1 {
        target.push(Range {
            from: run_start,
            to: range.to,
        });
    }
}

fn sort_range<T: SortKeyValue, const DESC: bool, const NULLABLE: bool>(
    values: &[T],
    nulls: Option<BitmapSlice<'_>>,
    range: Range,
    target: &mut Vec<Range>,
    permutation: &mut Permutation,
    is_last_column: bool,
) {
    if !NULLABLE {
        sort_non_null_range::<T, DESC>(values, range, target, permutation, is_last_column);
        return;
    }
    let nulls = nulls.expect("nullable sort key without a bitmap");
    // Percolate NULL rows to the top (ascending) or bottom (descending);
    // the partition is stable, so null rows keep their input order.
    let front = permutation.stable_partition(range.from, range.to, |row| nulls[row] != DESC);
    let split = range.from + front;
    let (null_range, value_range) = if DESC {
        (Range { from: split, to: range.to }, Range { from: range.from, to: split })
    } else {
        (Range { from: range.from, to: split }, Range { from: split, to: range.to })
    };
    if value_range.to - value_range.from > 1 {
        sort_non_null_range::<T, DESC>(values, value_range, target, permutation, is_last_column);
    }
    // An all-NULL run still needs further-key sorting.
    if null_range.to - null_range.from > 1 && !is_last_column {
        target.push(null_range);
    }
}

fn sort_column<T: SortKeyValue>(
    values: &[T],
    nulls: Option<BitmapSlice<'_>>,
    descending: bool,
    source: &[Range],
    target: &mut Vec<Range>,
    permutation: &mut Permutation,
    is_last_column: bool,
) {
    // One monomorphized instantiation per (direction, nullability).
    match (descending, nulls.is_some()) {
        (false, false) => {
            for &range in source {
                sort_range::<T, false, false>(values, nulls, range, target, permutation, is_last_column);
            }
        }
        (false, true) => {
            for &range in source {
                sort_range::<T, false, true>(values, nulls, range, target, permutation, is_last_column);
            }
        }
        (true, false) => {
            for &range in source {
                sort_range::<T, true, false>(values, nulls, range, target, permutation, is_last_column);
            }
        }
        (true, true) => {
            for &range in source {
                sort_range::<T, true, true>(values, nulls, range, target, permutation, is_last_column);
            }
        }
    }
}

fn sort_typed_column(
    column: &ColumnView<'_>,
    descending: bool,
    source: &[Range],
    target: &mut Vec<Range>,
    permutation: &mut Permutation,
    is_last_column: bool,
) {
    let nulls = column.nulls();
    match column.values() {
        ColumnSlice::Int32(v) | ColumnSlice::Date(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
        ColumnSlice::UInt32(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
        ColumnSlice::Int64(v) | ColumnSlice::Datetime(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
        ColumnSlice::UInt64(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
        ColumnSlice::Float(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
        ColumnSlice::Double(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
        ColumnSlice::Bool(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
        ColumnSlice::String(v) | ColumnSlice::Binary(v) => {
            sort_column(v, nulls, descending, source, target, permutation, is_last_column)
        }
    }
}

/// Reorders `permutation` so that applying it to `input` yields the
/// rows sorted by `sort_order`. The permutation must start as the
/// identity over `input.row_count()` rows; column data never moves.
pub fn sort_permutation(
    sort_order: &BoundSortOrder,
    input: &View<'_>,
    permutation: &mut Permutation,
) {
    debug_assert_eq!(input.row_count(), permutation.len());
    if permutation.len() <= 1 {
        return;
    }
    // Double-buffered range lists.
    let mut source = vec![Range {
        from: 0,
        to: input.row_count(),
    }];
    let mut target: Vec<Range> = Vec::new();
    let key_count = sort_order.key_count();
    for (index, key) in sort_order.keys().iter().enumerate() {
        let column = input.column(key.position());
        sort_typed_column(
            column,
            key.order().is_descending(),
            &source,
            &mut target,
            permutation,
            index == key_count - 1,
        );
        if target.is_empty() {
            break;
        }
        std::mem::swap(&mut source, &mut target);
        target.clear();
    }
    debug_assert!(permutation.validate());
}
