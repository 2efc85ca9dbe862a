//! Stable k-way merge of sorted inputs.
//!
//! Each input is assumed sorted by the given sort order; equal rows are
//! emitted in input-index order, which is what makes the external sort
//! stable across spilled runs. One batch per input is buffered in an
//! owned block; heads are compared through a min-heap keyed on owned
//! key tuples. Barrier signals from inputs are not supported.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;

use crate::block::{batch_block, Block};
use crate::config::DEFAULT_ROW_COUNT;
use crate::error::ErrorCode;
use crate::memory::BufferAllocator;
use crate::sort::{BoundSortOrder, ColumnOrder};
use crate::types::{Datum, TupleSchema};

use super::{Batch, Cursor, CursorCore, Interruption};

type MergeKey = SmallVec<[(Datum, ColumnOrder); 4]>;

struct HeapEntry {
    key: MergeKey,
    input: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        for ((a, order), (b, _)) in self.key.iter().zip(&other.key) {
            let mut cmp = a.total_cmp(b);
            if order.is_descending() {
                cmp = cmp.reverse();
            }
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        // Tie-break by input index for stability.
        self.input.cmp(&other.input)
    }
}

struct MergeInput {
    cursor: Box<dyn Cursor>,
    buffer: Block,
    position: usize,
    done: bool,
}

impl MergeInput {
    /// Pulls the next non-empty batch into the owned buffer. Returns
    /// false at end of stream.
    fn refill(&mut self) -> Result<bool> {
        loop {
            self.buffer.clear();
            match self.cursor.next(self.buffer.row_capacity())? {
                Batch::Rows(view) => {
                    if view.row_count() == 0 {
                        continue;
                    }
                    let copied = self.buffer.append_window(&view, 0, view.row_count());
                    if copied < view.row_count() {
                        crate::engine_bail!(
                            ErrorCode::MemoryExceeded,
                            "cannot buffer merge input batch of {} rows",
                            view.row_count()
                        );
                    }
                    self.position = 0;
                    return Ok(true);
                }
                Batch::Eos => {
                    self.done = true;
                    return Ok(false);
                }
                Batch::WaitingOnBarrier => {
                    crate::engine_bail!(
                        ErrorCode::NotImplemented,
                        "merge-union-all does not handle WAITING_ON_BARRIER"
                    );
                }
            }
        }
    }

    fn head_key(&self, sort_order: &BoundSortOrder) -> MergeKey {
        let view = self.buffer.view();
        sort_order
            .keys()
            .iter()
            .map(|key| (view.column(key.position()).datum(self.position), key.order()))
            .collect()
    }
}

pub struct MergeUnionAllCursor {
    schema: TupleSchema,
    sort_order: BoundSortOrder,
    inputs: Vec<MergeInput>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    output: Block,
    started: bool,
    core: CursorCore,
}

/// Builds a stable k-way merge over `inputs`, all sorted by
/// `sort_order` and sharing one schema.
pub fn merge_union_all(
    sort_order: BoundSortOrder,
    inputs: Vec<Box<dyn Cursor>>,
    allocator: &Arc<dyn BufferAllocator>,
) -> Result<MergeUnionAllCursor> {
    let Some(first) = inputs.first() else {
        crate::engine_bail!(
            ErrorCode::InvalidArgumentValue,
            "merge-union-all needs at least one input"
        );
    };
    let schema = first.schema().clone();
    for input in &inputs {
        if input.schema() != &schema {
            crate::engine_bail!(
                ErrorCode::TypeMismatch,
                "merge input schema ({}) differs from ({})",
                input.schema().human_readable(),
                schema.human_readable()
            );
        }
    }
    for key in sort_order.keys() {
        if key.position() >= schema.attribute_count() {
            crate::engine_bail!(
                ErrorCode::AttributeMissing,
                "sort key position {} out of range for merge schema ({})",
                key.position(),
                schema.human_readable()
            );
        }
    }

    let output = batch_block(&schema, DEFAULT_ROW_COUNT, allocator)?;
    let inputs = inputs
        .into_iter()
        .map(|cursor| {
            Ok(MergeInput {
                buffer: batch_block(&schema, DEFAULT_ROW_COUNT, allocator)?,
                cursor,
                position: 0,
                done: false,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MergeUnionAllCursor {
        schema,
        sort_order,
        heap: BinaryHeap::with_capacity(inputs.len()),
        inputs,
        output,
        started: false,
        core: CursorCore::new(),
    })
}

impl MergeUnionAllCursor {
    fn start(&mut self) -> Result<()> {
        for index in 0..self.inputs.len() {
            if self.inputs[index].refill()? {
                let key = self.inputs[index].head_key(&self.sort_order);
                self.heap.push(Reverse(HeapEntry { key, input: index }));
            }
        }
        self.started = true;
        Ok(())
    }

    fn fill_output(&mut self, max_rows: usize) -> Result<()> {
        self.output.clear();
        let target = max_rows.max(1).min(self.output.row_capacity());
        while self.output.row_count() < target {
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            let index = entry.input;
            {
                let input = &self.inputs[index];
                let view = input.buffer.view();
                if !self.output.try_append_row(&view, input.position) {
                    crate::engine_bail!(
                        ErrorCode::MemoryExceeded,
                        "cannot copy merged row into output batch"
                    );
                }
            }
            let input = &mut self.inputs[index];
            input.position += 1;
            let has_more = input.position < input.buffer.row_count() || input.refill()?;
            if has_more {
                let key = self.inputs[index].head_key(&self.sort_order);
                self.heap.push(Reverse(HeapEntry { key, input: index }));
            }
        }
        Ok(())
    }
}

impl Cursor for MergeUnionAllCursor {
    fn schema(&self) -> &TupleSchema {
        &self.schema
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        if !self.started {
            let started = self.start();
            self.core.guard(started)?;
        }
        let filled = self.fill_output(max_rows);
        self.core.guard(filled)?;
        if self.output.row_count() == 0 {
            self.core.set_eos();
            return Ok(Batch::Eos);
        }
        Ok(Batch::Rows(self.output.view()))
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }

    fn apply_to_children(&mut self, visit: &mut dyn FnMut(&mut dyn Cursor)) {
        for input in &mut self.inputs {
            visit(input.cursor.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::BlockCursor;
    use crate::memory::TrackingAllocator;
    use crate::sort::SortOrder;
    use crate::types::{Attribute, DataType};

    fn sorted_input(values: &[Option<i32>]) -> Box<dyn Cursor> {
        let schema =
            TupleSchema::new(vec![Attribute::nullable("k", DataType::Int32)]).unwrap();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut block = Block::allocate(schema, values.len().max(1), alloc).unwrap();
        for v in values {
            let datum = v.map(Datum::Int32).unwrap_or(Datum::Null);
            block.append_datum_row(&[datum]).unwrap();
        }
        Box::new(BlockCursor::new(Arc::new(block)))
    }

    fn drain_keys(cursor: &mut dyn Cursor) -> Vec<Option<i32>> {
        let mut out = Vec::new();
        loop {
            match cursor.next(4).unwrap() {
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

    fn bound_order(ascending: bool) -> (TupleSchema, BoundSortOrder) {
        let schema =
            TupleSchema::new(vec![Attribute::nullable("k", DataType::Int32)]).unwrap();
        let order = if ascending {
            ColumnOrder::Ascending
        } else {
            ColumnOrder::Descending
        };
        let bound = SortOrder::new().add("k", order).bind(&schema).unwrap();
        (schema, bound)
    }

    #[test]
    fn merges_sorted_inputs() {
        let (_, order) = bound_order(true);
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let inputs = vec![
            sorted_input(&[Some(1), Some(4), Some(7)]),
            sorted_input(&[Some(2), Some(3), Some(9)]),
            sorted_input(&[]),
        ];
        let mut cursor = merge_union_all(order, inputs, &alloc).unwrap();
        assert_eq!(
            drain_keys(&mut cursor),
            vec![Some(1), Some(2), Some(3), Some(4), Some(7), Some(9)]
        );
    }

    #[test]
    fn nulls_come_first_ascending() {
        let (_, order) = bound_order(true);
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let inputs = vec![
            sorted_input(&[None, Some(5)]),
            sorted_input(&[None, Some(2)]),
        ];
        let mut cursor = merge_union_all(order, inputs, &alloc).unwrap();
        assert_eq!(drain_keys(&mut cursor), vec![None, None, Some(2), Some(5)]);
    }

    #[test]
    fn descending_merge_reverses_comparisons() {
        let (_, order) = bound_order(false);
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let inputs = vec![
            sorted_input(&[Some(9), Some(3), None]),
            sorted_input(&[Some(7), Some(3)]),
        ];
        let mut cursor = merge_union_all(order, inputs, &alloc).unwrap();
        assert_eq!(
            drain_keys(&mut cursor),
            vec![Some(9), Some(7), Some(3), Some(3), None]
        );
    }

    #[test]
    fn equal_keys_break_ties_by_input_index() {
        // Attach a payload column so the source input is observable.
        let schema = TupleSchema::new(vec![
            Attribute::not_nullable("k", DataType::Int32),
            Attribute::not_nullable("src", DataType::Int32),
        ])
        .unwrap();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let make_input = |src: i32, keys: &[i32]| -> Box<dyn Cursor> {
            let mut block =
                Block::allocate(schema.clone(), keys.len(), alloc.clone()).unwrap();
            for &k in keys {
                block
                    .append_datum_row(&[Datum::Int32(k), Datum::Int32(src)])
                    .unwrap();
            }
            Box::new(BlockCursor::new(Arc::new(block)))
        };
        let order = SortOrder::new()
            .add("k", ColumnOrder::Ascending)
            .bind(&schema)
            .unwrap();
        let mut cursor = merge_union_all(
            order,
            vec![make_input(0, &[1, 2]), make_input(1, &[1, 2])],
            &alloc,
        )
        .unwrap();

        let mut rows = Vec::new();
        loop {
            match cursor.next(100).unwrap() {
                Batch::Rows(v) => rows.extend(v.to_datum_rows()),
                Batch::Eos => break,
                Batch::WaitingOnBarrier => unreachable!(),
            }
        }
        assert_eq!(
            rows,
            vec![
                vec![Datum::Int32(1), Datum::Int32(0)],
                vec![Datum::Int32(1), Datum::Int32(1)],
                vec![Datum::Int32(2), Datum::Int32(0)],
                vec![Datum::Int32(2), Datum::Int32(1)],
            ]
        );
    }

    #[test]
    fn mismatched_schemas_are_rejected() {
        let (_, order) = bound_order(true);
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let other_schema =
            TupleSchema::new(vec![Attribute::not_nullable("z", DataType::Int64)]).unwrap();
        let mut other = Block::allocate(other_schema, 1, alloc.clone()).unwrap();
        other.append_datum_row(&[Datum::Int64(1)]).unwrap();
        let inputs: Vec<Box<dyn Cursor>> = vec![
            sorted_input(&[Some(1)]),
            Box::new(BlockCursor::new(Arc::new(other))),
        ];
        let err = match merge_union_all(order, inputs, &alloc) {
            Ok(_) => panic!("expected merge_union_all to fail"),
            Err(e) => e,
        };
        assert_eq!(
            crate::error::error_code(&err),
            Some(ErrorCode::TypeMismatch)
        );
    }
}
