//! # Materialization Tables
//!
//! A `Table` is a growable block used by the sort pipeline to buffer
//! incoming views until memory pressure forces a spill. Growth doubles
//! the row capacity, so the table may transiently reserve up to twice
//! the bytes its rows occupy; the BufferingSorter compensates by
//! halving the quota it hands the table's allocator.
//!
//! `append` is best-effort: it copies as many leading rows of the view
//! as fit under the allocator's soft quota and reports the count.
//! Returning 0 is the spill signal, not an error.

use std::sync::Arc;

use eyre::Result;

use crate::config::INITIAL_TABLE_ROW_CAPACITY;
use crate::memory::BufferAllocator;
use crate::types::TupleSchema;

use super::block::Block;
use super::view::View;

/// Growable row buffer backing the sort's materialization phase.
pub struct Table {
    block: Block,
}

impl Table {
    pub fn new(schema: TupleSchema, allocator: Arc<dyn BufferAllocator>) -> Result<Self> {
        // The seed block goes through the hard path so a table exists
        // even when the soft quota is already under pressure; all
        // growth beyond it is soft-quota bounded.
        let block = Block::allocate_hard(schema, INITIAL_TABLE_ROW_CAPACITY, allocator)?;
        Ok(Self { block })
    }

    pub fn schema(&self) -> &TupleSchema {
        self.block.schema()
    }

    pub fn row_count(&self) -> usize {
        self.block.row_count()
    }

    pub fn view(&self) -> View<'_> {
        self.block.view()
    }

    /// Copies leading rows of `view` until capacity or quota runs out,
    /// doubling capacity as needed. Returns the rows copied; 0 means
    /// nothing fit.
    pub fn append(&mut self, view: &View<'_>) -> usize {
        let mut appended = 0;
        while appended < view.row_count() {
            if self.block.is_full() && !self.try_double() {
                break;
            }
            let copied =
                self.block
                    .append_window(view, appended, view.row_count() - appended);
            if copied == 0 {
                break;
            }
            appended += copied;
        }
        appended
    }

    fn try_double(&mut self) -> bool {
        let target = (self.block.row_capacity() * 2).max(INITIAL_TABLE_ROW_CAPACITY);
        self.block.try_grow(target)
    }

    /// Drops all buffered rows and payloads, keeping current capacity.
    pub fn clear(&mut self) {
        self.block.clear();
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("block", &self.block).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLimit, TrackingAllocator};
    use crate::types::{Attribute, DataType, Datum};

    fn int_schema() -> TupleSchema {
        TupleSchema::new(vec![Attribute::not_nullable("n", DataType::Int64)]).unwrap()
    }

    fn source_block(values: std::ops::Range<i64>) -> Block {
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let values: Vec<i64> = values.collect();
        let mut block = Block::allocate(int_schema(), values.len(), alloc).unwrap();
        for v in values {
            block.append_datum_row(&[Datum::Int64(v)]).unwrap();
        }
        block
    }

    #[test]
    fn append_grows_by_doubling() {
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut table = Table::new(int_schema(), alloc).unwrap();
        let src = source_block(0..1000);
        let view = src.view();
        assert_eq!(table.append(&view), 1000);
        assert_eq!(table.row_count(), 1000);
        assert_eq!(table.view().row_datums(999), vec![Datum::Int64(999)]);
    }

    #[test]
    fn append_reports_partial_fit_under_quota() {
        let parent: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        // Enough for the initial capacity and one doubling, not more.
        let quota = Arc::new(MemoryLimit::new(600, false, parent));
        let mut table = Table::new(int_schema(), quota as Arc<dyn BufferAllocator>).unwrap();
        let src = source_block(0..1000);
        let view = src.view();
        let appended = table.append(&view);
        assert!(appended > 0);
        assert!(appended < 1000);
        // A cleared table accepts rows again.
        table.clear();
        assert!(table.append(&view) > 0);
    }
}
