//! # Sorters
//!
//! [`UnbufferedSorter`] sorts each written view immediately and hands
//! it to the [`Merger`] as a spilled run. [`BufferingSorter`] sits on
//! top of it: incoming views accumulate in a materialization [`Table`]
//! until the memory quota pushes back, at which point the table is
//! sorted in place, emitted as one run, and cleared.
//!
//! ## The quota arithmetic
//!
//! The buffering sorter receives `memory_quota` and builds this
//! allocator stack for its table:
//!
//! - a [`SoftQuotaBypassAllocator`] granting `memory_quota / 4` of
//!   private headroom, so the table keeps growing when sibling
//!   operators have eaten the engine's soft quota
//! - a [`MemoryLimit`] of `memory_quota / 2` (soft) on top of it
//!
//! The limit is half the nominal quota because the table doubles its
//! block as it grows and can transiently occupy twice the bytes its
//! rows need.

use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use tracing::debug;

use crate::block::{Block, Permutation, Table, View};
use crate::config::DEFAULT_ROW_COUNT;
use crate::cursor::{scan_view_with_selection, Batch, Cursor, CursorCore, Interruption};
use crate::error::ErrorCode;
use crate::memory::{BufferAllocator, MemoryLimit, SoftQuotaBypassAllocator};
use crate::types::TupleSchema;

use super::key_sort::sort_permutation;
use super::merger::Merger;
use super::order::BoundSortOrder;

/// Sorts every written view in isolation and spills it as a run.
pub struct UnbufferedSorter {
    sort_order: BoundSortOrder,
    allocator: Arc<dyn BufferAllocator>,
    merger: Merger,
}

impl UnbufferedSorter {
    pub fn new(
        schema: TupleSchema,
        sort_order: BoundSortOrder,
        temporary_directory_prefix: impl Into<PathBuf>,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Self {
        let merger = Merger::new(schema, temporary_directory_prefix, Arc::clone(&allocator));
        Self {
            sort_order,
            allocator,
            merger,
        }
    }

    pub fn sort_order(&self) -> &BoundSortOrder {
        &self.sort_order
    }

    /// Sorts `view` and persists it as one run. Consumes every row.
    pub fn write(&mut self, view: &View<'_>) -> Result<usize> {
        let row_count = view.row_count();
        let mut permutation = Permutation::identity(row_count);
        sort_permutation(&self.sort_order, view, &mut permutation);
        let mut run = scan_view_with_selection(
            view.clone(),
            permutation.into_vec(),
            &self.allocator,
            DEFAULT_ROW_COUNT,
        )?;
        self.merger.add_sorted(&mut run)?;
        Ok(row_count)
    }

    /// Merges all written runs with an optional extra sorted cursor.
    /// When nothing was spilled, the extra cursor is returned as-is.
    pub fn into_result_cursor(
        self,
        additional: Option<Box<dyn Cursor>>,
    ) -> Result<Box<dyn Cursor>> {
        if self.merger.empty() {
            if let Some(cursor) = additional {
                return Ok(cursor);
            }
        }
        self.merger.merge(&self.sort_order, additional)
    }
}

/// Buffers incoming views in a quota-bounded table, spilling sorted
/// runs when the table cannot grow.
pub struct BufferingSorter {
    table: Table,
    table_allocator: Arc<dyn BufferAllocator>,
    inner: UnbufferedSorter,
}

impl BufferingSorter {
    pub fn new(
        schema: TupleSchema,
        sort_order: BoundSortOrder,
        memory_quota: usize,
        temporary_directory_prefix: impl Into<PathBuf>,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Result<Self> {
        let bypass = Arc::new(SoftQuotaBypassAllocator::new(
            Arc::clone(&allocator),
            memory_quota / 4,
        ));
        let table_allocator: Arc<dyn BufferAllocator> =
            Arc::new(MemoryLimit::new(memory_quota / 2, false, bypass));
        let table = Table::new(schema.clone(), Arc::clone(&table_allocator))?;
        let inner = UnbufferedSorter::new(
            schema,
            sort_order,
            temporary_directory_prefix,
            allocator,
        );
        Ok(Self {
            table,
            table_allocator,
            inner,
        })
    }

    /// Copies leading rows of `view` into the table; on quota pushback
    /// the table is flushed as a run and the write retried once. A
    /// write that cannot place a single row into an empty table is
    /// MEMORY_EXCEEDED.
    pub fn write(&mut self, view: &View<'_>) -> Result<usize> {
        let written = self.table.append(view);
        if written > 0 {
            return Ok(written);
        }
        self.flush()?;
        debug_assert_eq!(self.table.row_count(), 0);
        let written = self.table.append(view);
        if written > 0 {
            return Ok(written);
        }
        crate::engine_bail!(
            ErrorCode::MemoryExceeded,
            "couldn't copy any data into an empty sort table; probably the hard quota \
             ran out (table quota soft remaining={}, used={})",
            self.table_allocator.soft_remaining(),
            self.table_allocator.used()
        );
    }

    /// Spills the table's contents as one sorted run and clears it.
    fn flush(&mut self) -> Result<()> {
        if self.table.row_count() == 0 {
            return Ok(());
        }
        debug!(rows = self.table.row_count(), "sort table full; spilling");
        let written = self.inner.write(&self.table.view())?;
        debug_assert_eq!(written, self.table.row_count());
        self.table.clear();
        Ok(())
    }

    pub fn spilled(&self) -> bool {
        !self.inner.merger.empty()
    }

    /// Sorts the still-resident table rows as the tail run and merges
    /// them with everything spilled so far.
    pub fn into_result_cursor(self) -> Result<Box<dyn Cursor>> {
        let Self { table, inner, .. } = self;
        let tail = SortedTableCursor::new(table, inner.sort_order(), &inner.allocator)?;
        inner.into_result_cursor(Some(Box::new(tail)))
    }
}

/// Cursor over an owned, permutation-sorted table: the sort's
/// in-memory tail run.
struct SortedTableCursor {
    table: Table,
    selection: Vec<usize>,
    position: usize,
    block: Block,
    core: CursorCore,
}

impl SortedTableCursor {
    fn new(
        table: Table,
        sort_order: &BoundSortOrder,
        allocator: &Arc<dyn BufferAllocator>,
    ) -> Result<Self> {
        let mut permutation = Permutation::identity(table.row_count());
        sort_permutation(sort_order, &table.view(), &mut permutation);
        let block = Block::allocate(
            table.schema().clone(),
            DEFAULT_ROW_COUNT.min(table.row_count().max(1)),
            Arc::clone(allocator),
        )?;
        Ok(Self {
            table,
            selection: permutation.into_vec(),
            position: 0,
            block,
            core: CursorCore::new(),
        })
    }
}

impl Cursor for SortedTableCursor {
    fn schema(&self) -> &TupleSchema {
        self.table.schema()
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        let remaining = self.selection.len() - self.position;
        if remaining == 0 {
            self.core.set_eos();
            return Ok(Batch::Eos);
        }
        let len = remaining.min(self.block.row_capacity()).min(max_rows.max(1));
        self.block.clear();
        let rows = &self.selection[self.position..self.position + len];
        let view = self.table.view();
        let appended = self.block.append_selected(&view, rows);
        self.core.guard(appended)?;
        self.position += len;
        Ok(Batch::Rows(self.block.view()))
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }
}
