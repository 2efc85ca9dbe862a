//! # Blocks
//!
//! A `Block` owns the backing storage for one schema: one [`Column`]
//! per attribute, a row capacity, and the memory reservation that pays
//! for it. Fixed-width storage is reserved up front at allocation
//! time; variable-length payload bytes are reserved incrementally as
//! rows are appended. Everything is released on drop.

use std::sync::Arc;

use eyre::Result;

use crate::error::ErrorCode;
use crate::memory::BufferAllocator;
use crate::types::{Datum, TupleSchema};

use super::column::{Column, ColumnView};
use super::view::View;

/// Fixed footprint of one row: value bytes (descriptor bytes for
/// variable-length types) plus one bit per nullable attribute, rounded
/// up.
fn per_row_footprint(schema: &TupleSchema) -> usize {
    let mut bytes = 0usize;
    for attribute in schema.attributes() {
        bytes += attribute
            .data_type()
            .fixed_size()
            .unwrap_or(std::mem::size_of::<crate::memory::BytesRef>());
        if attribute.is_nullable() {
            bytes += 1;
        }
    }
    bytes.max(1)
}

/// Owned, allocator-accounted columnar storage.
pub struct Block {
    schema: TupleSchema,
    columns: Vec<Column>,
    row_count: usize,
    row_capacity: usize,
    allocator: Arc<dyn BufferAllocator>,
    fixed_bytes_reserved: usize,
    var_bytes_reserved: usize,
}

impl Block {
    /// Allocates a block with the given row capacity, reserving the
    /// fixed-width footprint through the allocator's soft path.
    pub fn allocate(
        schema: TupleSchema,
        row_capacity: usize,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Result<Self> {
        Self::allocate_reserving(schema, row_capacity, allocator, false)
    }

    /// Allocates through the hard path. For seed buffers that must
    /// exist even when sibling operators have exhausted the soft
    /// quota, such as the sort table's initial block.
    pub fn allocate_hard(
        schema: TupleSchema,
        row_capacity: usize,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Result<Self> {
        Self::allocate_reserving(schema, row_capacity, allocator, true)
    }

    fn allocate_reserving(
        schema: TupleSchema,
        row_capacity: usize,
        allocator: Arc<dyn BufferAllocator>,
        hard: bool,
    ) -> Result<Self> {
        let fixed_bytes = per_row_footprint(&schema) * row_capacity;
        let reserved = if hard {
            allocator.try_reserve_hard(fixed_bytes)
        } else {
            allocator.try_reserve(fixed_bytes)
        };
        if !reserved {
            crate::engine_bail!(
                ErrorCode::MemoryExceeded,
                "cannot allocate block of {} rows ({} bytes); soft quota remaining {}",
                row_capacity,
                fixed_bytes,
                allocator.soft_remaining()
            );
        }
        let columns = schema
            .attributes()
            .iter()
            .map(|attribute| Column::with_capacity(attribute, row_capacity))
            .collect();
        Ok(Self {
            schema,
            columns,
            row_count: 0,
            row_capacity,
            allocator,
            fixed_bytes_reserved: fixed_bytes,
            var_bytes_reserved: 0,
        })
    }

    pub fn schema(&self) -> &TupleSchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn row_capacity(&self) -> usize {
        self.row_capacity
    }

    pub fn is_full(&self) -> bool {
        self.row_count == self.row_capacity
    }

    pub fn column(&self, position: usize) -> &Column {
        &self.columns[position]
    }

    pub fn column_mut(&mut self, position: usize) -> &mut Column {
        &mut self.columns[position]
    }

    pub fn view(&self) -> View<'_> {
        let columns: Vec<ColumnView<'_>> = self.columns.iter().map(Column::view).collect();
        View::new(&self.schema, columns, self.row_count)
    }

    /// Copies one row of `view` into this block.
    ///
    /// Returns false, without copying, when the block is full or the
    /// variable-length payload does not fit the allocator's soft
    /// quota. The first row of an empty block reserves its payload
    /// through the hard path instead, so a minimal write always
    /// succeeds while any hard quota remains.
    pub fn try_append_row(&mut self, view: &View<'_>, row: usize) -> bool {
        debug_assert_eq!(view.column_count(), self.columns.len());
        if self.row_count == self.row_capacity {
            return false;
        }
        let var_bytes: usize = view
            .columns()
            .iter()
            .map(|c| c.values().var_bytes(row))
            .sum();
        if var_bytes > 0 && !self.try_reserve_payload(var_bytes) {
            return false;
        }
        for (column, src) in self.columns.iter_mut().zip(view.columns()) {
            column.append_from(src, row);
        }
        self.var_bytes_reserved += var_bytes;
        self.row_count += 1;
        true
    }

    /// Payload reservation: soft-quota bounded, except for the first
    /// row of an empty block, which may claim hard-quota headroom.
    fn try_reserve_payload(&self, var_bytes: usize) -> bool {
        if self.row_count == 0 {
            self.allocator.try_reserve_hard(var_bytes)
        } else {
            self.allocator.try_reserve(var_bytes)
        }
    }

    /// Appends a contiguous window of `view`, stopping early when out
    /// of capacity or quota. Returns the number of rows copied.
    pub fn append_window(&mut self, view: &View<'_>, offset: usize, len: usize) -> usize {
        let mut appended = 0;
        while appended < len {
            if !self.try_append_row(view, offset + appended) {
                break;
            }
            appended += 1;
        }
        appended
    }

    /// Appends selected rows of `view` in the given order, failing with
    /// MEMORY_EXCEEDED when a row does not fit. Used by batch-building
    /// cursors whose output block is sized for the batch.
    pub fn append_selected(&mut self, view: &View<'_>, rows: &[usize]) -> Result<()> {
        for &row in rows {
            if !self.try_append_row(view, row) {
                crate::engine_bail!(
                    ErrorCode::MemoryExceeded,
                    "cannot copy row into batch block; rows {}/{}, soft quota remaining {}",
                    self.row_count,
                    self.row_capacity,
                    self.allocator.soft_remaining()
                );
            }
        }
        Ok(())
    }

    /// Drops all rows and arena payloads, keeping the capacity.
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.allocator.release(self.var_bytes_reserved);
        self.var_bytes_reserved = 0;
        self.row_count = 0;
    }

    /// Discards all rows and variable-length payloads so the block can
    /// be refilled. Expression blocks call this at the top of each
    /// evaluation.
    pub fn reset_arenas(&mut self) {
        self.clear();
    }

    /// Appends one row of owned datums. Off the vectorized path; used
    /// when rows arrive cell-wise (spill decoding, tests).
    pub fn append_datum_row(&mut self, row: &[Datum]) -> Result<()> {
        debug_assert_eq!(row.len(), self.columns.len());
        if self.row_count == self.row_capacity {
            crate::engine_bail!(
                ErrorCode::MemoryExceeded,
                "block full at {} rows",
                self.row_capacity
            );
        }
        let var_bytes: usize = row
            .iter()
            .map(|d| match d {
                Datum::String(b) | Datum::Binary(b) => b.len(),
                _ => 0,
            })
            .sum();
        if var_bytes > 0 && !self.try_reserve_payload(var_bytes) {
            crate::engine_bail!(
                ErrorCode::MemoryExceeded,
                "cannot reserve {} payload bytes; soft quota remaining {}",
                var_bytes,
                self.allocator.soft_remaining()
            );
        }
        for (column, datum) in self.columns.iter_mut().zip(row) {
            column.append_datum(datum);
        }
        self.var_bytes_reserved += var_bytes;
        self.row_count += 1;
        Ok(())
    }

    /// Declares the row count after columns were filled directly
    /// through [`column_mut`](Self::column_mut). Every column must hold
    /// exactly `rows` rows.
    pub fn set_row_count(&mut self, rows: usize) {
        debug_assert!(rows <= self.row_capacity);
        debug_assert!(self.columns.iter().all(|c| c.len() == rows));
        self.row_count = rows;
    }

    /// Grows capacity to `new_capacity` rows if the allocator's soft
    /// quota permits.
    pub fn try_grow(&mut self, new_capacity: usize) -> bool {
        if new_capacity <= self.row_capacity {
            return true;
        }
        let additional_rows = new_capacity - self.row_capacity;
        let additional_bytes = per_row_footprint(&self.schema) * additional_rows;
        if !self.allocator.try_reserve(additional_bytes) {
            return false;
        }
        for column in &mut self.columns {
            column.reserve_exact(additional_rows);
        }
        self.fixed_bytes_reserved += additional_bytes;
        self.row_capacity = new_capacity;
        true
    }

    pub fn allocator(&self) -> &Arc<dyn BufferAllocator> {
        &self.allocator
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.allocator
            .release(self.fixed_bytes_reserved + self.var_bytes_reserved);
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("schema", &self.schema.human_readable())
            .field("row_count", &self.row_count)
            .field("row_capacity", &self.row_capacity)
            .field("fixed_bytes_reserved", &self.fixed_bytes_reserved)
            .field("var_bytes_reserved", &self.var_bytes_reserved)
            .finish()
    }
}

/// Convenience constructor used throughout the engine for scratch and
/// batch blocks.
pub fn batch_block(
    schema: &TupleSchema,
    row_capacity: usize,
    allocator: &Arc<dyn BufferAllocator>,
) -> Result<Block> {
    Block::allocate(schema.clone(), row_capacity, Arc::clone(allocator))
}
