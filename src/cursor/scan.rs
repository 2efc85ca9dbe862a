//! Scan cursors: batched iteration over in-memory data, with or
//! without a row selection.

use std::sync::Arc;

use eyre::Result;

use crate::block::{batch_block, Block, View};
use crate::error::ErrorCode;
use crate::memory::BufferAllocator;
use crate::types::TupleSchema;

use super::{Batch, Cursor, CursorCore, Interruption, Operation};

/// Cursor over a borrowed view, serving windows without copying.
pub struct ViewCursor<'v> {
    view: View<'v>,
    position: usize,
    core: CursorCore,
}

impl<'v> ViewCursor<'v> {
    pub fn new(view: View<'v>) -> Self {
        Self {
            view,
            position: 0,
            core: CursorCore::new(),
        }
    }
}

impl<'v> Cursor for ViewCursor<'v> {
    fn schema(&self) -> &TupleSchema {
        self.view.schema()
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        let remaining = self.view.row_count() - self.position;
        if remaining == 0 {
            self.core.set_eos();
            return Ok(Batch::Eos);
        }
        let len = remaining.min(max_rows.max(1));
        let window = self.view.window(self.position, len);
        self.position += len;
        Ok(Batch::Rows(window))
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }
}

/// Cursor projecting a view through a row selection in fixed-size
/// chunks. Each batch is copied into a private block, so the output
/// remains valid while the cursor advances.
pub struct SelectionScanCursor<'v> {
    view: View<'v>,
    selection: Vec<usize>,
    position: usize,
    batch_size: usize,
    block: Block,
    core: CursorCore,
}

/// Builds a cursor over `view` reordered by `selection`, emitting
/// `batch_size`-row chunks.
pub fn scan_view_with_selection<'v>(
    view: View<'v>,
    selection: Vec<usize>,
    allocator: &Arc<dyn BufferAllocator>,
    batch_size: usize,
) -> Result<SelectionScanCursor<'v>> {
    if batch_size == 0 {
        crate::engine_bail!(ErrorCode::InvalidArgumentValue, "batch_size must be positive");
    }
    debug_assert!(selection.iter().all(|&row| row < view.row_count()));
    let block = batch_block(view.schema(), batch_size, allocator)?;
    Ok(SelectionScanCursor {
        view,
        selection,
        position: 0,
        batch_size,
        block,
        core: CursorCore::new(),
    })
}

impl<'v> Cursor for SelectionScanCursor<'v> {
    fn schema(&self) -> &TupleSchema {
        self.block.schema()
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
        let len = remaining.min(self.batch_size).min(max_rows.max(1));
        self.block.clear();
        let rows = &self.selection[self.position..self.position + len];
        let result = self.block.append_selected(&self.view, rows);
        self.core.guard(result)?;
        self.position += len;
        Ok(Batch::Rows(self.block.view()))
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }
}

/// Cursor over shared, immutable block storage. The owning-data
/// counterpart of [`ViewCursor`]; what [`ScanBlockOperation`] builds.
pub struct BlockCursor {
    block: Arc<Block>,
    position: usize,
    core: CursorCore,
}

impl BlockCursor {
    pub fn new(block: Arc<Block>) -> Self {
        Self {
            block,
            position: 0,
            core: CursorCore::new(),
        }
    }
}

impl Cursor for BlockCursor {
    fn schema(&self) -> &TupleSchema {
        self.block.schema()
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        let remaining = self.block.row_count() - self.position;
        if remaining == 0 {
            self.core.set_eos();
            return Ok(Batch::Eos);
        }
        let len = remaining.min(max_rows.max(1));
        let offset = self.position;
        self.position += len;
        Ok(Batch::Rows(self.block.view().window(offset, len)))
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }
}

/// Leaf operation scanning a shared block.
pub struct ScanBlockOperation {
    block: Arc<Block>,
}

impl ScanBlockOperation {
    pub fn new(block: Arc<Block>) -> Self {
        Self { block }
    }
}

impl Operation for ScanBlockOperation {
    fn create_cursor(&self) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(BlockCursor::new(Arc::clone(&self.block))))
    }
}
