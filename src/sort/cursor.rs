//! # The Sort Cursor and Operation
//!
//! The sort cursor's life has three phases. On the first pull it
//! drains its child completely into the buffering sorter (spilling
//! runs under memory pressure). Once the child reports end of stream,
//! the sorter's merged cursor takes over and every subsequent pull
//! serves sorted rows through the result projector.
//!
//! A barrier-aware child may interrupt the drain with
//! WAITING_ON_BARRIER; the sort propagates it upward without losing
//! the partially materialized state and resumes where it stopped on
//! the next pull.

use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use tracing::debug;

use crate::config::DEFAULT_ROW_COUNT;
use crate::cursor::{Batch, Cursor, CursorCore, Interruption, Operation};
use crate::error::ErrorCode;
use crate::memory::BufferAllocator;
use crate::projector::{
    project_all_attributes, BoundSingleSourceProjector, SingleSourceProjector,
};
use crate::types::TupleSchema;

use super::order::{BoundSortOrder, SortOrder};
use super::sorter::BufferingSorter;

pub struct SortCursor {
    child: Box<dyn Cursor>,
    sorter: Option<BufferingSorter>,
    result: Option<Box<dyn Cursor>>,
    projector: BoundSingleSourceProjector,
    barrier_supported: bool,
    core: CursorCore,
}

/// Builds a sort cursor from pre-bound parts. A missing projector
/// means "project all attributes".
pub fn bound_sort(
    sort_order: BoundSortOrder,
    result_projector: Option<BoundSingleSourceProjector>,
    memory_quota: usize,
    temporary_directory_prefix: impl Into<PathBuf>,
    allocator: Arc<dyn BufferAllocator>,
    child: Box<dyn Cursor>,
) -> Result<Box<dyn Cursor>> {
    let schema = child.schema().clone();
    let projector = match result_projector {
        Some(projector) => projector,
        None => project_all_attributes().bind(&schema)?,
    };
    let sorter = BufferingSorter::new(
        schema,
        sort_order,
        memory_quota,
        temporary_directory_prefix,
        allocator,
    )?;
    let core = CursorCore::with_interruption(child.interruption());
    Ok(Box::new(SortCursor {
        barrier_supported: child.is_waiting_on_barrier_supported(),
        child,
        sorter: Some(sorter),
        result: None,
        projector,
        core,
    }))
}

impl SortCursor {
    /// Pulls the child until EOS or a barrier, feeding the sorter.
    /// Returns true when the drain is complete.
    fn drain(
        child: &mut dyn Cursor,
        sorter: &mut BufferingSorter,
        interruption: &Interruption,
    ) -> Result<bool> {
        loop {
            if interruption.is_interrupted() {
                crate::engine_bail!(ErrorCode::Interrupted, "sort interrupted during drain");
            }
            match child.next(DEFAULT_ROW_COUNT)? {
                Batch::Rows(view) => {
                    let mut offset = 0;
                    while offset < view.row_count() {
                        let written =
                            sorter.write(&view.window(offset, view.row_count() - offset))?;
                        offset += written;
                    }
                }
                Batch::Eos => return Ok(true),
                Batch::WaitingOnBarrier => return Ok(false),
            }
        }
    }
}

impl Cursor for SortCursor {
    fn schema(&self) -> &TupleSchema {
        self.projector.result_schema()
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        if self.result.is_none() {
            let interruption = self.core.interruption();
            let sorter = self.sorter.as_mut().expect("sorter present before merge");
            let drained = Self::drain(self.child.as_mut(), sorter, &interruption);
            if !self.core.guard(drained)? {
                debug_assert!(self.barrier_supported);
                return Ok(Batch::WaitingOnBarrier);
            }
            let sorter = self.sorter.take().expect("sorter present before merge");
            debug!(spilled = sorter.spilled(), "sort drain complete; merging");
            let merged = sorter.into_result_cursor();
            self.result = Some(self.core.guard(merged)?);
        }
        let result = self.result.as_mut().expect("merged cursor present");
        let pulled = result.next(max_rows);
        match self.core.guard(pulled)? {
            Batch::Rows(view) => Ok(Batch::Rows(self.projector.project_view(&view))),
            Batch::Eos => {
                self.core.set_eos();
                Ok(Batch::Eos)
            }
            Batch::WaitingOnBarrier => {
                crate::engine_bail!(
                    ErrorCode::NotImplemented,
                    "merged sort output cannot wait on a barrier"
                );
            }
        }
    }

    fn is_waiting_on_barrier_supported(&self) -> bool {
        self.barrier_supported
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }

    fn apply_to_children(&mut self, visit: &mut dyn FnMut(&mut dyn Cursor)) {
        visit(self.child.as_mut());
    }
}

/// Planning-time sort operator.
pub struct SortOperation {
    sort_order: SortOrder,
    result_projector: Option<SingleSourceProjector>,
    memory_quota: usize,
    temporary_directory_prefix: PathBuf,
    allocator: Arc<dyn BufferAllocator>,
    child: Box<dyn Operation>,
}

impl Operation for SortOperation {
    fn create_cursor(&self) -> Result<Box<dyn Cursor>> {
        let child = self.child.create_cursor()?;
        let schema = child.schema().clone();
        let sort_order = self.sort_order.bind(&schema)?;
        let projector = self
            .result_projector
            .as_ref()
            .map(|projector| projector.bind(&schema))
            .transpose()?;
        bound_sort(
            sort_order,
            projector,
            self.memory_quota,
            self.temporary_directory_prefix.clone(),
            Arc::clone(&self.allocator),
            child,
        )
    }
}

/// Sort with spill files in the system temp directory.
pub fn sort(
    sort_order: SortOrder,
    result_projector: Option<SingleSourceProjector>,
    memory_quota: usize,
    allocator: Arc<dyn BufferAllocator>,
    child: Box<dyn Operation>,
) -> Box<dyn Operation> {
    sort_with_temp_dir_prefix(
        sort_order,
        result_projector,
        memory_quota,
        "",
        allocator,
        child,
    )
}

/// Sort with an explicit spill directory prefix; empty means the
/// system temp directory.
pub fn sort_with_temp_dir_prefix(
    sort_order: SortOrder,
    result_projector: Option<SingleSourceProjector>,
    memory_quota: usize,
    temporary_directory_prefix: impl Into<PathBuf>,
    allocator: Arc<dyn BufferAllocator>,
    child: Box<dyn Operation>,
) -> Box<dyn Operation> {
    Box::new(SortOperation {
        sort_order,
        result_projector,
        memory_quota,
        temporary_directory_prefix: temporary_directory_prefix.into(),
        allocator,
        child,
    })
}
