//! Limit cursor: skip `offset` rows, emit up to `count`, then EOS.

use eyre::Result;

use crate::config::DEFAULT_ROW_COUNT;
use crate::types::TupleSchema;

use super::{Batch, Cursor, CursorCore, Interruption};

pub struct LimitCursor {
    child: Box<dyn Cursor>,
    offset_remaining: usize,
    count_remaining: usize,
    core: CursorCore,
}

/// Wraps `child` so that `offset` leading rows are dropped and at most
/// `count` rows pass through.
pub fn limit(offset: usize, count: usize, child: Box<dyn Cursor>) -> LimitCursor {
    let core = CursorCore::with_interruption(child.interruption());
    LimitCursor {
        child,
        offset_remaining: offset,
        count_remaining: count,
        core,
    }
}

impl Cursor for LimitCursor {
    fn schema(&self) -> &TupleSchema {
        self.child.schema()
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() || self.count_remaining == 0 {
            self.core.set_eos();
            return Ok(Batch::Eos);
        }

        // Skip phase: pull and discard until the offset is consumed.
        // Requests never exceed the remaining offset, so a returned
        // batch is dropped whole.
        while self.offset_remaining > 0 {
            let request = self.offset_remaining.min(DEFAULT_ROW_COUNT);
            let pulled = self.child.next(request);
            match self.core.guard(pulled)? {
                Batch::Rows(view) => {
                    self.offset_remaining -= view.row_count().min(self.offset_remaining);
                }
                Batch::Eos => {
                    self.core.set_eos();
                    return Ok(Batch::Eos);
                }
                Batch::WaitingOnBarrier => return Ok(Batch::WaitingOnBarrier),
            }
        }

        let request = max_rows.max(1).min(self.count_remaining);
        let pulled = self.child.next(request);
        match self.core.guard(pulled)? {
            Batch::Rows(view) => {
                let take = view.row_count().min(self.count_remaining);
                self.count_remaining -= take;
                Ok(Batch::Rows(view.window(0, take)))
            }
            Batch::Eos => {
                self.core.set_eos();
                Ok(Batch::Eos)
            }
            Batch::WaitingOnBarrier => Ok(Batch::WaitingOnBarrier),
        }
    }

    fn is_waiting_on_barrier_supported(&self) -> bool {
        self.child.is_waiting_on_barrier_supported()
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }

    fn apply_to_children(&mut self, visit: &mut dyn FnMut(&mut dyn Cursor)) {
        visit(self.child.as_mut());
    }
}
