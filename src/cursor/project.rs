//! Project cursor: applies a bound projector to every batch. Pure
//! column re-selection; rows are never copied.

use eyre::Result;

use crate::projector::BoundSingleSourceProjector;
use crate::types::TupleSchema;

use super::{Batch, Cursor, CursorCore, Interruption};

pub struct ProjectCursor {
    child: Box<dyn Cursor>,
    projector: BoundSingleSourceProjector,
    core: CursorCore,
}

/// Wraps `child` with a projection. The projector must be bound
/// against the child's schema.
pub fn project(projector: BoundSingleSourceProjector, child: Box<dyn Cursor>) -> ProjectCursor {
    debug_assert_eq!(projector.source_schema(), child.schema());
    let core = CursorCore::with_interruption(child.interruption());
    ProjectCursor {
        child,
        projector,
        core,
    }
}

impl Cursor for ProjectCursor {
    fn schema(&self) -> &TupleSchema {
        self.projector.result_schema()
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        let pulled = self.child.next(max_rows);
        match self.core.guard(pulled)? {
            Batch::Rows(view) => Ok(Batch::Rows(self.projector.project_view(&view))),
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::block::Block;
    use crate::cursor::BlockCursor;
    use crate::memory::{BufferAllocator, TrackingAllocator};
    use crate::projector::project_named_attributes;
    use crate::types::{Attribute, DataType, Datum};

    #[test]
    fn projection_applies_per_batch() {
        let schema = crate::types::TupleSchema::new(vec![
            Attribute::not_nullable("a", DataType::Int32),
            Attribute::not_nullable("b", DataType::Int32),
        ])
        .unwrap();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut block = Block::allocate(schema.clone(), 3, alloc).unwrap();
        for i in 0..3 {
            block
                .append_datum_row(&[Datum::Int32(i), Datum::Int32(i * 10)])
                .unwrap();
        }
        let projector = project_named_attributes(["b"]).bind(&schema).unwrap();
        let mut cursor = project(projector, Box::new(BlockCursor::new(Arc::new(block))));

        assert_eq!(cursor.schema().attribute_count(), 1);
        match cursor.next(2).unwrap() {
            Batch::Rows(v) => {
                assert_eq!(v.to_datum_rows(), vec![
                    vec![Datum::Int32(0)],
                    vec![Datum::Int32(10)],
                ]);
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }
}
