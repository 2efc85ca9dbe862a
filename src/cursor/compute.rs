//! Compute cursor: evaluates a bound expression tree on every child
//! batch. Pulls are clamped to the tree's row capacity so the
//! pre-allocated output blocks never overflow.

use eyre::Result;

use crate::expr::BoundExpressionTree;
use crate::types::TupleSchema;

use super::{Batch, Cursor, CursorCore, Interruption};

pub struct ComputeCursor {
    child: Box<dyn Cursor>,
    tree: BoundExpressionTree,
    core: CursorCore,
}

/// Wraps `child` with per-batch evaluation of `tree`. The tree must
/// have been bound against the child's schema.
pub fn compute(tree: BoundExpressionTree, child: Box<dyn Cursor>) -> ComputeCursor {
    let core = CursorCore::with_interruption(child.interruption());
    ComputeCursor { child, tree, core }
}

impl Cursor for ComputeCursor {
    fn schema(&self) -> &TupleSchema {
        self.tree.result_schema()
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        let request = max_rows.max(1).min(self.tree.row_capacity());
        let pulled = self.child.next(request);
        match self.core.guard(pulled)? {
            Batch::Rows(view) => {
                let evaluated = self.tree.evaluate(&view);
                Ok(Batch::Rows(self.core.guard(evaluated)?))
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::block::Block;
    use crate::cursor::BlockCursor;
    use crate::expr::{bind_expression_tree, compound, concat, named_attribute};
    use crate::memory::{BufferAllocator, TrackingAllocator};
    use crate::types::{Attribute, DataType, Datum, TupleSchema};

    #[test]
    fn compute_extends_batches_with_expression_output() {
        let schema = TupleSchema::new(vec![
            Attribute::not_nullable("a", DataType::String),
            Attribute::not_nullable("b", DataType::String),
        ])
        .unwrap();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut block = Block::allocate(schema.clone(), 2, alloc.clone()).unwrap();
        block
            .append_datum_row(&[
                Datum::String(b"a".to_vec()),
                Datum::String(b"x".to_vec()),
            ])
            .unwrap();
        block
            .append_datum_row(&[
                Datum::String(b"b".to_vec()),
                Datum::String(b"y".to_vec()),
            ])
            .unwrap();

        let expr = compound(vec![
            named_attribute("a"),
            crate::expr::alias(
                "joined",
                concat(vec![named_attribute("a"), named_attribute("b")]),
            ),
        ]);
        let tree = bind_expression_tree(&*expr, &schema, &alloc, 16).unwrap();
        let mut cursor = compute(tree, Box::new(BlockCursor::new(Arc::new(block))));

        assert_eq!(cursor.schema().attribute(1).name(), "joined");
        match cursor.next(10).unwrap() {
            Batch::Rows(v) => {
                assert_eq!(
                    v.to_datum_rows(),
                    vec![
                        vec![
                            Datum::String(b"a".to_vec()),
                            Datum::String(b"ax".to_vec())
                        ],
                        vec![
                            Datum::String(b"b".to_vec()),
                            Datum::String(b"by".to_vec())
                        ],
                    ]
                );
            }
            other => panic!("expected rows, got {:?}", other),
        }
        assert!(cursor.next(10).unwrap().is_eos());
    }
}
