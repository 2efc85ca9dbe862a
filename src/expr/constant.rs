//! Constant expressions: a literal repeated for every input row. The
//! output block is filled once at bind time; evaluation is a window.

use std::sync::Arc;

use eyre::Result;
use hashbrown::HashSet;

use crate::block::{Bitmap, Block, View};
use crate::memory::BufferAllocator;
use crate::types::{Datum, Nullability, TupleSchema};

use super::{scalar_schema, BoundExpression, Expression};

/// A typed literal. `Datum::Null` is not a valid constant; nullable
/// constants are out of this engine's working set.
pub fn constant(value: Datum) -> Box<dyn Expression> {
    assert!(!value.is_null(), "NULL constants are not supported");
    Box::new(Constant { value })
}

struct Constant {
    value: Datum,
}

impl Expression for Constant {
    fn bind(
        &self,
        _schema: &TupleSchema,
        allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>> {
        let data_type = self.value.data_type().expect("non-null constant");
        let schema = scalar_schema(self.describe(), data_type, Nullability::NotNullable);
        let mut block = Block::allocate(schema, max_row_count, Arc::clone(allocator))?;
        for _ in 0..max_row_count {
            block.append_datum_row(std::slice::from_ref(&self.value))?;
        }
        Ok(Box::new(BoundConstant { block }))
    }

    fn describe(&self) -> String {
        format!("{:?}", self.value)
    }
}

struct BoundConstant {
    block: Block,
}

impl BoundExpression for BoundConstant {
    fn result_schema(&self) -> &TupleSchema {
        self.block.schema()
    }

    fn row_capacity(&self) -> usize {
        self.block.row_capacity()
    }

    fn is_constant(&self) -> bool {
        true
    }

    fn collect_referred_attributes(&self, _out: &mut HashSet<String>) {}

    fn evaluate<'a>(&'a mut self, input: &View<'a>, _skip: &mut [Bitmap]) -> Result<View<'a>> {
        Ok(self.block.view().window(0, input.row_count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::bind_expression_tree;
    use crate::memory::TrackingAllocator;
    use crate::types::{Attribute, DataType};

    #[test]
    fn constant_repeats_for_every_row() {
        let schema =
            TupleSchema::new(vec![Attribute::not_nullable("x", DataType::Int32)]).unwrap();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut input = Block::allocate(schema.clone(), 3, alloc.clone()).unwrap();
        for i in 0..3 {
            input.append_datum_row(&[Datum::Int32(i)]).unwrap();
        }

        let mut tree =
            bind_expression_tree(&*constant(Datum::Int64(7)), &schema, &alloc, 8).unwrap();
        assert!(tree.is_constant());
        assert!(tree.referred_attributes().is_empty());
        let view = input.view();
        let result = tree.evaluate(&view).unwrap();
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.row_datums(2), vec![Datum::Int64(7)]);
    }
}
