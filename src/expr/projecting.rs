//! Projecting expressions: attribute references, renames, and the
//! compound combinator that concatenates sub-expression outputs into a
//! multi-column result. None of these copy data; they re-borrow input
//! or child storage.

use std::sync::Arc;

use eyre::Result;
use hashbrown::HashSet;

use crate::block::{Bitmap, View};
use crate::error::ErrorCode;
use crate::memory::BufferAllocator;
use crate::types::TupleSchema;

use super::{union_nulls_into_skip, BoundExpression, Expression, ExpressionList};

/// Reference to an input attribute by name.
pub fn named_attribute(name: impl Into<String>) -> Box<dyn Expression> {
    Box::new(NamedAttribute { name: name.into() })
}

/// Reference to an input attribute by position.
pub fn attribute_at(position: usize) -> Box<dyn Expression> {
    Box::new(AttributeAt { position })
}

/// Renames the single-attribute result of `expression`.
pub fn alias(name: impl Into<String>, expression: Box<dyn Expression>) -> Box<dyn Expression> {
    Box::new(Alias {
        name: name.into(),
        inner: expression,
    })
}

/// Concatenates the outputs of `expressions` into one multi-column
/// result, preserving order.
pub fn compound(expressions: ExpressionList) -> Box<dyn Expression> {
    Box::new(Compound { expressions })
}

struct NamedAttribute {
    name: String,
}

impl Expression for NamedAttribute {
    fn bind(
        &self,
        schema: &TupleSchema,
        _allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>> {
        let position = schema.require_attribute_position(&self.name)?;
        Ok(Box::new(BoundAttributeProjection {
            schema: TupleSchema::new(vec![schema.attribute(position).clone()])?,
            position,
            row_capacity: max_row_count,
        }))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

struct AttributeAt {
    position: usize,
}

impl Expression for AttributeAt {
    fn bind(
        &self,
        schema: &TupleSchema,
        _allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>> {
        if self.position >= schema.attribute_count() {
            crate::engine_bail!(
                ErrorCode::AttributeMissing,
                "attribute position {} out of range for schema ({})",
                self.position,
                schema.human_readable()
            );
        }
        Ok(Box::new(BoundAttributeProjection {
            schema: TupleSchema::new(vec![schema.attribute(self.position).clone()])?,
            position: self.position,
            row_capacity: max_row_count,
        }))
    }

    fn describe(&self) -> String {
        format!("attribute_at({})", self.position)
    }
}

/// Pass-through of one input column. Unions the column's nulls into the
/// skip vector so parent combinators observe them.
struct BoundAttributeProjection {
    schema: TupleSchema,
    position: usize,
    row_capacity: usize,
}

impl BoundExpression for BoundAttributeProjection {
    fn result_schema(&self) -> &TupleSchema {
        &self.schema
    }

    fn row_capacity(&self) -> usize {
        self.row_capacity
    }

    fn collect_referred_attributes(&self, out: &mut HashSet<String>) {
        out.insert(self.schema.attribute(0).name().to_string());
    }

    fn evaluate<'a>(&'a mut self, input: &View<'a>, skip: &mut [Bitmap]) -> Result<View<'a>> {
        debug_assert_eq!(skip.len(), 1);
        let column = *input.column(self.position);
        if let Some(nulls) = column.nulls() {
            union_nulls_into_skip(&mut skip[0][..input.row_count()], nulls);
        }
        Ok(View::new(&self.schema, [column], input.row_count()))
    }
}

struct Alias {
    name: String,
    inner: Box<dyn Expression>,
}

impl Expression for Alias {
    fn bind(
        &self,
        schema: &TupleSchema,
        allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>> {
        let inner = self.inner.bind(schema, allocator, max_row_count)?;
        if inner.result_schema().attribute_count() != 1 {
            crate::engine_bail!(
                ErrorCode::InvalidArgumentValue,
                "alias '{}' applied to a {}-column expression",
                self.name,
                inner.result_schema().attribute_count()
            );
        }
        let attribute = inner.result_schema().attribute(0).with_name(&self.name);
        Ok(Box::new(BoundAlias {
            schema: TupleSchema::new(vec![attribute])?,
            inner,
        }))
    }

    fn describe(&self) -> String {
        format!("{} AS {}", self.inner.describe(), self.name)
    }
}

struct BoundAlias {
    schema: TupleSchema,
    inner: Box<dyn BoundExpression>,
}

impl BoundExpression for BoundAlias {
    fn result_schema(&self) -> &TupleSchema {
        &self.schema
    }

    fn row_capacity(&self) -> usize {
        self.inner.row_capacity()
    }

    fn is_constant(&self) -> bool {
        self.inner.is_constant()
    }

    fn collect_referred_attributes(&self, out: &mut HashSet<String>) {
        self.inner.collect_referred_attributes(out);
    }

    fn evaluate<'a>(&'a mut self, input: &View<'a>, skip: &mut [Bitmap]) -> Result<View<'a>> {
        let result = self.inner.evaluate(input, skip)?;
        Ok(result.select(&self.schema, &[0]))
    }
}

struct Compound {
    expressions: ExpressionList,
}

impl Expression for Compound {
    fn bind(
        &self,
        schema: &TupleSchema,
        allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>> {
        let mut children = Vec::with_capacity(self.expressions.len());
        let mut result_schema = TupleSchema::empty();
        for expression in &self.expressions {
            let bound = expression.bind(schema, allocator, max_row_count)?;
            for attribute in bound.result_schema().attributes() {
                result_schema.add_attribute(attribute.clone())?;
            }
            children.push(bound);
        }
        Ok(Box::new(BoundCompound {
            schema: result_schema,
            children,
        }))
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.expressions.iter().map(|e| e.describe()).collect();
        format!("compound({})", parts.join(", "))
    }
}

struct BoundCompound {
    schema: TupleSchema,
    children: Vec<Box<dyn BoundExpression>>,
}

impl BoundExpression for BoundCompound {
    fn result_schema(&self) -> &TupleSchema {
        &self.schema
    }

    fn row_capacity(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.row_capacity())
            .min()
            .unwrap_or(usize::MAX)
    }

    fn is_constant(&self) -> bool {
        self.children.iter().all(|c| c.is_constant())
    }

    fn collect_referred_attributes(&self, out: &mut HashSet<String>) {
        for child in &self.children {
            child.collect_referred_attributes(out);
        }
    }

    fn evaluate<'a>(&'a mut self, input: &View<'a>, skip: &mut [Bitmap]) -> Result<View<'a>> {
        debug_assert_eq!(skip.len(), self.schema.attribute_count());
        let mut child_views = Vec::with_capacity(self.children.len());
        let mut skip_rest = skip;
        for child in self.children.iter_mut() {
            let width = child.result_schema().attribute_count();
            let (child_skip, rest) = std::mem::take(&mut skip_rest).split_at_mut(width);
            skip_rest = rest;
            child_views.push(child.evaluate(input, child_skip)?);
        }
        let columns = child_views
            .iter()
            .flat_map(|v| v.columns().iter().copied())
            .collect::<Vec<_>>();
        Ok(View::new(&self.schema, columns, input.row_count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::error::error_code;
    use crate::expr::bind_expression_tree;
    use crate::memory::TrackingAllocator;
    use crate::types::{Attribute, DataType, Datum};

    fn input_block() -> Block {
        let schema = TupleSchema::new(vec![
            Attribute::not_nullable("a", DataType::Int32),
            Attribute::nullable("b", DataType::Int32),
        ])
        .unwrap();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut block = Block::allocate(schema, 3, alloc).unwrap();
        block
            .append_datum_row(&[Datum::Int32(1), Datum::Int32(10)])
            .unwrap();
        block.append_datum_row(&[Datum::Int32(2), Datum::Null]).unwrap();
        block
            .append_datum_row(&[Datum::Int32(3), Datum::Int32(30)])
            .unwrap();
        block
    }

    #[test]
    fn named_attribute_passes_rows_through() {
        let block = input_block();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut tree =
            bind_expression_tree(&*named_attribute("b"), block.view().schema(), &alloc, 16)
                .unwrap();
        let view = block.view();
        let result = tree.evaluate(&view).unwrap();
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.row_datums(1), vec![Datum::Null]);
        assert_eq!(result.row_datums(2), vec![Datum::Int32(30)]);
    }

    #[test]
    fn missing_attribute_fails_binding() {
        let block = input_block();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let err = match bind_expression_tree(&*named_attribute("zzz"), block.view().schema(), &alloc, 16)
        {
            Ok(_) => panic!("expected bind_expression_tree to fail"),
            Err(e) => e,
        };
        assert_eq!(error_code(&err), Some(ErrorCode::AttributeMissing));
    }

    #[test]
    fn compound_concatenates_columns() {
        let block = input_block();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let expr = compound(vec![
            attribute_at(1),
            alias("a2", attribute_at(0)),
        ]);
        let mut tree =
            bind_expression_tree(&*expr, block.view().schema(), &alloc, 16).unwrap();
        assert_eq!(tree.result_schema().attribute(0).name(), "b");
        assert_eq!(tree.result_schema().attribute(1).name(), "a2");
        let view = block.view();
        let result = tree.evaluate(&view).unwrap();
        assert_eq!(
            result.row_datums(1),
            vec![Datum::Null, Datum::Int32(2)]
        );
    }

    #[test]
    fn referred_attributes_are_collected() {
        let block = input_block();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let expr = compound(vec![named_attribute("a"), named_attribute("b")]);
        let tree = bind_expression_tree(&*expr, block.view().schema(), &alloc, 16).unwrap();
        let names = tree.referred_attributes();
        assert!(names.contains("a"));
        assert!(names.contains("b"));
        assert_eq!(names.len(), 2);
    }
}
