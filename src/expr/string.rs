//! String expressions in the sort path's working set: ASCII uppercase
//! and variadic concatenation. Both write their results into private
//! arena-backed blocks, resetting the arenas at the top of every
//! evaluation.

use std::sync::Arc;

use eyre::Result;
use hashbrown::HashSet;

use crate::block::{Bitmap, Block, ColumnSlice, View};
use crate::error::ErrorCode;
use crate::memory::{BufferAllocator, BytesRef};
use crate::types::{DataType, Nullability, TupleSchema};

use super::{scalar_schema, BoundExpression, Expression, ExpressionList};

/// ASCII-uppercases a STRING expression.
pub fn to_upper(argument: Box<dyn Expression>) -> Box<dyn Expression> {
    Box::new(ToUpper { argument })
}

/// Byte-wise concatenation of STRING expressions. The result is NULL
/// wherever any argument is NULL.
pub fn concat(arguments: ExpressionList) -> Box<dyn Expression> {
    Box::new(Concat { arguments })
}

fn require_string(
    bound: &dyn BoundExpression,
    context: &str,
) -> Result<()> {
    let schema = bound.result_schema();
    if schema.attribute_count() != 1 {
        crate::engine_bail!(
            ErrorCode::InvalidArgumentValue,
            "{} expects a single-column argument, got ({})",
            context,
            schema.human_readable()
        );
    }
    if schema.attribute(0).data_type() != DataType::String {
        crate::engine_bail!(
            ErrorCode::TypeMismatch,
            "{} expects a STRING argument, got {}",
            context,
            schema.attribute(0).data_type()
        );
    }
    Ok(())
}

fn string_values<'a>(view: &View<'a>) -> &'a [BytesRef] {
    match view.column(0).values() {
        ColumnSlice::String(values) => values,
        other => unreachable!("bound STRING expression produced {:?}", other),
    }
}

struct ToUpper {
    argument: Box<dyn Expression>,
}

impl Expression for ToUpper {
    fn bind(
        &self,
        schema: &TupleSchema,
        allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>> {
        let argument = self.argument.bind(schema, allocator, max_row_count)?;
        require_string(argument.as_ref(), "TOUPPER")?;
        let attribute = argument.result_schema().attribute(0);
        let result_schema = scalar_schema(
            format!("TOUPPER({})", attribute.name()),
            DataType::String,
            attribute.nullability(),
        );
        let block = Block::allocate(result_schema, max_row_count, Arc::clone(allocator))?;
        Ok(Box::new(BoundToUpper {
            argument,
            block,
            scratch: Vec::new(),
        }))
    }

    fn describe(&self) -> String {
        format!("TOUPPER({})", self.argument.describe())
    }
}

struct BoundToUpper {
    argument: Box<dyn BoundExpression>,
    block: Block,
    scratch: Vec<u8>,
}

impl BoundExpression for BoundToUpper {
    fn result_schema(&self) -> &TupleSchema {
        self.block.schema()
    }

    fn row_capacity(&self) -> usize {
        self.block.row_capacity().min(self.argument.row_capacity())
    }

    fn is_constant(&self) -> bool {
        self.argument.is_constant()
    }

    fn collect_referred_attributes(&self, out: &mut HashSet<String>) {
        self.argument.collect_referred_attributes(out);
    }

    fn evaluate<'a>(&'a mut self, input: &View<'a>, skip: &mut [Bitmap]) -> Result<View<'a>> {
        debug_assert_eq!(skip.len(), 1);
        let row_count = input.row_count();
        let argument = self.argument.evaluate(input, skip)?;
        let values = string_values(&argument);

        self.block.reset_arenas();
        // A sibling argument may have marked rows irrelevant before this
        // expression runs; a non-nullable result stores placeholders for
        // them instead of nulls.
        let nullable = self.block.schema().attribute(0).is_nullable();
        let skip_bits = &skip[0][..row_count];
        let column = self.block.column_mut(0);
        for row in 0..row_count {
            let skipped = skip_bits[row];
            if skipped {
                column.append_bytes(&[], nullable);
            } else {
                self.scratch.clear();
                self.scratch.extend_from_slice(values[row].as_bytes());
                self.scratch.make_ascii_uppercase();
                column.append_bytes(&self.scratch, false);
            }
        }
        self.block.set_row_count(row_count);
        Ok(self.block.view())
    }
}

struct Concat {
    arguments: ExpressionList,
}

impl Expression for Concat {
    fn bind(
        &self,
        schema: &TupleSchema,
        allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>> {
        if self.arguments.is_empty() {
            crate::engine_bail!(
                ErrorCode::InvalidArgumentValue,
                "CONCAT needs at least one argument"
            );
        }
        let mut bound_arguments = Vec::with_capacity(self.arguments.len());
        let mut nullability = Nullability::NotNullable;
        let mut name = String::from("CONCAT(");
        for (i, argument) in self.arguments.iter().enumerate() {
            let bound = argument.bind(schema, allocator, max_row_count)?;
            require_string(bound.as_ref(), "CONCAT")?;
            let attribute = bound.result_schema().attribute(0);
            nullability = nullability.or(attribute.nullability());
            if i > 0 {
                name.push_str(", ");
            }
            name.push_str(attribute.name());
            bound_arguments.push(bound);
        }
        name.push(')');

        let result_schema = scalar_schema(name, DataType::String, nullability);
        let block = Block::allocate(result_schema, max_row_count, Arc::clone(allocator))?;
        Ok(Box::new(BoundConcat {
            arguments: bound_arguments,
            block,
            scratch: Vec::new(),
        }))
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.arguments.iter().map(|a| a.describe()).collect();
        format!("CONCAT({})", parts.join(", "))
    }
}

struct BoundConcat {
    arguments: Vec<Box<dyn BoundExpression>>,
    block: Block,
    scratch: Vec<u8>,
}

impl BoundExpression for BoundConcat {
    fn result_schema(&self) -> &TupleSchema {
        self.block.schema()
    }

    fn row_capacity(&self) -> usize {
        self.arguments
            .iter()
            .map(|a| a.row_capacity())
            .fold(self.block.row_capacity(), usize::min)
    }

    fn is_constant(&self) -> bool {
        self.arguments.iter().all(|a| a.is_constant())
    }

    fn collect_referred_attributes(&self, out: &mut HashSet<String>) {
        for argument in &self.arguments {
            argument.collect_referred_attributes(out);
        }
    }

    fn evaluate<'a>(&'a mut self, input: &View<'a>, skip: &mut [Bitmap]) -> Result<View<'a>> {
        debug_assert_eq!(skip.len(), 1);
        let row_count = input.row_count();

        // All arguments share the skip vector, so every argument's
        // nulls are unioned in before any output row is written.
        let mut argument_views = Vec::with_capacity(self.arguments.len());
        for argument in self.arguments.iter_mut() {
            argument_views.push(argument.evaluate(input, skip)?);
        }
        let sources: Vec<&[BytesRef]> =
            argument_views.iter().map(string_values).collect();

        self.block.reset_arenas();
        let nullable = self.block.schema().attribute(0).is_nullable();
        let skip_bits = &skip[0][..row_count];
        let column = self.block.column_mut(0);
        if skip_bits.not_any() {
            for row in 0..row_count {
                self.scratch.clear();
                for source in &sources {
                    self.scratch.extend_from_slice(source[row].as_bytes());
                }
                column.append_bytes(&self.scratch, false);
            }
        } else {
            for row in 0..row_count {
                if skip_bits[row] {
                    column.append_bytes(&[], nullable);
                    continue;
                }
                self.scratch.clear();
                for source in &sources {
                    self.scratch.extend_from_slice(source[row].as_bytes());
                }
                column.append_bytes(&self.scratch, false);
            }
        }
        self.block.set_row_count(row_count);
        Ok(self.block.view())
    }
}
