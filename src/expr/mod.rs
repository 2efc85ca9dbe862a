//! # Bound Expression Evaluation
//!
//! Expressions come in two layers. The *symbolic* layer ([`Expression`])
//! describes a computation without knowing its input schema; binding it
//! resolves attribute references and result types, or fails with a bind
//! error. The *bound* layer ([`BoundExpression`]) is fully typed and
//! evaluates on views, writing into private, pre-allocated output
//! blocks.
//!
//! ## The Skip-Vector Protocol
//!
//! Evaluation carries one bit-vector per output column. A set bit on
//! entry means "this row is already known irrelevant" — the expression
//! may skip the work. An expression MUST set the bit wherever its
//! computation produces NULL, and the returned view's null bitmap
//! reflects the final skip vector. Combinators evaluate children with
//! the same skip vector, so null propagation is a union performed
//! before the combinator writes its own output.
//!
//! [`BoundExpressionTree`] owns the pre-allocated skip storage (sized
//! to `max_row_count`), zeroes it per evaluation, and delegates to the
//! root.

pub mod constant;
pub mod projecting;
pub mod string;

use std::sync::Arc;

use eyre::Result;
use hashbrown::HashSet;

use crate::block::{Bitmap, View};
use crate::error::ErrorCode;
use crate::memory::BufferAllocator;
use crate::types::TupleSchema;

pub use constant::constant;
pub use projecting::{alias, attribute_at, compound, named_attribute};
pub use string::{concat, to_upper};

/// List of symbolic expressions, for variadic combinators.
pub type ExpressionList = Vec<Box<dyn Expression>>;

/// 'Executable' expression: types and nullability fully resolved.
pub trait BoundExpression {
    /// Schema of the result. Usually one attribute; combinators such as
    /// compound expressions may produce several.
    fn result_schema(&self) -> &TupleSchema;

    /// Largest input view this expression can process without
    /// overflowing its output buffers.
    fn row_capacity(&self) -> usize;

    /// True for expressions that depend on no input attribute.
    fn is_constant(&self) -> bool {
        false
    }

    /// Adds the input attribute names this expression depends on.
    fn collect_referred_attributes(&self, out: &mut HashSet<String>);

    /// Evaluates on `input`, driven by one skip vector per output
    /// column (see module docs for the protocol).
    fn evaluate<'a>(&'a mut self, input: &View<'a>, skip: &mut [Bitmap]) -> Result<View<'a>>;
}

/// 'Symbolic' expression: result type not yet known.
pub trait Expression {
    /// Resolves attribute references and types against `schema`.
    /// Binding failures carry bind error codes (schema errors).
    fn bind(
        &self,
        schema: &TupleSchema,
        allocator: &Arc<dyn BufferAllocator>,
        max_row_count: usize,
    ) -> Result<Box<dyn BoundExpression>>;

    /// Human-readable rendering for error messages and plans.
    fn describe(&self) -> String;
}

/// A bound root plus the pre-allocated skip-vector storage.
pub struct BoundExpressionTree {
    root: Box<dyn BoundExpression>,
    skip: Vec<Bitmap>,
    max_row_count: usize,
}

impl BoundExpressionTree {
    /// Wraps a bound expression, allocating one skip vector per output
    /// column sized to `max_row_count`.
    pub fn create(root: Box<dyn BoundExpression>, max_row_count: usize) -> Result<Self> {
        if max_row_count == 0 {
            crate::engine_bail!(
                ErrorCode::InvalidArgumentValue,
                "expression tree needs a positive row capacity"
            );
        }
        let columns = root.result_schema().attribute_count();
        let skip = (0..columns)
            .map(|_| Bitmap::repeat(false, max_row_count))
            .collect();
        Ok(Self {
            root,
            skip,
            max_row_count,
        })
    }

    pub fn result_schema(&self) -> &TupleSchema {
        self.root.result_schema()
    }

    pub fn row_capacity(&self) -> usize {
        self.max_row_count.min(self.root.row_capacity())
    }

    pub fn is_constant(&self) -> bool {
        self.root.is_constant()
    }

    pub fn referred_attributes(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        self.root.collect_referred_attributes(&mut names);
        names
    }

    /// Zeroes the skip vectors and evaluates the root. The result has
    /// exactly `input.row_count()` rows.
    pub fn evaluate<'a>(&'a mut self, input: &View<'a>) -> Result<View<'a>> {
        if input.row_count() > self.row_capacity() {
            crate::engine_bail!(
                ErrorCode::InvalidArgumentValue,
                "input of {} rows exceeds expression row capacity {}",
                input.row_count(),
                self.row_capacity()
            );
        }
        for vector in &mut self.skip {
            vector.fill(false);
        }
        self.root.evaluate(input, &mut self.skip)
    }
}

/// Binds a symbolic expression and wraps it into an evaluable tree.
pub fn bind_expression_tree(
    expression: &dyn Expression,
    schema: &TupleSchema,
    allocator: &Arc<dyn BufferAllocator>,
    max_row_count: usize,
) -> Result<BoundExpressionTree> {
    let bound = expression.bind(schema, allocator, max_row_count)?;
    BoundExpressionTree::create(bound, max_row_count)
}

/// Single-attribute result schema, the common case for leaf and scalar
/// expressions.
pub(crate) fn scalar_schema(
    name: impl Into<String>,
    data_type: crate::types::DataType,
    nullability: crate::types::Nullability,
) -> TupleSchema {
    TupleSchema::new(vec![crate::types::Attribute::new(name, data_type, nullability)])
        .expect("single attribute schema")
}

/// Marks `skip` wherever `nulls` has a set bit (null union).
pub(crate) fn union_nulls_into_skip(
    skip: &mut bitvec::slice::BitSlice<usize, bitvec::order::Lsb0>,
    nulls: crate::block::BitmapSlice<'_>,
) {
    for row in nulls.iter_ones() {
        skip.set(row, true);
    }
}
