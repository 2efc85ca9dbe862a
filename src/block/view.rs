//! # Views
//!
//! A `View` is a non-owning, schema-aligned rectangular slice of
//! columnar data: cheap to copy, cheap to window, valid until the
//! producer's next call. Every column in a view reports the same row
//! count.

use crate::types::{Datum, TupleSchema};

use super::column::ColumnView;

/// Non-owning projection over columns sharing one row count.
#[derive(Debug, Clone)]
pub struct View<'a> {
    schema: &'a TupleSchema,
    columns: Vec<ColumnView<'a>>,
    row_count: usize,
}

impl<'a> View<'a> {
    pub fn new(
        schema: &'a TupleSchema,
        columns: impl IntoIterator<Item = ColumnView<'a>>,
        row_count: usize,
    ) -> Self {
        let columns: Vec<ColumnView<'a>> = columns.into_iter().collect();
        debug_assert_eq!(schema.attribute_count(), columns.len());
        debug_assert!(columns.iter().all(|c| c.row_count() == row_count));
        Self {
            schema,
            columns,
            row_count,
        }
    }

    pub fn schema(&self) -> &'a TupleSchema {
        self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, position: usize) -> &ColumnView<'a> {
        &self.columns[position]
    }

    pub fn columns(&self) -> &[ColumnView<'a>] {
        &self.columns
    }

    /// Sub-range of rows; columns stay borrowed from the same storage.
    pub fn window(&self, offset: usize, len: usize) -> View<'a> {
        debug_assert!(offset + len <= self.row_count);
        View {
            schema: self.schema,
            columns: self
                .columns
                .iter()
                .map(|c| c.window(offset, len))
                .collect(),
            row_count: len,
        }
    }

    /// Re-selection of columns under a different schema (projection).
    /// The mapping gives, for each output position, the source column.
    pub fn select(&self, schema: &'a TupleSchema, mapping: &[usize]) -> View<'a> {
        debug_assert_eq!(schema.attribute_count(), mapping.len());
        View {
            schema,
            columns: mapping.iter().map(|&src| self.columns[src]).collect(),
            row_count: self.row_count,
        }
    }

    /// Boxes one row into owned datums. Test and diagnostics helper.
    pub fn row_datums(&self, row: usize) -> Vec<Datum> {
        self.columns.iter().map(|c| c.datum(row)).collect()
    }

    /// Boxes the whole view. Test helper; never on a hot path.
    pub fn to_datum_rows(&self) -> Vec<Vec<Datum>> {
        (0..self.row_count).map(|row| self.row_datums(row)).collect()
    }
}
