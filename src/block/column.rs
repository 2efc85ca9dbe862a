//! # Typed Columns
//!
//! A `Column` is the owning storage for one attribute: a contiguous
//! typed buffer, an optional null bitmap, and (for STRING/BINARY) the
//! arena holding the payload bytes. `ColumnView`/`ColumnSlice` are the
//! borrowed, zero-copy counterparts that flow through the cursor
//! pipeline.
//!
//! ## Invariants
//!
//! - The null bitmap is present iff the attribute is nullable; an
//!   absent bitmap means every row is valid
//! - Bitmap length always equals value count
//! - Null rows hold a defined placeholder value (zero / empty bytes) so
//!   vectorized loops may read them without branching

use bitvec::prelude::*;

use crate::memory::{Arena, BytesRef};
use crate::types::{Attribute, DataType, Datum};

/// Null bitmap storage: bit i set means row i is NULL.
pub type Bitmap = BitVec<usize, Lsb0>;

/// Borrowed null bitmap window.
pub type BitmapSlice<'a> = &'a BitSlice<usize, Lsb0>;

/// Owning typed buffer, one variant per [`DataType`].
#[derive(Debug)]
pub enum ColumnData {
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Bool(Vec<bool>),
    String(Vec<BytesRef>),
    Binary(Vec<BytesRef>),
    Date(Vec<i32>),
    Datetime(Vec<i64>),
}

impl ColumnData {
    fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Int32 => ColumnData::Int32(Vec::with_capacity(capacity)),
            DataType::UInt32 => ColumnData::UInt32(Vec::with_capacity(capacity)),
            DataType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            DataType::UInt64 => ColumnData::UInt64(Vec::with_capacity(capacity)),
            DataType::Float => ColumnData::Float(Vec::with_capacity(capacity)),
            DataType::Double => ColumnData::Double(Vec::with_capacity(capacity)),
            DataType::Bool => ColumnData::Bool(Vec::with_capacity(capacity)),
            DataType::String => ColumnData::String(Vec::with_capacity(capacity)),
            DataType::Binary => ColumnData::Binary(Vec::with_capacity(capacity)),
            DataType::Date => ColumnData::Date(Vec::with_capacity(capacity)),
            DataType::Datetime => ColumnData::Datetime(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int32(v) | ColumnData::Date(v) => v.len(),
            ColumnData::UInt32(v) => v.len(),
            ColumnData::Int64(v) | ColumnData::Datetime(v) => v.len(),
            ColumnData::UInt64(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Double(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::String(v) | ColumnData::Binary(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::UInt32(_) => DataType::UInt32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::UInt64(_) => DataType::UInt64,
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Double(_) => DataType::Double,
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::String(_) => DataType::String,
            ColumnData::Binary(_) => DataType::Binary,
            ColumnData::Date(_) => DataType::Date,
            ColumnData::Datetime(_) => DataType::Datetime,
        }
    }

    pub fn as_slice(&self) -> ColumnSlice<'_> {
        match self {
            ColumnData::Int32(v) => ColumnSlice::Int32(v),
            ColumnData::UInt32(v) => ColumnSlice::UInt32(v),
            ColumnData::Int64(v) => ColumnSlice::Int64(v),
            ColumnData::UInt64(v) => ColumnSlice::UInt64(v),
            ColumnData::Float(v) => ColumnSlice::Float(v),
            ColumnData::Double(v) => ColumnSlice::Double(v),
            ColumnData::Bool(v) => ColumnSlice::Bool(v),
            ColumnData::String(v) => ColumnSlice::String(v),
            ColumnData::Binary(v) => ColumnSlice::Binary(v),
            ColumnData::Date(v) => ColumnSlice::Date(v),
            ColumnData::Datetime(v) => ColumnSlice::Datetime(v),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            ColumnData::Int32(v) | ColumnData::Date(v) => v.truncate(len),
            ColumnData::UInt32(v) => v.truncate(len),
            ColumnData::Int64(v) | ColumnData::Datetime(v) => v.truncate(len),
            ColumnData::UInt64(v) => v.truncate(len),
            ColumnData::Float(v) => v.truncate(len),
            ColumnData::Double(v) => v.truncate(len),
            ColumnData::Bool(v) => v.truncate(len),
            ColumnData::String(v) | ColumnData::Binary(v) => v.truncate(len),
        }
    }

    fn reserve_exact(&mut self, additional: usize) {
        match self {
            ColumnData::Int32(v) | ColumnData::Date(v) => v.reserve_exact(additional),
            ColumnData::UInt32(v) => v.reserve_exact(additional),
            ColumnData::Int64(v) | ColumnData::Datetime(v) => v.reserve_exact(additional),
            ColumnData::UInt64(v) => v.reserve_exact(additional),
            ColumnData::Float(v) => v.reserve_exact(additional),
            ColumnData::Double(v) => v.reserve_exact(additional),
            ColumnData::Bool(v) => v.reserve_exact(additional),
            ColumnData::String(v) | ColumnData::Binary(v) => v.reserve_exact(additional),
        }
    }
}

/// Borrowed typed buffer window.
#[derive(Debug, Clone, Copy)]
pub enum ColumnSlice<'a> {
    Int32(&'a [i32]),
    UInt32(&'a [u32]),
    Int64(&'a [i64]),
    UInt64(&'a [u64]),
    Float(&'a [f32]),
    Double(&'a [f64]),
    Bool(&'a [bool]),
    String(&'a [BytesRef]),
    Binary(&'a [BytesRef]),
    Date(&'a [i32]),
    Datetime(&'a [i64]),
}

impl<'a> ColumnSlice<'a> {
    pub fn len(&self) -> usize {
        match self {
            ColumnSlice::Int32(v) | ColumnSlice::Date(v) => v.len(),
            ColumnSlice::UInt32(v) => v.len(),
            ColumnSlice::Int64(v) | ColumnSlice::Datetime(v) => v.len(),
            ColumnSlice::UInt64(v) => v.len(),
            ColumnSlice::Float(v) => v.len(),
            ColumnSlice::Double(v) => v.len(),
            ColumnSlice::Bool(v) => v.len(),
            ColumnSlice::String(v) | ColumnSlice::Binary(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window(&self, offset: usize, len: usize) -> ColumnSlice<'a> {
        match *self {
            ColumnSlice::Int32(v) => ColumnSlice::Int32(&v[offset..offset + len]),
            ColumnSlice::UInt32(v) => ColumnSlice::UInt32(&v[offset..offset + len]),
            ColumnSlice::Int64(v) => ColumnSlice::Int64(&v[offset..offset + len]),
            ColumnSlice::UInt64(v) => ColumnSlice::UInt64(&v[offset..offset + len]),
            ColumnSlice::Float(v) => ColumnSlice::Float(&v[offset..offset + len]),
            ColumnSlice::Double(v) => ColumnSlice::Double(&v[offset..offset + len]),
            ColumnSlice::Bool(v) => ColumnSlice::Bool(&v[offset..offset + len]),
            ColumnSlice::String(v) => ColumnSlice::String(&v[offset..offset + len]),
            ColumnSlice::Binary(v) => ColumnSlice::Binary(&v[offset..offset + len]),
            ColumnSlice::Date(v) => ColumnSlice::Date(&v[offset..offset + len]),
            ColumnSlice::Datetime(v) => ColumnSlice::Datetime(&v[offset..offset + len]),
        }
    }

    /// Payload bytes a copy of this row would add (variable-length
    /// columns only).
    pub fn var_bytes(&self, row: usize) -> usize {
        match self {
            ColumnSlice::String(v) | ColumnSlice::Binary(v) => v[row].len(),
            _ => 0,
        }
    }
}

/// Borrowed column: typed values plus the null window.
#[derive(Debug, Clone, Copy)]
pub struct ColumnView<'a> {
    values: ColumnSlice<'a>,
    nulls: Option<BitmapSlice<'a>>,
}

impl<'a> ColumnView<'a> {
    pub fn new(values: ColumnSlice<'a>, nulls: Option<BitmapSlice<'a>>) -> Self {
        if let Some(nulls) = nulls {
            debug_assert_eq!(values.len(), nulls.len());
        }
        Self { values, nulls }
    }

    pub fn values(&self) -> ColumnSlice<'a> {
        self.values
    }

    pub fn nulls(&self) -> Option<BitmapSlice<'a>> {
        self.nulls
    }

    pub fn data_type(&self) -> DataType {
        match self.values {
            ColumnSlice::Int32(_) => DataType::Int32,
            ColumnSlice::UInt32(_) => DataType::UInt32,
            ColumnSlice::Int64(_) => DataType::Int64,
            ColumnSlice::UInt64(_) => DataType::UInt64,
            ColumnSlice::Float(_) => DataType::Float,
            ColumnSlice::Double(_) => DataType::Double,
            ColumnSlice::Bool(_) => DataType::Bool,
            ColumnSlice::String(_) => DataType::String,
            ColumnSlice::Binary(_) => DataType::Binary,
            ColumnSlice::Date(_) => DataType::Date,
            ColumnSlice::Datetime(_) => DataType::Datetime,
        }
    }

    pub fn row_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.nulls.map(|bits| bits[row]).unwrap_or(false)
    }

    pub fn window(&self, offset: usize, len: usize) -> ColumnView<'a> {
        ColumnView {
            values: self.values.window(offset, len),
            nulls: self.nulls.map(|bits| &bits[offset..offset + len]),
        }
    }

    /// Boxes one cell into an owned [`Datum`]. Off the vectorized path;
    /// used by merge keys and tests.
    pub fn datum(&self, row: usize) -> Datum {
        if self.is_null(row) {
            return Datum::Null;
        }
        match self.values {
            ColumnSlice::Int32(v) => Datum::Int32(v[row]),
            ColumnSlice::UInt32(v) => Datum::UInt32(v[row]),
            ColumnSlice::Int64(v) => Datum::Int64(v[row]),
            ColumnSlice::UInt64(v) => Datum::UInt64(v[row]),
            ColumnSlice::Float(v) => Datum::Float(v[row]),
            ColumnSlice::Double(v) => Datum::Double(v[row]),
            ColumnSlice::Bool(v) => Datum::Bool(v[row]),
            ColumnSlice::String(v) => Datum::String(v[row].as_bytes().to_vec()),
            ColumnSlice::Binary(v) => Datum::Binary(v[row].as_bytes().to_vec()),
            ColumnSlice::Date(v) => Datum::Date(v[row]),
            ColumnSlice::Datetime(v) => Datum::Datetime(v[row]),
        }
    }
}

/// Owning storage for one attribute.
#[derive(Debug)]
pub struct Column {
    data: ColumnData,
    nulls: Option<Bitmap>,
    arena: Option<Arena>,
}

impl Column {
    pub fn with_capacity(attribute: &Attribute, capacity: usize) -> Self {
        let data_type = attribute.data_type();
        Self {
            data: ColumnData::with_capacity(data_type, capacity),
            nulls: attribute.is_nullable().then(Bitmap::new),
            arena: data_type.is_variable_length().then(Arena::new),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn arena(&self) -> Option<&Arena> {
        self.arena.as_ref()
    }

    pub fn view(&self) -> ColumnView<'_> {
        ColumnView {
            values: self.data.as_slice(),
            nulls: self.nulls.as_deref(),
        }
    }

    /// Appends row `row` of `src`, copying variable-length payloads
    /// into this column's arena.
    ///
    /// Panics in debug builds on a type mismatch; columns only receive
    /// data for the attribute they were allocated for.
    pub fn append_from(&mut self, src: &ColumnView<'_>, row: usize) {
        let is_null = src.is_null(row);
        if let Some(nulls) = &mut self.nulls {
            nulls.push(is_null);
        } else {
            debug_assert!(!is_null, "null row appended to a NOT NULL column");
        }
        match (&mut self.data, src.values()) {
            (ColumnData::Int32(d), ColumnSlice::Int32(s)) => {
                d.push(if is_null { 0 } else { s[row] })
            }
            (ColumnData::UInt32(d), ColumnSlice::UInt32(s)) => {
                d.push(if is_null { 0 } else { s[row] })
            }
            (ColumnData::Int64(d), ColumnSlice::Int64(s)) => {
                d.push(if is_null { 0 } else { s[row] })
            }
            (ColumnData::UInt64(d), ColumnSlice::UInt64(s)) => {
                d.push(if is_null { 0 } else { s[row] })
            }
            (ColumnData::Float(d), ColumnSlice::Float(s)) => {
                d.push(if is_null { 0.0 } else { s[row] })
            }
            (ColumnData::Double(d), ColumnSlice::Double(s)) => {
                d.push(if is_null { 0.0 } else { s[row] })
            }
            (ColumnData::Bool(d), ColumnSlice::Bool(s)) => {
                d.push(if is_null { false } else { s[row] })
            }
            (ColumnData::Date(d), ColumnSlice::Date(s)) => {
                d.push(if is_null { 0 } else { s[row] })
            }
            (ColumnData::Datetime(d), ColumnSlice::Datetime(s)) => {
                d.push(if is_null { 0 } else { s[row] })
            }
            (ColumnData::String(d), ColumnSlice::String(s))
            | (ColumnData::Binary(d), ColumnSlice::Binary(s)) => {
                let bytes = if is_null {
                    BytesRef::empty()
                } else {
                    let arena = self.arena.as_ref().expect("var-len column without arena");
                    arena.alloc_bytes(s[row].as_bytes())
                };
                d.push(bytes);
            }
            (dst, src) => {
                debug_assert!(
                    false,
                    "column type mismatch: {:?} <- {:?}",
                    dst.data_type(),
                    src
                );
            }
        }
    }

    /// Appends one owned datum, copying payload bytes into the arena.
    /// Cell-wise path for spill decoding and tests.
    pub fn append_datum(&mut self, datum: &Datum) {
        let is_null = datum.is_null();
        if let Some(nulls) = &mut self.nulls {
            nulls.push(is_null);
        } else {
            debug_assert!(!is_null, "null datum appended to a NOT NULL column");
        }
        match (&mut self.data, datum) {
            (ColumnData::Int32(d), Datum::Int32(v)) => d.push(*v),
            (ColumnData::UInt32(d), Datum::UInt32(v)) => d.push(*v),
            (ColumnData::Int64(d), Datum::Int64(v)) => d.push(*v),
            (ColumnData::UInt64(d), Datum::UInt64(v)) => d.push(*v),
            (ColumnData::Float(d), Datum::Float(v)) => d.push(*v),
            (ColumnData::Double(d), Datum::Double(v)) => d.push(*v),
            (ColumnData::Bool(d), Datum::Bool(v)) => d.push(*v),
            (ColumnData::Date(d), Datum::Date(v)) => d.push(*v),
            (ColumnData::Datetime(d), Datum::Datetime(v)) => d.push(*v),
            (ColumnData::String(d), Datum::String(bytes))
            | (ColumnData::Binary(d), Datum::Binary(bytes)) => {
                let arena = self.arena.as_ref().expect("var-len column without arena");
                d.push(arena.alloc_bytes(bytes));
            }
            (data, Datum::Null) => match data {
                ColumnData::Int32(d) | ColumnData::Date(d) => d.push(0),
                ColumnData::UInt32(d) => d.push(0),
                ColumnData::Int64(d) | ColumnData::Datetime(d) => d.push(0),
                ColumnData::UInt64(d) => d.push(0),
                ColumnData::Float(d) => d.push(0.0),
                ColumnData::Double(d) => d.push(0.0),
                ColumnData::Bool(d) => d.push(false),
                ColumnData::String(d) | ColumnData::Binary(d) => d.push(BytesRef::empty()),
            },
            (data, datum) => {
                debug_assert!(
                    false,
                    "datum type mismatch: {:?} <- {:?}",
                    data.data_type(),
                    datum
                );
            }
        }
    }

    /// Appends a byte payload to a STRING/BINARY column, copying it
    /// into the column's arena. Null rows store the empty descriptor.
    pub fn append_bytes(&mut self, bytes: &[u8], is_null: bool) {
        if let Some(nulls) = &mut self.nulls {
            nulls.push(is_null);
        } else {
            debug_assert!(!is_null, "null row appended to a NOT NULL column");
        }
        let value = if is_null {
            BytesRef::empty()
        } else {
            let arena = self.arena.as_ref().expect("var-len column without arena");
            arena.alloc_bytes(bytes)
        };
        match &mut self.data {
            ColumnData::String(d) | ColumnData::Binary(d) => d.push(value),
            other => debug_assert!(false, "append_bytes on {:?}", other.data_type()),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
        if let Some(nulls) = &mut self.nulls {
            nulls.truncate(len);
        }
    }

    /// Drops all rows and variable-length payloads.
    pub fn clear(&mut self) {
        self.truncate(0);
        if let Some(arena) = &mut self.arena {
            arena.reset();
        }
    }

    pub fn reserve_exact(&mut self, additional: usize) {
        self.data.reserve_exact(additional);
        if let Some(nulls) = &mut self.nulls {
            nulls.reserve(additional);
        }
    }

    /// Bytes of arena payload currently held.
    pub fn arena_bytes(&self) -> usize {
        self.arena.as_ref().map(Arena::allocated_bytes).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Nullability;

    fn string_column(values: &[Option<&str>]) -> Column {
        let attr = Attribute::new("s", DataType::String, Nullability::Nullable);
        let mut col = Column::with_capacity(&attr, values.len());
        let staging_arena = Arena::new();
        let staging: Vec<BytesRef> = values
            .iter()
            .map(|v| staging_arena.alloc_bytes(v.unwrap_or("").as_bytes()))
            .collect();
        let mut nulls = Bitmap::new();
        for v in values {
            nulls.push(v.is_none());
        }
        let src = ColumnView::new(ColumnSlice::String(&staging), Some(nulls.as_bitslice()));
        for row in 0..values.len() {
            col.append_from(&src, row);
        }
        col
    }

    #[test]
    fn append_copies_payloads_into_own_arena() {
        let col = string_column(&[Some("alpha"), None, Some("beta")]);
        let view = col.view();
        assert_eq!(view.row_count(), 3);
        assert_eq!(view.datum(0), Datum::String(b"alpha".to_vec()));
        assert_eq!(view.datum(1), Datum::Null);
        assert_eq!(view.datum(2), Datum::String(b"beta".to_vec()));
        assert!(col.arena_bytes() >= "alpha".len() + "beta".len());
    }

    #[test]
    fn clear_resets_rows_and_arena() {
        let mut col = string_column(&[Some("payload")]);
        col.clear();
        assert_eq!(col.len(), 0);
        assert_eq!(col.view().row_count(), 0);
    }

    #[test]
    fn windows_share_storage() {
        let attr = Attribute::not_nullable("n", DataType::Int32);
        let mut col = Column::with_capacity(&attr, 4);
        let data = [10, 20, 30, 40];
        let src = ColumnView::new(ColumnSlice::Int32(&data), None);
        for row in 0..4 {
            col.append_from(&src, row);
        }
        let view = col.view().window(1, 2);
        assert_eq!(view.row_count(), 2);
        assert_eq!(view.datum(0), Datum::Int32(20));
        assert_eq!(view.datum(1), Datum::Int32(30));
    }
}
