//! Sort orderings: the symbolic description (attribute names plus
//! directions), the bound form (resolved positions), and the extended
//! specification with per-key case sensitivity and an optional row
//! limit.

use eyre::Result;

use crate::error::ErrorCode;
use crate::types::{Attribute, TupleSchema};

/// Per-key sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrder {
    Ascending,
    Descending,
}

impl ColumnOrder {
    pub fn is_descending(self) -> bool {
        matches!(self, ColumnOrder::Descending)
    }
}

/// Symbolic sort order: attribute names with directions, in key
/// precedence order.
#[derive(Debug, Clone, Default)]
pub struct SortOrder {
    keys: Vec<(String, ColumnOrder)>,
}

impl SortOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, order: ColumnOrder) -> Self {
        self.keys.push((name.into(), order));
        self
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Resolves attribute names against `schema`.
    pub fn bind(&self, schema: &TupleSchema) -> Result<BoundSortOrder> {
        if self.keys.is_empty() {
            crate::engine_bail!(
                ErrorCode::InvalidArgumentValue,
                "sort order needs at least one key"
            );
        }
        let mut keys = Vec::with_capacity(self.keys.len());
        for (name, order) in &self.keys {
            let position = schema.require_attribute_position(name)?;
            keys.push(BoundSortKey {
                position,
                order: *order,
                attribute: schema.attribute(position).clone(),
            });
        }
        Ok(BoundSortOrder { keys })
    }
}

/// One resolved sort key.
#[derive(Debug, Clone)]
pub struct BoundSortKey {
    position: usize,
    order: ColumnOrder,
    attribute: Attribute,
}

impl BoundSortKey {
    /// Position of the key column in the *source* schema.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn order(&self) -> ColumnOrder {
        self.order
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }
}

/// Sort order with key positions resolved against a schema.
#[derive(Debug, Clone)]
pub struct BoundSortOrder {
    keys: Vec<BoundSortKey>,
}

impl BoundSortOrder {
    /// Builds directly from positions, for callers that already resolved
    /// the schema (e.g. the extended sort's synthetic key columns).
    pub fn from_positions(
        schema: &TupleSchema,
        keys: &[(usize, ColumnOrder)],
    ) -> Result<Self> {
        if keys.is_empty() {
            crate::engine_bail!(
                ErrorCode::InvalidArgumentValue,
                "sort order needs at least one key"
            );
        }
        let mut bound = Vec::with_capacity(keys.len());
        for &(position, order) in keys {
            if position >= schema.attribute_count() {
                crate::engine_bail!(
                    ErrorCode::AttributeMissing,
                    "sort key position {} out of range for schema ({})",
                    position,
                    schema.human_readable()
                );
            }
            bound.push(BoundSortKey {
                position,
                order,
                attribute: schema.attribute(position).clone(),
            });
        }
        Ok(Self { keys: bound })
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn key(&self, index: usize) -> &BoundSortKey {
        &self.keys[index]
    }

    pub fn keys(&self) -> &[BoundSortKey] {
        &self.keys
    }
}

/// One key of an extended sort specification.
#[derive(Debug, Clone)]
pub struct ExtendedSortKey {
    pub name: String,
    pub order: ColumnOrder,
    pub case_sensitive: bool,
}

/// Sort keys with per-key case sensitivity and an optional row limit.
#[derive(Debug, Clone, Default)]
pub struct ExtendedSortSpecification {
    keys: Vec<ExtendedSortKey>,
    limit: Option<usize>,
}

impl ExtendedSortSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(
        mut self,
        name: impl Into<String>,
        order: ColumnOrder,
        case_sensitive: bool,
    ) -> Self {
        self.keys.push(ExtendedSortKey {
            name: name.into(),
            order,
            case_sensitive,
        });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn keys(&self) -> &[ExtendedSortKey] {
        &self.keys
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_code;
    use crate::types::DataType;

    fn schema() -> TupleSchema {
        TupleSchema::new(vec![
            Attribute::not_nullable("a", DataType::Int32),
            Attribute::nullable("b", DataType::String),
        ])
        .unwrap()
    }

    #[test]
    fn bind_resolves_positions() {
        let order = SortOrder::new()
            .add("b", ColumnOrder::Descending)
            .add("a", ColumnOrder::Ascending);
        let bound = order.bind(&schema()).unwrap();
        assert_eq!(bound.key_count(), 2);
        assert_eq!(bound.key(0).position(), 1);
        assert!(bound.key(0).order().is_descending());
        assert_eq!(bound.key(1).position(), 0);
    }

    #[test]
    fn unknown_key_is_a_bind_error() {
        let order = SortOrder::new().add("zzz", ColumnOrder::Ascending);
        let err = order.bind(&schema()).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::AttributeMissing));
    }

    #[test]
    fn empty_order_is_rejected() {
        let err = SortOrder::new().bind(&schema()).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidArgumentValue));
    }
}
