//! # Tuple Schemas
//!
//! An ordered attribute list with unique names and O(1) lookup by name.
//! Schemas are value types: operators copy them freely at bind time and
//! treat them as immutable afterwards.

use eyre::Result;
use hashbrown::HashMap;

use crate::error::{EngineError, ErrorCode};

use super::Attribute;

/// Ordered sequence of uniquely-named attributes.
#[derive(Debug, Clone, Default)]
pub struct TupleSchema {
    attributes: Vec<Attribute>,
    by_name: HashMap<String, usize>,
}

impl TupleSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a schema from attributes, rejecting duplicate names.
    pub fn new(attributes: Vec<Attribute>) -> Result<Self> {
        let mut schema = Self::empty();
        for attribute in attributes {
            schema.add_attribute(attribute)?;
        }
        Ok(schema)
    }

    /// Appends an attribute; fails with a bind error on a duplicate name.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<()> {
        if self.by_name.contains_key(attribute.name()) {
            crate::engine_bail!(
                ErrorCode::AttributeDuplicate,
                "attribute '{}' already present in schema ({})",
                attribute.name(),
                self.human_readable()
            );
        }
        self.by_name
            .insert(attribute.name().to_string(), self.attributes.len());
        self.attributes.push(attribute);
        Ok(())
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute(&self, position: usize) -> &Attribute {
        &self.attributes[position]
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn lookup_attribute_position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn lookup_attribute(&self, name: &str) -> Option<&Attribute> {
        self.lookup_attribute_position(name)
            .map(|pos| &self.attributes[pos])
    }

    pub fn contains_attribute(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Position lookup that fails with an [`ErrorCode::AttributeMissing`]
    /// bind error naming the schema.
    pub fn require_attribute_position(&self, name: &str) -> Result<usize> {
        self.lookup_attribute_position(name).ok_or_else(|| {
            eyre::Report::new(EngineError::new(
                ErrorCode::AttributeMissing,
                format!(
                    "attribute '{}' not found in schema ({})",
                    name,
                    self.human_readable()
                ),
            ))
        })
    }

    /// Concatenation of two schemas; fails if names collide.
    pub fn try_concat(&self, other: &TupleSchema) -> Result<TupleSchema> {
        let mut merged = self.clone();
        for attribute in &other.attributes {
            merged.add_attribute(attribute.clone())?;
        }
        Ok(merged)
    }

    /// Compact single-line rendering used in error messages.
    pub fn human_readable(&self) -> String {
        let mut out = String::new();
        for (i, attribute) in self.attributes.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&attribute.to_string());
        }
        out
    }
}

impl PartialEq for TupleSchema {
    fn eq(&self, other: &Self) -> bool {
        self.attributes.len() == other.attributes.len()
            && self
                .attributes
                .iter()
                .zip(&other.attributes)
                .all(|(a, b)| {
                    a.name() == b.name()
                        && a.data_type() == b.data_type()
                        && a.nullability() == b.nullability()
                })
    }
}

impl Eq for TupleSchema {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_code;
    use crate::types::{DataType, Nullability};

    fn sample() -> TupleSchema {
        TupleSchema::new(vec![
            Attribute::not_nullable("id", DataType::Int64),
            Attribute::nullable("name", DataType::String),
        ])
        .unwrap()
    }

    #[test]
    fn lookup_is_exact() {
        let schema = sample();
        assert_eq!(schema.lookup_attribute_position("id"), Some(0));
        assert_eq!(schema.lookup_attribute_position("name"), Some(1));
        assert_eq!(schema.lookup_attribute_position("Name"), None);
        assert_eq!(schema.lookup_attribute_position("missing"), None);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = TupleSchema::new(vec![
            Attribute::not_nullable("a", DataType::Int32),
            Attribute::nullable("a", DataType::Double),
        ])
        .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::AttributeDuplicate));
    }

    #[test]
    fn missing_attribute_is_a_bind_error() {
        let schema = sample();
        let err = schema.require_attribute_position("nope").unwrap_err();
        let code = error_code(&err).unwrap();
        assert_eq!(code, ErrorCode::AttributeMissing);
        assert!(code.is_bind_error());
    }

    #[test]
    fn concat_preserves_order() {
        let left = sample();
        let right = TupleSchema::new(vec![Attribute::new(
            "score",
            DataType::Double,
            Nullability::Nullable,
        )])
        .unwrap();
        let merged = left.try_concat(&right).unwrap();
        assert_eq!(merged.attribute_count(), 3);
        assert_eq!(merged.attribute(2).name(), "score");
        assert!(left.try_concat(&left).is_err());
    }
}
