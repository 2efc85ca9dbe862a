//! Attribute definitions: a named, typed, nullability-qualified column slot.

use std::fmt;

use super::DataType;

/// Whether a column may contain NULLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullability {
    Nullable,
    NotNullable,
}

impl Nullability {
    pub fn is_nullable(self) -> bool {
        matches!(self, Nullability::Nullable)
    }

    /// Disjunction: the result of combining values is nullable if either
    /// source is.
    pub fn or(self, other: Nullability) -> Nullability {
        if self.is_nullable() || other.is_nullable() {
            Nullability::Nullable
        } else {
            Nullability::NotNullable
        }
    }
}

/// A single schema slot. Attribute equality is by name only; a schema
/// guarantees name uniqueness.
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    data_type: DataType,
    nullability: Nullability,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType, nullability: Nullability) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullability,
        }
    }

    /// Shorthand for a nullable attribute.
    pub fn nullable(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, Nullability::Nullable)
    }

    /// Shorthand for a non-nullable attribute.
    pub fn not_nullable(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, Nullability::NotNullable)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    pub fn is_nullable(&self) -> bool {
        self.nullability.is_nullable()
    }

    pub fn with_name(&self, name: impl Into<String>) -> Attribute {
        Attribute::new(name, self.data_type, self.nullability)
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Attribute {}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)?;
        if self.is_nullable() {
            f.write_str(" NULLABLE")?;
        }
        Ok(())
    }
}
