//! # Projectors
//!
//! Rename/reorder/select transforms over schemas and views. A symbolic
//! projector describes the selection; binding it against a concrete
//! schema yields a bound projector holding the output-position to
//! source-position map. Applying a bound projector to a view is a
//! constant-time column re-selection; no data moves.

use eyre::Result;

use crate::block::View;
use crate::error::ErrorCode;
use crate::types::TupleSchema;

/// Symbolic single-input projector.
#[derive(Debug, Clone)]
pub enum SingleSourceProjector {
    /// Every attribute, in order.
    AllAttributes,
    /// Attributes by source position.
    ByPositions(Vec<usize>),
    /// Attributes by name.
    ByNames(Vec<String>),
    /// A projection with the selected attributes renamed.
    Renamed {
        inner: Box<SingleSourceProjector>,
        names: Vec<String>,
    },
}

impl SingleSourceProjector {
    /// Resolves against `schema`, producing the positional mapping.
    pub fn bind(&self, schema: &TupleSchema) -> Result<BoundSingleSourceProjector> {
        match self {
            SingleSourceProjector::AllAttributes => {
                let mut bound = BoundSingleSourceProjector::new(schema);
                for position in 0..schema.attribute_count() {
                    bound.add(position)?;
                }
                Ok(bound)
            }
            SingleSourceProjector::ByPositions(positions) => {
                let mut bound = BoundSingleSourceProjector::new(schema);
                for &position in positions {
                    if position >= schema.attribute_count() {
                        crate::engine_bail!(
                            ErrorCode::AttributeMissing,
                            "attribute position {} out of range for schema ({})",
                            position,
                            schema.human_readable()
                        );
                    }
                    bound.add(position)?;
                }
                Ok(bound)
            }
            SingleSourceProjector::ByNames(names) => {
                let mut bound = BoundSingleSourceProjector::new(schema);
                for name in names {
                    let position = schema.require_attribute_position(name)?;
                    bound.add(position)?;
                }
                Ok(bound)
            }
            SingleSourceProjector::Renamed { inner, names } => {
                let positions = inner.bind(schema)?;
                if names.len() != positions.result_schema().attribute_count() {
                    crate::engine_bail!(
                        ErrorCode::InvalidArgumentValue,
                        "rename list has {} names for {} projected attributes",
                        names.len(),
                        positions.result_schema().attribute_count()
                    );
                }
                let mut bound = BoundSingleSourceProjector::new(schema);
                for (output, name) in names.iter().enumerate() {
                    bound.add_as(positions.source_position(output), name.clone())?;
                }
                Ok(bound)
            }
        }
    }
}

/// Shorthand for the identity projector.
pub fn project_all_attributes() -> SingleSourceProjector {
    SingleSourceProjector::AllAttributes
}

/// Shorthand for projection by attribute name.
pub fn project_named_attributes(names: impl IntoIterator<Item = impl Into<String>>) -> SingleSourceProjector {
    SingleSourceProjector::ByNames(names.into_iter().map(Into::into).collect())
}

/// Bound single-input projector: output position -> source position,
/// with the result schema precomputed.
#[derive(Debug, Clone)]
pub struct BoundSingleSourceProjector {
    source_schema: TupleSchema,
    result_schema: TupleSchema,
    mapping: Vec<usize>,
}

impl BoundSingleSourceProjector {
    /// An empty projection over `source_schema`; attributes are added
    /// with [`add`](Self::add) / [`add_as`](Self::add_as).
    pub fn new(source_schema: &TupleSchema) -> Self {
        Self {
            source_schema: source_schema.clone(),
            result_schema: TupleSchema::empty(),
            mapping: Vec::new(),
        }
    }

    /// Projects the source attribute at `position` under its own name.
    pub fn add(&mut self, position: usize) -> Result<()> {
        let attribute = self.source_schema.attribute(position).clone();
        self.result_schema.add_attribute(attribute)?;
        self.mapping.push(position);
        Ok(())
    }

    /// Projects the source attribute at `position` under a new name.
    pub fn add_as(&mut self, position: usize, name: impl Into<String>) -> Result<()> {
        let attribute = self.source_schema.attribute(position).with_name(name);
        self.result_schema.add_attribute(attribute)?;
        self.mapping.push(position);
        Ok(())
    }

    pub fn source_schema(&self) -> &TupleSchema {
        &self.source_schema
    }

    pub fn result_schema(&self) -> &TupleSchema {
        &self.result_schema
    }

    pub fn source_position(&self, output_position: usize) -> usize {
        self.mapping[output_position]
    }

    /// Applies the projection; the result borrows the same storage.
    pub fn project_view<'a>(&'a self, view: &View<'a>) -> View<'a> {
        debug_assert_eq!(
            view.column_count(),
            self.source_schema.attribute_count(),
            "projected view does not match the bound source schema"
        );
        view.select(&self.result_schema, &self.mapping)
    }
}

/// Symbolic multi-input projector: attributes drawn positionally from
/// a list of source schemas.
#[derive(Debug, Clone, Default)]
pub struct MultiSourceProjector {
    selections: Vec<(usize, SingleSourceProjector)>,
}

impl MultiSourceProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a projection of source `source_index`.
    pub fn add(mut self, source_index: usize, projector: SingleSourceProjector) -> Self {
        self.selections.push((source_index, projector));
        self
    }

    pub fn bind(&self, schemas: &[&TupleSchema]) -> Result<BoundMultiSourceProjector> {
        let mut result_schema = TupleSchema::empty();
        let mut mapping = Vec::new();
        for (source_index, projector) in &self.selections {
            let Some(schema) = schemas.get(*source_index) else {
                crate::engine_bail!(
                    ErrorCode::InvalidArgumentValue,
                    "source index {} out of range ({} sources)",
                    source_index,
                    schemas.len()
                );
            };
            let bound = projector.bind(schema)?;
            for output in 0..bound.result_schema().attribute_count() {
                result_schema.add_attribute(bound.result_schema().attribute(output).clone())?;
                mapping.push((*source_index, bound.source_position(output)));
            }
        }
        Ok(BoundMultiSourceProjector {
            result_schema,
            mapping,
        })
    }
}

/// Bound multi-input projector.
#[derive(Debug, Clone)]
pub struct BoundMultiSourceProjector {
    result_schema: TupleSchema,
    mapping: Vec<(usize, usize)>,
}

impl BoundMultiSourceProjector {
    pub fn result_schema(&self) -> &TupleSchema {
        &self.result_schema
    }

    /// Projects columns from several same-length views into one view.
    pub fn project_views<'a>(&'a self, views: &[&View<'a>]) -> View<'a> {
        debug_assert!(!views.is_empty());
        let row_count = views[0].row_count();
        debug_assert!(views.iter().all(|v| v.row_count() == row_count));
        View::new(
            &self.result_schema,
            self.mapping
                .iter()
                .map(|&(source, position)| *views[source].column(position)),
            row_count,
        )
    }
}
