//! # Extended Sort
//!
//! Sort driven by an [`ExtendedSortSpecification`]: per-key case
//! sensitivity and an optional row limit.
//!
//! Case-insensitive STRING keys are implemented by computing an
//! uppercased side column for each such key (with a synthetic, unique
//! name) above the child, rebinding the sort keys to the side columns,
//! and projecting the side columns away after the sort. A limit in the
//! specification layers a limit cursor above the whole thing.

use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use hashbrown::{HashMap, HashSet};

use crate::config::DEFAULT_ROW_COUNT;
use crate::cursor::{compute, limit, Cursor, Operation};
use crate::error::ErrorCode;
use crate::expr::{alias, attribute_at, bind_expression_tree, compound, named_attribute, to_upper};
use crate::memory::BufferAllocator;
use crate::projector::{BoundSingleSourceProjector, SingleSourceProjector};
use crate::types::{DataType, TupleSchema};

use super::cursor::bound_sort;
use super::order::{BoundSortOrder, ColumnOrder, ExtendedSortSpecification};

const UPPERCASE_ATTRIBUTE_PREFIX: &str = "tmp_uppercase_version_of_";

/// Picks a name starting from `base` that collides neither with
/// `schema` nor with `taken`.
fn create_unique_name(schema: &TupleSchema, taken: &HashSet<String>, base: String) -> String {
    if !schema.contains_attribute(&base) && !taken.contains(&base) {
        return base;
    }
    let mut counter = 2usize;
    loop {
        let candidate = format!("{}_{}", base, counter);
        if !schema.contains_attribute(&candidate) && !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Whether this key participates in the uppercase-side-column scheme.
fn is_case_insensitive_string_key(
    schema: &TupleSchema,
    name: &str,
    case_sensitive: bool,
) -> Result<bool> {
    let position = schema.require_attribute_position(name)?;
    Ok(!case_sensitive && schema.attribute(position).data_type() == DataType::String)
}

/// Builds an extended sort over an already-created child cursor.
pub fn bound_extended_sort(
    specification: &ExtendedSortSpecification,
    result_projector: Option<BoundSingleSourceProjector>,
    memory_quota: usize,
    temporary_directory_prefix: impl Into<PathBuf>,
    allocator: Arc<dyn BufferAllocator>,
    max_row_count: usize,
    child: Box<dyn Cursor>,
) -> Result<Box<dyn Cursor>> {
    if specification.keys().is_empty() {
        crate::engine_bail!(
            ErrorCode::InvalidArgumentValue,
            "extended sort specification has no keys"
        );
    }
    let child_schema = child.schema().clone();
    let initial_attribute_count = child_schema.attribute_count();

    // Reject duplicate keys, tracked separately per sensitivity class:
    // the same attribute may appear once case-sensitively and once
    // case-insensitively.
    let mut case_insensitive_keys: HashSet<String> = HashSet::new();
    let mut case_sensitive_keys: HashSet<String> = HashSet::new();
    for key in specification.keys() {
        if is_case_insensitive_string_key(&child_schema, &key.name, key.case_sensitive)? {
            if !case_insensitive_keys.insert(key.name.clone()) {
                crate::engine_bail!(
                    ErrorCode::InvalidArgumentValue,
                    "duplicate case insensitive key: {} column in schema ({})",
                    key.name,
                    child_schema.human_readable()
                );
            }
        } else if !case_sensitive_keys.insert(key.name.clone()) {
            crate::engine_bail!(
                ErrorCode::InvalidArgumentValue,
                "duplicate case sensitive key: {} column in schema ({})",
                key.name,
                child_schema.human_readable()
            );
        }
    }

    // Pass all original attributes through and append one uppercased
    // side column per case-insensitive STRING key.
    let mut compute_arguments = Vec::with_capacity(initial_attribute_count);
    for position in 0..initial_attribute_count {
        compute_arguments.push(attribute_at(position));
    }
    let mut uppercase_position: HashMap<String, usize> = HashMap::new();
    let mut synthetic_names: HashSet<String> = HashSet::new();
    for key in specification.keys() {
        if !is_case_insensitive_string_key(&child_schema, &key.name, key.case_sensitive)? {
            continue;
        }
        if uppercase_position.contains_key(&key.name) {
            continue;
        }
        let synthetic = create_unique_name(
            &child_schema,
            &synthetic_names,
            format!("{}{}", UPPERCASE_ATTRIBUTE_PREFIX, key.name),
        );
        synthetic_names.insert(synthetic.clone());
        uppercase_position.insert(key.name.clone(), compute_arguments.len());
        compute_arguments.push(alias(synthetic, to_upper(named_attribute(key.name.as_str()))));
    }

    let expression = compound(compute_arguments);
    let tree = bind_expression_tree(&*expression, &child_schema, &allocator, max_row_count)?;
    let computed = Box::new(compute(tree, child));
    let computed_schema = computed.schema().clone();

    // Sort keys, rebound to the side columns where applicable.
    let mut key_positions: Vec<(usize, ColumnOrder)> =
        Vec::with_capacity(specification.keys().len());
    for key in specification.keys() {
        let position = match uppercase_position.get(&key.name) {
            Some(&synthetic_position) => synthetic_position,
            None => child_schema.require_attribute_position(&key.name)?,
        };
        key_positions.push((position, key.order));
    }
    let sort_order = BoundSortOrder::from_positions(&computed_schema, &key_positions)?;

    // The final projector discards the synthetic columns. A provided
    // projector was bound against the child schema; re-express it on
    // the computed schema (a pure extension, so positions are stable).
    let final_projector = match result_projector {
        Some(provided) => {
            let mut rebound = BoundSingleSourceProjector::new(&computed_schema);
            for output in 0..provided.result_schema().attribute_count() {
                rebound.add_as(
                    provided.source_position(output),
                    provided.result_schema().attribute(output).name(),
                )?;
            }
            rebound
        }
        None => {
            let mut all_original = BoundSingleSourceProjector::new(&computed_schema);
            for position in 0..initial_attribute_count {
                all_original.add(position)?;
            }
            all_original
        }
    };

    let sorted = bound_sort(
        sort_order,
        Some(final_projector),
        memory_quota,
        temporary_directory_prefix,
        allocator,
        computed,
    )?;

    Ok(match specification.limit() {
        Some(count) => Box::new(limit(0, count, sorted)),
        None => sorted,
    })
}

/// Planning-time extended sort operator.
pub struct ExtendedSortOperation {
    specification: ExtendedSortSpecification,
    result_projector: Option<SingleSourceProjector>,
    memory_quota: usize,
    temporary_directory_prefix: PathBuf,
    allocator: Arc<dyn BufferAllocator>,
    child: Box<dyn Operation>,
}

impl Operation for ExtendedSortOperation {
    fn create_cursor(&self) -> Result<Box<dyn Cursor>> {
        let child = self.child.create_cursor()?;
        let projector = self
            .result_projector
            .as_ref()
            .map(|projector| projector.bind(child.schema()))
            .transpose()?;
        bound_extended_sort(
            &self.specification,
            projector,
            self.memory_quota,
            self.temporary_directory_prefix.clone(),
            Arc::clone(&self.allocator),
            DEFAULT_ROW_COUNT,
            child,
        )
    }
}

/// Extended sort with spill files in the system temp directory.
pub fn extended_sort(
    specification: ExtendedSortSpecification,
    result_projector: Option<SingleSourceProjector>,
    memory_quota: usize,
    allocator: Arc<dyn BufferAllocator>,
    child: Box<dyn Operation>,
) -> Box<dyn Operation> {
    Box::new(ExtendedSortOperation {
        specification,
        result_projector,
        memory_quota,
        temporary_directory_prefix: PathBuf::new(),
        allocator,
        child,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::cursor::{Batch, ScanBlockOperation};
    use crate::memory::TrackingAllocator;
    use crate::types::{Attribute, Datum};

    fn string_scan(values: &[&str]) -> (Box<dyn Operation>, Arc<dyn BufferAllocator>) {
        let schema =
            TupleSchema::new(vec![Attribute::not_nullable("name", DataType::String)]).unwrap();
        let alloc: Arc<dyn BufferAllocator> = Arc::new(TrackingAllocator::unlimited());
        let mut block = Block::allocate(schema, values.len(), alloc.clone()).unwrap();
        for v in values {
            block
                .append_datum_row(&[Datum::String(v.as_bytes().to_vec())])
                .unwrap();
        }
        (Box::new(ScanBlockOperation::new(Arc::new(block))), alloc)
    }

    fn drain_strings(cursor: &mut dyn Cursor) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match cursor.next(16).unwrap() {
                Batch::Rows(v) => {
                    for row in v.to_datum_rows() {
                        match &row[0] {
                            Datum::String(bytes) => {
                                out.push(String::from_utf8(bytes.clone()).unwrap())
                            }
                            other => panic!("expected string, got {:?}", other),
                        }
                    }
                }
                Batch::Eos => return out,
                Batch::WaitingOnBarrier => unreachable!(),
            }
        }
    }

    #[test]
    fn case_insensitive_sort_with_stable_ties() {
        let (scan, alloc) = string_scan(&["banana", "Apple", "cherry", "apple"]);
        let spec = ExtendedSortSpecification::new().add_key(
            "name",
            ColumnOrder::Ascending,
            false,
        );
        let operation = extended_sort(spec, None, 1 << 20, alloc, scan);
        let mut cursor = operation.create_cursor().unwrap();
        // The synthetic uppercase column is projected away.
        assert_eq!(cursor.schema().attribute_count(), 1);
        assert_eq!(
            drain_strings(cursor.as_mut()),
            vec!["Apple", "apple", "banana", "cherry"]
        );
    }

    #[test]
    fn case_sensitive_sort_is_bytewise() {
        let (scan, alloc) = string_scan(&["banana", "Apple", "cherry", "apple"]);
        let spec =
            ExtendedSortSpecification::new().add_key("name", ColumnOrder::Ascending, true);
        let operation = extended_sort(spec, None, 1 << 20, alloc, scan);
        let mut cursor = operation.create_cursor().unwrap();
        assert_eq!(
            drain_strings(cursor.as_mut()),
            vec!["Apple", "apple", "banana", "cherry"]
        );
    }

    #[test]
    fn limit_caps_the_output() {
        let (scan, alloc) = string_scan(&["d", "b", "a", "c"]);
        let spec = ExtendedSortSpecification::new()
            .add_key("name", ColumnOrder::Ascending, true)
            .with_limit(2);
        let operation = extended_sort(spec, None, 1 << 20, alloc, scan);
        let mut cursor = operation.create_cursor().unwrap();
        assert_eq!(drain_strings(cursor.as_mut()), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_keys_in_same_class_are_rejected() {
        let (scan, alloc) = string_scan(&["a"]);
        let spec = ExtendedSortSpecification::new()
            .add_key("name", ColumnOrder::Ascending, false)
            .add_key("name", ColumnOrder::Descending, false);
        let operation = extended_sort(spec, None, 1 << 20, alloc, scan);
        let err = match operation.create_cursor() {
            Ok(_) => panic!("expected create_cursor to fail"),
            Err(e) => e,
        };
        assert_eq!(
            crate::error::error_code(&err),
            Some(ErrorCode::InvalidArgumentValue)
        );
    }

    #[test]
    fn mixed_sensitivity_duplicates_are_permitted() {
        let (scan, alloc) = string_scan(&["b", "B", "a"]);
        let spec = ExtendedSortSpecification::new()
            .add_key("name", ColumnOrder::Ascending, false)
            .add_key("name", ColumnOrder::Ascending, true);
        let operation = extended_sort(spec, None, 1 << 20, alloc, scan);
        let mut cursor = operation.create_cursor().unwrap();
        // Case-insensitive groups {a} and {b, B}; within the second
        // group the case-sensitive key puts "B" first.
        assert_eq!(drain_strings(cursor.as_mut()), vec!["a", "B", "b"]);
    }
}
