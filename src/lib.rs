//! # vectra - Columnar Vectorized Query Execution
//!
//! vectra is a library for executing relational operator pipelines
//! over columnar data: it consumes blocks of columns, applies
//! operators batch by batch, and returns blocks of results. This
//! Rust implementation prioritizes:
//!
//! - **Zero-copy views**: operators exchange borrowed windows over
//!   columnar storage; rows are copied only at materialization points
//! - **Monomorphized inner loops**: sort comparators and expression
//!   kernels are instantiated per data type, never dispatched
//!   per row
//! - **Bounded memory**: all buffering goes through quota-tracking
//!   allocators; the sort spills sorted runs to disk under pressure
//!
//! ## Quick Start
//!
//! ```ignore
//! use vectra::prelude::*;
//!
//! let operation = sort(
//!     SortOrder::new().add("price", ColumnOrder::Descending),
//!     None,
//!     64 << 20, // memory quota before spilling
//!     allocator,
//!     scan,
//! );
//! let mut cursor = operation.create_cursor()?;
//! while let Batch::Rows(view) = cursor.next(1024)? {
//!     consume(view);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │   Operations (Sort, Compute, Limit)   │
//! ├───────────────────────────────────────┤
//! │   Cursors (pull-based view pipeline)  │
//! ├──────────────────┬────────────────────┤
//! │ Bound expressions│  Projectors        │
//! ├──────────────────┴────────────────────┤
//! │   Blocks / Views / Tables / Columns   │
//! ├───────────────────────────────────────┤
//! │ Allocators & Arenas │ Spill files     │
//! └───────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: data type tags, attributes, tuple schemas
//! - [`memory`]: quota-tracking allocators and payload arenas
//! - [`block`]: columns, views, blocks, tables, permutations
//! - [`cursor`]: the pull protocol and composite operators
//! - [`expr`]: bound expression evaluation with skip vectors
//! - [`projector`]: rename/reorder/select transforms
//! - [`sort`]: column-progressive sort with external-memory spill
//! - [`spill`]: the self-describing spill file format
//! - [`hash`]: stable byte-buffer hashing
//!
//! Execution is single-threaded per cursor tree; independent trees may
//! run in parallel. The only cross-thread surface is the
//! [`cursor::Interruption`] cancellation handle.

#[macro_use]
mod macros;

pub mod block;
pub mod config;
pub mod cursor;
pub mod error;
pub mod expr;
pub mod hash;
pub mod memory;
pub mod projector;
pub mod sort;
pub mod spill;
pub mod types;

/// The engine's working vocabulary in one import.
pub mod prelude {
    pub use crate::block::{Block, Permutation, Table, View};
    pub use crate::cursor::{Batch, Cursor, Interruption, Operation, ScanBlockOperation};
    pub use crate::error::{error_code, EngineError, ErrorCode};
    pub use crate::memory::{BufferAllocator, TrackingAllocator};
    pub use crate::sort::{
        extended_sort, sort, sort_with_temp_dir_prefix, ColumnOrder,
        ExtendedSortSpecification, SortOrder,
    };
    pub use crate::types::{Attribute, DataType, Datum, Nullability, TupleSchema};
}
