//! Sort subsystem: ordering model, the column-progressive permutation
//! sort, external-memory sorters with spill, the run merger, and the
//! sort cursor/operation pair (plain and extended).

pub mod cursor;
pub mod extended;
pub mod key_sort;
pub mod merger;
pub mod order;
pub mod sorter;

pub use cursor::{bound_sort, sort, sort_with_temp_dir_prefix, SortOperation};
pub use extended::{bound_extended_sort, extended_sort, ExtendedSortOperation};
pub use key_sort::sort_permutation;
pub use merger::Merger;
pub use order::{
    BoundSortKey, BoundSortOrder, ColumnOrder, ExtendedSortKey, ExtendedSortSpecification,
    SortOrder,
};
pub use sorter::{BufferingSorter, UnbufferedSorter};
