//! # Engine Configuration Constants
//!
//! Central location for tunables whose values depend on each other.
//! Constants that interact are documented together so a change to one
//! prompts a review of the others.
//!
//! ```text
//! DEFAULT_ROW_COUNT (1024)
//!       │
//!       └─> Batch size for cursor pulls and spill blocks. Expression
//!           trees pre-allocate output blocks of this many rows, so the
//!           per-expression memory cost scales linearly with it.
//!
//! INITIAL_TABLE_ROW_CAPACITY (16)
//!       │
//!       └─> Sort materialization tables start here and double. The
//!           BufferingSorter halves its memory quota to absorb the
//!           transient 2x occupancy of the doubling growth policy.
//!
//! DEFAULT_BUDGET_PERCENT (25) / MIN_BUDGET_FLOOR (16 MiB)
//!       │
//!       └─> TrackingAllocator::auto_detect soft quota = 25% of
//!           physical RAM, never below the floor. Hard quota = 2x soft.
//! ```

/// Rows per batch requested from child cursors and written per spill block.
pub const DEFAULT_ROW_COUNT: usize = 1024;

/// Starting row capacity of a sort materialization table.
pub const INITIAL_TABLE_ROW_CAPACITY: usize = 16;

/// Fraction of physical memory claimed by `TrackingAllocator::auto_detect`.
pub const DEFAULT_BUDGET_PERCENT: usize = 25;

/// Lower bound for an auto-detected soft quota.
pub const MIN_BUDGET_FLOOR: usize = 16 * 1024 * 1024;

/// Magic bytes at the start of every spill file.
pub const SPILL_MAGIC: [u8; 4] = *b"VXSP";

/// Version of the spill file layout.
pub const SPILL_FORMAT_VERSION: u32 = 1;

const _: () = assert!(INITIAL_TABLE_ROW_CAPACITY > 0);
const _: () = assert!(DEFAULT_ROW_COUNT > 0);
const _: () = assert!(DEFAULT_BUDGET_PERCENT > 0 && DEFAULT_BUDGET_PERCENT <= 100);
