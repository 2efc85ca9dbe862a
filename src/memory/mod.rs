//! Memory subsystem: quota-tracking buffer allocators, the soft-quota
//! bypass combinator, and the variable-length payload arena.

mod arena;
mod budget;

pub use arena::{Arena, BytesRef};
pub use budget::{BufferAllocator, MemoryLimit, SoftQuotaBypassAllocator, TrackingAllocator};
