//! # Internal Macros
//!
//! Helper for the zerocopy little-endian header structs used by the
//! spill file format.
//!
//! ## le_u32_getters!
//!
//! Generates getter methods for struct fields stored as
//! `zerocopy::little_endian::U32` — the only wrapper width the spill
//! headers use.
//!
//! ```ignore
//! #[repr(C)]
//! struct BlockHeader {
//!     row_count: U32,
//!     payload_len: U32,
//! }
//!
//! impl BlockHeader {
//!     le_u32_getters! {
//!         row_count,
//!         payload_len,
//!     }
//! }
//!
//! // Generates:
//! // pub fn row_count(&self) -> u32 { self.row_count.get() }
//! // pub fn payload_len(&self) -> u32 { self.payload_len.get() }
//! ```

/// Generates `fn field(&self) -> u32` getters for little-endian U32
/// fields.
#[macro_export]
macro_rules! le_u32_getters {
    ($($field:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }
        )*
    };
}
