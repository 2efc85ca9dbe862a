//! Spill file subsystem: the self-describing block codec, the run
//! writer, and the memory-mapped reader cursor.

pub mod codec;
pub mod reader;
pub mod writer;

pub use reader::SpillReader;
pub use writer::SpillWriter;
