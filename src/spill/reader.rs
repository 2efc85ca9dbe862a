//! Spill run reader: a cursor over a memory-mapped spill file.
//!
//! The file's own schema header is authoritative; blocks are CRC
//! checked before decoding. When constructed with a [`TempPath`], the
//! underlying file is deleted as the reader drops, so a merge tears
//! down its runs on every exit path.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use memmap2::Mmap;
use tempfile::TempPath;
use zerocopy::FromBytes;

use crate::block::Block;
use crate::cursor::{Batch, Cursor, CursorCore, Interruption};
use crate::error::ErrorCode;
use crate::memory::BufferAllocator;
use crate::types::TupleSchema;

use super::codec::{decode_block_payload, decode_schema, BlockHeader, FileHeader, CRC32};

/// Cursor over one spilled sorted run.
pub struct SpillReader {
    mmap: Mmap,
    // Deletes the file when the reader drops.
    _temp: Option<TempPath>,
    schema: TupleSchema,
    allocator: Arc<dyn BufferAllocator>,
    offset: usize,
    block: Option<Block>,
    position: usize,
    core: CursorCore,
}

impl SpillReader {
    /// Opens a spill file for reading. `temp` ties the file's lifetime
    /// to the reader.
    pub fn open(
        path: &Path,
        temp: Option<TempPath>,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Result<Self> {
        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open spill file {:?}", path))?;
        let mmap = unsafe { Mmap::map(&file) }
            .wrap_err_with(|| format!("failed to mmap spill file {:?}", path))?;

        let header_len = std::mem::size_of::<FileHeader>();
        let Some(header_bytes) = mmap.get(..header_len) else {
            crate::engine_bail!(ErrorCode::SpillCorruption, "spill file shorter than header");
        };
        let header = FileHeader::read_from_bytes(header_bytes)
            .map_err(|_| crate::error::EngineError::new(ErrorCode::SpillCorruption, "unreadable header"))?;
        header.validate()?;
        let (schema, schema_len) = decode_schema(
            &mmap[header_len..],
            header.attribute_count() as usize,
        )?;

        Ok(Self {
            mmap,
            _temp: temp,
            schema,
            allocator,
            offset: header_len + schema_len,
            block: None,
            position: 0,
            core: CursorCore::new(),
        })
    }

    /// Decodes the next block into memory. Returns false at EOF.
    fn load_next_block(&mut self) -> Result<bool> {
        let header_len = std::mem::size_of::<BlockHeader>();
        if self.offset == self.mmap.len() {
            return Ok(false);
        }
        let Some(header_bytes) = self.mmap.get(self.offset..self.offset + header_len) else {
            crate::engine_bail!(ErrorCode::SpillCorruption, "truncated spill block header");
        };
        let header = BlockHeader::read_from_bytes(header_bytes)
            .map_err(|_| crate::error::EngineError::new(ErrorCode::SpillCorruption, "unreadable block header"))?;
        let payload_start = self.offset + header_len;
        let payload_end = payload_start + header.payload_len() as usize;
        let Some(payload) = self.mmap.get(payload_start..payload_end) else {
            crate::engine_bail!(ErrorCode::SpillCorruption, "truncated spill block payload");
        };
        if CRC32.checksum(payload) != header.checksum() {
            crate::engine_bail!(ErrorCode::SpillCorruption, "spill block checksum mismatch");
        }

        let rows = header.row_count() as usize;
        let mut block = Block::allocate(
            self.schema.clone(),
            rows,
            Arc::clone(&self.allocator),
        )?;
        decode_block_payload(payload, rows, &mut block)?;
        self.offset = payload_end;
        self.block = Some(block);
        self.position = 0;
        Ok(true)
    }
}

impl Cursor for SpillReader {
    fn schema(&self) -> &TupleSchema {
        &self.schema
    }

    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>> {
        self.core.check()?;
        if self.core.at_eos() {
            return Ok(Batch::Eos);
        }
        let exhausted = self
            .block
            .as_ref()
            .map(|b| self.position == b.row_count())
            .unwrap_or(true);
        if exhausted {
            let loaded = self.load_next_block();
            if !self.core.guard(loaded)? {
                self.core.set_eos();
                return Ok(Batch::Eos);
            }
        }
        let block = self.block.as_ref().expect("block loaded");
        let remaining = block.row_count() - self.position;
        let len = remaining.min(max_rows.max(1));
        let offset = self.position;
        self.position += len;
        Ok(Batch::Rows(block.view().window(offset, len)))
    }

    fn interruption(&self) -> Interruption {
        self.core.interruption()
    }
}
