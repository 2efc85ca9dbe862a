//! Spill run writer: sequential, buffered, synced on finish.

use std::fs::File;
use std::io::{BufWriter, Write};

use eyre::{Result, WrapErr};
use zerocopy::IntoBytes;

use crate::block::View;
use crate::types::TupleSchema;

use super::codec::{encode_block_payload, encode_schema, BlockHeader, FileHeader};

/// Writes a self-describing stream of sorted-run blocks.
pub struct SpillWriter {
    writer: BufWriter<File>,
    scratch: Vec<u8>,
}

impl SpillWriter {
    /// Starts a spill file on `file`, writing the header and schema.
    pub fn create(file: File, schema: &TupleSchema) -> Result<Self> {
        let mut writer = BufWriter::new(file);
        let header = FileHeader::new(schema.attribute_count() as u32);
        writer
            .write_all(header.as_bytes())
            .wrap_err("failed to write spill file header")?;
        let mut scratch = Vec::new();
        encode_schema(schema, &mut scratch);
        writer
            .write_all(&scratch)
            .wrap_err("failed to write spill schema")?;
        Ok(Self { writer, scratch })
    }

    /// Appends one block of rows.
    pub fn write_view(&mut self, view: &View<'_>) -> Result<()> {
        if view.row_count() == 0 {
            return Ok(());
        }
        self.scratch.clear();
        encode_block_payload(view, &mut self.scratch);
        let header = BlockHeader::new(view.row_count() as u32, &self.scratch);
        self.writer
            .write_all(header.as_bytes())
            .wrap_err("failed to write spill block header")?;
        self.writer
            .write_all(&self.scratch)
            .wrap_err("failed to write spill block payload")?;
        Ok(())
    }

    /// Flushes buffered data and syncs the file to disk.
    pub fn finish(self) -> Result<()> {
        let file = self
            .writer
            .into_inner()
            .wrap_err("failed to flush spill writer")?;
        file.sync_all().wrap_err("failed to sync spill file")?;
        Ok(())
    }
}
