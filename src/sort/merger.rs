//! # Run Merger
//!
//! Persists sorted runs to temporary spill files and, at the end,
//! merges them (plus an optional in-memory tail run) into one sorted
//! cursor. Every run file is tied to a `TempPath`, so teardown deletes
//! the files on all exit paths, including failures mid-merge.

use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use tempfile::TempPath;
use tracing::debug;

use crate::config::DEFAULT_ROW_COUNT;
use crate::cursor::{merge_union_all, Batch, Cursor};
use crate::error::{EngineError, ErrorCode};
use crate::memory::BufferAllocator;
use crate::spill::{SpillReader, SpillWriter};
use crate::types::TupleSchema;

use super::order::BoundSortOrder;

/// Collects sorted runs as temp files; merges on demand.
pub struct Merger {
    schema: TupleSchema,
    temporary_directory_prefix: PathBuf,
    allocator: Arc<dyn BufferAllocator>,
    runs: Vec<TempPath>,
}

impl Merger {
    /// `temporary_directory_prefix` is where spill files are created;
    /// an empty path means the system temp directory.
    pub fn new(
        schema: TupleSchema,
        temporary_directory_prefix: impl Into<PathBuf>,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Self {
        Self {
            schema,
            temporary_directory_prefix: temporary_directory_prefix.into(),
            allocator,
            runs: Vec::new(),
        }
    }

    pub fn empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Drains `cursor` (which must already be sorted) into a fresh
    /// temp file. A barrier from the cursor is fatal: runs are written
    /// synchronously and there is no partial-run resume.
    pub fn add_sorted(&mut self, cursor: &mut dyn Cursor) -> Result<()> {
        let directory = if self.temporary_directory_prefix.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            self.temporary_directory_prefix.clone()
        };
        let named = tempfile::Builder::new()
            .prefix("sort-run-")
            .suffix(".spill")
            .tempfile_in(&directory)
            .map_err(|e| {
                EngineError::new(
                    ErrorCode::TempFileCreationError,
                    format!("couldn't create temporary file in {:?}: {}", directory, e),
                )
            })?;
        let (file, temp_path) = named.into_parts();

        let mut writer = SpillWriter::create(file, &self.schema)?;
        loop {
            match cursor.next(DEFAULT_ROW_COUNT)? {
                Batch::Rows(view) => writer.write_view(&view)?,
                Batch::Eos => break,
                Batch::WaitingOnBarrier => {
                    crate::engine_bail!(
                        ErrorCode::NotImplemented,
                        "merger doesn't handle WAITING_ON_BARRIER while writing a run"
                    );
                }
            }
        }
        writer.finish()?;
        self.runs.push(temp_path);
        debug!(runs = self.runs.len(), "sorted run spilled to disk");
        Ok(())
    }

    /// Opens every run as a cursor and merges them, optionally with an
    /// additional sorted cursor as the last input. Consumes the merger;
    /// run files now belong to the merged cursor and are deleted when
    /// it drops.
    pub fn merge(
        self,
        sort_order: &BoundSortOrder,
        additional: Option<Box<dyn Cursor>>,
    ) -> Result<Box<dyn Cursor>> {
        let run_count = self.runs.len();
        let mut inputs: Vec<Box<dyn Cursor>> = Vec::with_capacity(run_count + 1);
        for temp_path in self.runs {
            let path = temp_path.to_path_buf();
            let reader = SpillReader::open(&path, Some(temp_path), Arc::clone(&self.allocator))?;
            inputs.push(Box::new(reader));
        }
        if let Some(cursor) = additional {
            inputs.push(cursor);
        }
        debug!(inputs = inputs.len(), spilled = run_count, "merging sorted runs");
        let merged = merge_union_all(sort_order.clone(), inputs, &self.allocator)?;
        Ok(Box::new(merged))
    }
}
