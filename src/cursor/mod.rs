//! # Cursor Protocol
//!
//! Cursors are the pull-based iterators of the engine. A `next` call
//! returns up to `max_rows` rows as a borrowed [`View`], or one of two
//! signals: end-of-stream (sticky) or waiting-on-barrier (retriable,
//! legal only where the topology supports it). Failures travel as
//! `Err` and poison the cursor: every later call fails again without
//! touching the upstream.
//!
//! ## Ownership
//!
//! - A cursor owns its child cursor exclusively; cursor trees are
//!   single-threaded and driven by one caller
//! - The producer owns a returned view's storage until the next call;
//!   the borrow checker enforces exactly this contract
//! - [`Interruption`] handles are the one cross-thread surface:
//!   cloneable flags that make the next `next` fail with INTERRUPTED
//!
//! ## Operations
//!
//! An [`Operation`] is the planning-time constructor of a cursor. It
//! owns its child operations and is reusable: every `create_cursor`
//! builds a fresh tree.

pub mod compute;
pub mod limit;
pub mod merge_union_all;
pub mod project;
pub mod scan;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::Result;

use crate::block::View;
use crate::error::ErrorCode;
use crate::types::TupleSchema;

pub use compute::{compute, ComputeCursor};
pub use limit::{limit, LimitCursor};
pub use merge_union_all::{merge_union_all, MergeUnionAllCursor};
pub use project::{project, ProjectCursor};
pub use scan::{scan_view_with_selection, BlockCursor, ScanBlockOperation, ViewCursor};

/// One pull's worth of output.
#[derive(Debug)]
pub enum Batch<'a> {
    /// Up to `max_rows` rows, owned by the producer until the next call.
    Rows(View<'a>),
    /// No more rows, ever. Sticky.
    Eos,
    /// No progress possible right now; retry later without data loss.
    WaitingOnBarrier,
}

impl<'a> Batch<'a> {
    pub fn is_eos(&self) -> bool {
        matches!(self, Batch::Eos)
    }
}

/// Cloneable cancellation handle, safe to trigger from any thread.
#[derive(Debug, Clone, Default)]
pub struct Interruption {
    flag: Arc<AtomicBool>,
}

impl Interruption {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; the owning cursor's next `next` fails
    /// with INTERRUPTED and releases its scoped resources.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Pull-based iterator over successive views.
pub trait Cursor {
    /// Schema of every view this cursor returns.
    fn schema(&self) -> &TupleSchema;

    /// Pulls the next batch of at most `max_rows` rows.
    fn next(&mut self, max_rows: usize) -> Result<Batch<'_>>;

    /// Whether [`Batch::WaitingOnBarrier`] can legally appear.
    fn is_waiting_on_barrier_supported(&self) -> bool {
        false
    }

    /// The cancellation handle shared along this cursor's spine.
    fn interruption(&self) -> Interruption;

    /// Visits direct children, e.g. for diagnostics.
    fn apply_to_children(&mut self, _visit: &mut dyn FnMut(&mut dyn Cursor)) {}
}

/// Planning-time cursor constructor. Owns its children; every call
/// builds an independent cursor tree.
pub trait Operation {
    fn create_cursor(&self) -> Result<Box<dyn Cursor>>;
}

/// Shared per-cursor bookkeeping: interruption, poisoning, sticky EOS.
///
/// The intended call pattern at the top of every `next`:
///
/// ```ignore
/// self.core.check()?;
/// if self.core.at_eos() { return Ok(Batch::Eos); }
/// ```
///
/// and `core.fail(..)` / `core.guard(..)` on every failing edge.
#[derive(Debug)]
pub(crate) struct CursorCore {
    interruption: Interruption,
    failed: Option<ErrorCode>,
    eos: bool,
}

impl CursorCore {
    /// Fresh state with its own interruption flag (leaf cursors).
    pub fn new() -> Self {
        Self::with_interruption(Interruption::new())
    }

    /// Adopts an existing flag so an interrupt reaches the whole spine
    /// (wrapper cursors adopt their child's).
    pub fn with_interruption(interruption: Interruption) -> Self {
        Self {
            interruption,
            failed: None,
            eos: false,
        }
    }

    pub fn interruption(&self) -> Interruption {
        self.interruption.clone()
    }

    /// Fails on a poisoned cursor or a pending interrupt.
    pub fn check(&mut self) -> Result<()> {
        if let Some(code) = self.failed {
            crate::engine_bail!(code, "cursor already failed; no further calls permitted");
        }
        if self.interruption.is_interrupted() {
            self.failed = Some(ErrorCode::Interrupted);
            crate::engine_bail!(ErrorCode::Interrupted, "cursor tree interrupted");
        }
        Ok(())
    }

    pub fn at_eos(&self) -> bool {
        self.eos
    }

    pub fn set_eos(&mut self) {
        self.eos = true;
    }

    /// Marks the cursor poisoned, preserving the failure class when the
    /// error carries one. Calls after a failure are a caller contract
    /// violation, hence the fallback code.
    pub fn poison(&mut self, report: &eyre::Report) {
        self.failed =
            Some(crate::error::error_code(report).unwrap_or(ErrorCode::InvalidArgumentValue));
    }

    /// Propagates a child failure, poisoning this cursor on the way.
    pub fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(report) = &result {
            self.poison(report);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_is_shared_through_clones() {
        let handle = Interruption::new();
        let observer = handle.clone();
        assert!(!observer.is_interrupted());
        handle.interrupt();
        assert!(observer.is_interrupted());
    }

    #[test]
    fn core_poisons_on_interrupt() {
        let mut core = CursorCore::new();
        core.check().unwrap();
        core.interruption().interrupt();
        let err = core.check().unwrap_err();
        assert_eq!(
            crate::error::error_code(&err),
            Some(ErrorCode::Interrupted)
        );
        // Stays poisoned even without the flag.
        let err = core.check().unwrap_err();
        assert_eq!(
            crate::error::error_code(&err),
            Some(ErrorCode::Interrupted)
        );
    }
}
