//! # Memory Budget Accounting
//!
//! This module implements byte-level memory accounting with a soft and a
//! hard ceiling, and the allocator combinators the sort pipeline stacks
//! on top of it.
//!
//! ## Design Principles
//!
//! 1. **Soft vs hard**: reservations within the soft quota always
//!    succeed (resources permitting); between soft and hard they succeed
//!    only through an explicit hard-path request; beyond hard they fail
//! 2. **Combinators, not globals**: quotas compose by wrapping a parent
//!    allocator; nothing is process-global
//! 3. **Thread safety**: counters are atomics so allocators can be
//!    shared across independent cursor trees
//! 4. **Best-effort accounting**: the tracked number is the reservation,
//!    not the malloc'd byte count; callers reserve before they allocate
//!
//! ## The Sort Allocator Stack
//!
//! ```text
//! TrackingAllocator (engine-wide soft/hard)
//!        │
//! SoftQuotaBypassAllocator (+quota/4 private headroom)
//!        │
//! MemoryLimit (quota/2, soft)      <- sort materialization table
//! ```
//!
//! The bypass layer lets the sort table keep growing when sibling
//! operators have consumed the engine's soft quota; the limit layer
//! caps the table itself. The halved quota absorbs the table's doubling
//! growth policy, which transiently occupies up to twice its held data.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sysinfo::System;

use crate::config::{DEFAULT_BUDGET_PERCENT, MIN_BUDGET_FLOOR};

/// Byte-accounting capability with a soft (preferred) and a hard
/// (absolute) ceiling.
///
/// `try_reserve` is the soft path used by ordinary operators.
/// `try_reserve_hard` is used by components that were granted explicit
/// headroom (see [`SoftQuotaBypassAllocator`]). Every successful
/// reservation must eventually be returned through `release`.
pub trait BufferAllocator: Send + Sync + std::fmt::Debug {
    /// Reserves within the soft quota. Returns false without side
    /// effects when the reservation does not fit.
    fn try_reserve(&self, bytes: usize) -> bool;

    /// Reserves within the hard quota, ignoring the soft ceiling.
    fn try_reserve_hard(&self, bytes: usize) -> bool;

    /// Returns previously reserved bytes.
    fn release(&self, bytes: usize);

    /// Bytes still reservable through the soft path.
    fn soft_remaining(&self) -> usize;

    /// Bytes still reservable through the hard path.
    fn hard_remaining(&self) -> usize;

    /// Bytes currently reserved through this allocator.
    fn used(&self) -> usize;
}

/// Root allocator with atomic usage tracking.
#[derive(Debug)]
pub struct TrackingAllocator {
    soft_quota: usize,
    hard_quota: usize,
    used: AtomicUsize,
}

impl TrackingAllocator {
    pub fn with_limits(soft_quota: usize, hard_quota: usize) -> Self {
        assert!(soft_quota <= hard_quota, "soft quota above hard quota");
        Self {
            soft_quota,
            hard_quota,
            used: AtomicUsize::new(0),
        }
    }

    /// Soft quota = a fraction of physical memory (floored); hard quota
    /// twice that.
    pub fn auto_detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory() as usize;
        let soft = ((total * DEFAULT_BUDGET_PERCENT) / 100).max(MIN_BUDGET_FLOOR);
        Self::with_limits(soft, soft.saturating_mul(2))
    }

    /// No ceilings; the default for tests and unconstrained pipelines.
    pub fn unlimited() -> Self {
        Self::with_limits(usize::MAX / 2, usize::MAX / 2)
    }

    fn try_reserve_below(&self, bytes: usize, ceiling: usize) -> bool {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let Some(next) = current.checked_add(bytes) else {
                return false;
            };
            if next > ceiling {
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

impl BufferAllocator for TrackingAllocator {
    fn try_reserve(&self, bytes: usize) -> bool {
        self.try_reserve_below(bytes, self.soft_quota)
    }

    fn try_reserve_hard(&self, bytes: usize) -> bool {
        self.try_reserve_below(bytes, self.hard_quota)
    }

    fn release(&self, bytes: usize) {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(bytes);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    fn soft_remaining(&self) -> usize {
        self.soft_quota.saturating_sub(self.used())
    }

    fn hard_remaining(&self) -> usize {
        self.hard_quota.saturating_sub(self.used())
    }

    fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

/// Imposes an additional quota on top of a parent allocator and tracks
/// usage flowing through it.
///
/// With `enforced` set, the quota is a hard ceiling for both paths;
/// otherwise it only bounds the soft path, and hard-path requests fall
/// through to the parent.
#[derive(Debug, Clone)]
pub struct MemoryLimit {
    quota: usize,
    enforced: bool,
    used: Arc<AtomicUsize>,
    parent: Arc<dyn BufferAllocator>,
}

impl MemoryLimit {
    pub fn new(quota: usize, enforced: bool, parent: Arc<dyn BufferAllocator>) -> Self {
        Self {
            quota,
            enforced,
            used: Arc::new(AtomicUsize::new(0)),
            parent,
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Bytes available before this limit's own quota is reached,
    /// regardless of the parent.
    pub fn own_remaining(&self) -> usize {
        self.quota.saturating_sub(self.used())
    }

    fn try_claim(&self, bytes: usize, bounded: bool) -> bool {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let Some(next) = current.checked_add(bytes) else {
                return false;
            };
            if bounded && next > self.quota {
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    fn unclaim(&self, bytes: usize) {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(bytes);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

impl BufferAllocator for MemoryLimit {
    fn try_reserve(&self, bytes: usize) -> bool {
        if !self.try_claim(bytes, true) {
            return false;
        }
        if self.parent.try_reserve(bytes) {
            true
        } else {
            self.unclaim(bytes);
            false
        }
    }

    fn try_reserve_hard(&self, bytes: usize) -> bool {
        if !self.try_claim(bytes, self.enforced) {
            return false;
        }
        if self.parent.try_reserve_hard(bytes) {
            true
        } else {
            self.unclaim(bytes);
            false
        }
    }

    fn release(&self, bytes: usize) {
        self.unclaim(bytes);
        self.parent.release(bytes);
    }

    fn soft_remaining(&self) -> usize {
        self.own_remaining().min(self.parent.soft_remaining())
    }

    fn hard_remaining(&self) -> usize {
        let parent = self.parent.hard_remaining();
        if self.enforced {
            self.own_remaining().min(parent)
        } else {
            parent
        }
    }

    fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

/// Grants a fixed amount of soft-quota headroom on top of a parent
/// allocator, without ever exceeding the parent's hard quota.
///
/// Soft-path reservations first try the parent's soft path; once that
/// is exhausted, up to `bypass_bytes` are served through the parent's
/// hard path. Intended for a single designated consumer; the release
/// accounting assumes bypassed bytes are returned before the consumer
/// goes idle.
#[derive(Debug, Clone)]
pub struct SoftQuotaBypassAllocator {
    parent: Arc<dyn BufferAllocator>,
    bypass_bytes: usize,
    bypass_used: Arc<AtomicUsize>,
}

impl SoftQuotaBypassAllocator {
    pub fn new(parent: Arc<dyn BufferAllocator>, bypass_bytes: usize) -> Self {
        Self {
            parent,
            bypass_bytes,
            bypass_used: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn bypass_remaining(&self) -> usize {
        self.bypass_bytes
            .saturating_sub(self.bypass_used.load(Ordering::Acquire))
    }

    fn try_claim_bypass(&self, bytes: usize) -> bool {
        let mut current = self.bypass_used.load(Ordering::Acquire);
        loop {
            let Some(next) = current.checked_add(bytes) else {
                return false;
            };
            if next > self.bypass_bytes {
                return false;
            }
            match self.bypass_used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

impl BufferAllocator for SoftQuotaBypassAllocator {
    fn try_reserve(&self, bytes: usize) -> bool {
        if self.parent.try_reserve(bytes) {
            return true;
        }
        if !self.try_claim_bypass(bytes) {
            return false;
        }
        if self.parent.try_reserve_hard(bytes) {
            true
        } else {
            let mut current = self.bypass_used.load(Ordering::Acquire);
            loop {
                let next = current.saturating_sub(bytes);
                match self.bypass_used.compare_exchange_weak(
                    current,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return false,
                    Err(observed) => current = observed,
                }
            }
        }
    }

    fn try_reserve_hard(&self, bytes: usize) -> bool {
        self.parent.try_reserve_hard(bytes)
    }

    fn release(&self, bytes: usize) {
        // Bypassed and non-bypassed bytes are indistinguishable at
        // release time; drain the bypass counter first.
        let mut current = self.bypass_used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(bytes);
            match self.bypass_used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.parent.release(bytes);
    }

    fn soft_remaining(&self) -> usize {
        let with_bypass = self
            .parent
            .soft_remaining()
            .saturating_add(self.bypass_remaining());
        with_bypass.min(self.parent.hard_remaining())
    }

    fn hard_remaining(&self) -> usize {
        self.parent.hard_remaining()
    }

    fn used(&self) -> usize {
        self.parent.used()
    }
}
