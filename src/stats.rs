//! Allocation counters, observed but never consulted for routing decisions.
//!
//! Narrowed from `mimalloc-rs`'s `StatCount`/`StatCounter` to the handful of
//! numbers this allocator's own tests and callers care about.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct Stats {
    allocations: AtomicU64,
    frees: AtomicU64,
    live_allocations: AtomicU64,
    bytes_live: AtomicU64,
    segment_misses: AtomicU64,
    timeouts: AtomicU64,
}

impl Stats {
    pub(crate) fn record_alloc(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_live.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self, size: usize) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.live_allocations.fetch_sub(1, Ordering::Relaxed);
        self.bytes_live.fetch_sub(size as u64, Ordering::Relaxed);
    }

    /// A segment was tried (via an immediate attempt or a bounded wait) and
    /// did not yield a block, for any reason.
    pub(crate) fn record_segment_miss(&self) {
        self.segment_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A bounded wait on a segment's condition variable ran out the full
    /// timeout without a block becoming available. A subset of segment
    /// misses — excludes the immediate "too large for this segment" case.
    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            live_allocations: self.live_allocations.load(Ordering::Relaxed),
            bytes_live: self.bytes_live.load(Ordering::Relaxed),
            segment_misses: self.segment_misses.load(Ordering::Relaxed),
            segment_timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of allocator activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total successful `allocate` calls served, ever.
    pub allocations: u64,
    /// Total `release` calls that freed a live block.
    pub frees: u64,
    /// Allocations currently outstanding (`allocations` minus `frees`).
    pub live_allocations: u64,
    /// Requested bytes currently live (allocations minus frees, by size).
    pub bytes_live: u64,
    /// Segment visits (immediate try or bounded wait) that didn't yield a block.
    pub segment_misses: u64,
    /// Number of per-segment timed waits that expired without a block.
    pub segment_timeouts: u64,
}
