use std::time::Duration;

/// Compile-time-in-spirit tuning parameters for the allocator.
///
/// These mirror the constants enumerated in the design: total backing
/// capacity, segment count, the small/large split, the minimum residual a
/// split will leave behind, the large-request threshold, and the per-segment
/// wait timeout. They are carried as a runtime value rather than `const`s so
/// tests can exercise small arenas without reserving 100 MiB per case, but a
/// given [`crate::Allocator`] never changes its `Config` after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Total size in bytes of the backing region, `C`.
    pub capacity: usize,
    /// Segment count, `N`. Must be at least 2 (one small, one large).
    pub segment_count: usize,
    /// Minimum residual payload size a split will carve off, in bytes.
    pub min_split_size: usize,
    /// Requests larger than this bypass the small segments entirely, `L`.
    pub large_threshold: usize,
    /// Per-segment bounded wait, `T`.
    pub segment_wait_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capacity: 100 * 1024 * 1024,
            segment_count: 5,
            min_split_size: 32,
            large_threshold: 4 * 1024 * 1024,
            segment_wait_timeout: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Number of small (round-robin) segments, `N - 1`.
    pub(crate) fn small_segment_count(&self) -> usize {
        self.segment_count - 1
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.segment_count >= 2
            && self.capacity >= self.segment_count * 4096
            && self.min_split_size >= 1
    }
}
