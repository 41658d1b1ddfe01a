//! The allocator façade: lazy one-time initialization, request routing,
//! and teardown.

use crate::config::Config;
use crate::error::AllocError;
use crate::header::{header_from_payload, HEADER_SIZE};
use crate::os::Region;
use crate::segment::{Segment, TimedOutcome};
use crate::stats::{Stats, StatsSnapshot};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

/// Everything that depends on the backing region being live. Wrapped in an
/// `Arc` so `allocate`/`release` can clone a handle out from under the
/// initialization mutex and then drop that mutex before touching any
/// segment lock — per the design, the init mutex is never held at the same
/// time as a segment lock.
struct Inner {
    // Held only for its `Drop` impl, which returns the bytes to the host.
    _region: Region,
    segments: Vec<Segment>,
    round_robin: Mutex<usize>,
}

impl Inner {
    fn new(config: &Config) -> Result<Inner, AllocError> {
        let region = Region::acquire(config.capacity).map_err(|source| {
            AllocError::RegionAcquisitionFailed {
                requested: config.capacity,
                source,
            }
        })?;

        let small_count = config.small_segment_count();
        let small_share = (config.capacity / 5) / small_count;

        let mut segments = Vec::with_capacity(config.segment_count);
        let mut cursor: usize = 0;
        for id in 0..small_count {
            let start = unsafe { region.ptr.add(cursor) };
            segments.push(unsafe { Segment::new(id as u32, start, small_share) });
            cursor += small_share;
        }
        // the remainder goes to the last (large) segment, so rounding never
        // breaks the tiling invariant.
        let large_size = config.capacity - cursor;
        let large_start = unsafe { region.ptr.add(cursor) };
        segments.push(unsafe { Segment::new(small_count as u32, large_start, large_size) });

        log::debug!(
            "initialized backing region: {} bytes across {} segments ({} small of {} bytes, 1 large of {} bytes)",
            config.capacity,
            config.segment_count,
            small_count,
            small_share,
            large_size,
        );

        Ok(Inner {
            _region: region,
            segments,
            round_robin: Mutex::new(0),
        })
    }
}

/// A fixed-capacity, thread-safe segmented arena allocator.
///
/// Construct with [`Allocator::new`] or [`Allocator::with_config`]. The
/// backing region is acquired from the host once, eagerly, at construction;
/// [`Allocator::teardown`] releases it, after which the next [`Allocator::allocate`]
/// transparently re-initializes (mirroring the design's stated re-entry
/// behavior after teardown).
pub struct Allocator {
    config: Config,
    state: Mutex<Option<Arc<Inner>>>,
    stats: Stats,
}

impl Allocator {
    /// Build an allocator with the default [`Config`].
    pub fn new() -> Result<Allocator, AllocError> {
        Allocator::with_config(Config::default())
    }

    /// Build an allocator with a custom [`Config`], validated before any
    /// host call is made.
    pub fn with_config(config: Config) -> Result<Allocator, AllocError> {
        if !config.is_valid() {
            return Err(AllocError::InvalidConfig {
                reason: "segment_count must be >= 2 and capacity must fit a header per segment",
            });
        }
        let inner = Inner::new(&config)?;
        Ok(Allocator {
            config,
            state: Mutex::new(Some(Arc::new(inner))),
            stats: Stats::default(),
        })
    }

    /// Ensure the backing region is live, lazily re-initializing it if a
    /// prior `teardown` tore it down. Returns a cheap `Arc` clone and drops
    /// the state mutex immediately afterward.
    fn ensure_initialized(&self) -> Option<Arc<Inner>> {
        let mut guard = self.state.lock().unwrap();
        if guard.is_none() {
            match Inner::new(&self.config) {
                Ok(inner) => *guard = Some(Arc::new(inner)),
                Err(err) => {
                    log::error!("allocator re-initialization failed: {}", err);
                    return None;
                }
            }
        }
        guard.clone()
    }

    /// Request a block of at least `size` bytes. Returns a pointer into the
    /// backing region past its header, or `None` on any failure (oversize
    /// request, host acquisition failure, or every candidate segment timing
    /// out). `size` must be strictly positive; zero is undefined behavior
    /// per the design and only checked in debug builds.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        debug_assert!(size > 0, "allocate called with size == 0");
        if size == 0 {
            return None;
        }
        if size > self.config.capacity {
            return None;
        }
        let required = size + HEADER_SIZE;

        let inner = self.ensure_initialized()?;
        let small_count = self.config.small_segment_count();

        let start_index = {
            let mut rr = inner.round_robin.lock().unwrap();
            let chosen = *rr;
            *rr = (*rr + 1) % small_count;
            chosen
        };

        if let Some(ptr) = inner.segments[start_index].allocate_once(required, self.config.min_split_size) {
            self.stats.record_alloc(required);
            return Some(ptr);
        }
        self.stats.record_segment_miss();

        if size <= self.config.large_threshold {
            for i in 0..small_count {
                match inner.segments[i].allocate_timed(
                    required,
                    self.config.min_split_size,
                    self.config.segment_wait_timeout,
                ) {
                    TimedOutcome::Allocated(ptr) => {
                        self.stats.record_alloc(required);
                        return Some(ptr);
                    }
                    TimedOutcome::TooLarge => self.stats.record_segment_miss(),
                    TimedOutcome::TimedOut => {
                        self.stats.record_segment_miss();
                        self.stats.record_timeout();
                    }
                }
            }
            log::warn!("allocate({}): all small segments timed out", size);
            None
        } else {
            let large = &inner.segments[small_count];
            match large.allocate_timed(
                required,
                self.config.min_split_size,
                self.config.segment_wait_timeout,
            ) {
                TimedOutcome::Allocated(ptr) => {
                    self.stats.record_alloc(required);
                    Some(ptr)
                }
                TimedOutcome::TooLarge => {
                    self.stats.record_segment_miss();
                    log::warn!("allocate({}): request too large for the large segment", size);
                    None
                }
                TimedOutcome::TimedOut => {
                    self.stats.record_segment_miss();
                    self.stats.record_timeout();
                    log::warn!("allocate({}): large segment timed out", size);
                    None
                }
            }
        }
    }

    /// Release a block previously returned by [`Allocator::allocate`].
    /// `None` is a no-op. Releasing a foreign pointer or double-releasing is
    /// undefined behavior and is not detected, per the design.
    pub fn release(&self, ptr: Option<NonNull<u8>>) {
        let ptr = match ptr {
            Some(p) => p,
            None => return,
        };
        let inner = match self.state.lock().unwrap().clone() {
            Some(inner) => inner,
            None => return,
        };
        unsafe {
            let header = header_from_payload(ptr);
            let size = (*header).size;
            let segment_id = (*header).segment_id as usize;
            inner.segments[segment_id].release(header);
            self.stats.record_free(size);
        }
    }

    /// Release all allocator resources: every segment's mutex and condition
    /// variable, and the backing region itself. The caller must ensure no
    /// outstanding allocations or in-flight `allocate`/`release` calls
    /// remain. The next `allocate` call re-initializes from scratch.
    pub fn teardown(&self) {
        let mut guard = self.state.lock().unwrap();
        if guard.take().is_some() {
            log::debug!("allocator teardown: releasing backing region");
        }
    }

    /// Snapshot of allocation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The configuration this allocator was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
