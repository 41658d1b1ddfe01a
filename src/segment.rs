//! A segment: a disjoint sub-range of the backing region with its own
//! free list, mutex, and condition variable.

use crate::freelist::{self, FreeListState};
use crate::header::{payload_ptr, Header, HEADER_SIZE};
use std::ptr::NonNull;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A contiguous sub-range `[start, start + size)` of the backing region.
///
/// Initially holds one free block spanning the whole range. All free-list
/// mutation is serialized by `free`; `cond` lets a caller that missed on
/// best-fit sleep until a release broadcasts.
pub(crate) struct Segment {
    pub(crate) id: u32,
    pub(crate) start: *mut u8,
    pub(crate) size: usize,
    free: Mutex<FreeListState>,
    cond: Condvar,
}

// Safety: the raw `start` pointer is only ever dereferenced while `free` is
// held, which is what actually guards the bytes it points to.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

/// Result of a bounded wait for a block, distinguishing an immediate,
/// never-could-fit rejection from an actual condition-variable timeout.
pub(crate) enum TimedOutcome {
    Allocated(NonNull<u8>),
    /// `requested` exceeds this segment's total size; no wait was attempted.
    TooLarge,
    /// Waited the full timeout without a block becoming available.
    TimedOut,
}

impl Segment {
    /// Build a segment over `[start, start + size)`, writing the single
    /// initial free-block header at `start`.
    ///
    /// # Safety
    /// `[start, start + size)` must be exclusively owned, writable memory,
    /// and `size` must be large enough to hold one `Header`.
    pub(crate) unsafe fn new(id: u32, start: *mut u8, size: usize) -> Segment {
        debug_assert!(size > HEADER_SIZE);
        let header = start as *mut Header;
        (*header).size = size - HEADER_SIZE;
        (*header).free = true;
        (*header).segment_id = id;
        (*header).list_prev = std::ptr::null_mut();
        (*header).list_next = std::ptr::null_mut();
        (*header).phys_prev = std::ptr::null_mut();
        (*header).phys_next = std::ptr::null_mut();

        Segment {
            id,
            start,
            size,
            free: Mutex::new(FreeListState::new(header)),
            cond: Condvar::new(),
        }
    }

    /// Best-fit search and, on a hit, split + allocate, in one locked step.
    /// `requested` is the payload-plus-header footprint (`s'` in the design).
    fn try_allocate(&self, requested: usize, min_split_size: usize) -> Option<NonNull<u8>> {
        let mut guard = self.free.lock().unwrap();
        let block = unsafe { freelist::best_fit(&guard, requested) }?;
        let block = unsafe { freelist::split(&mut guard, block, requested, min_split_size) };
        Some(unsafe { payload_ptr(block) })
    }

    /// Try once immediately; on a miss, return `None` without waiting. Used
    /// for the first, round-robin-chosen segment.
    pub(crate) fn allocate_once(&self, requested: usize, min_split_size: usize) -> Option<NonNull<u8>> {
        self.try_allocate(requested, min_split_size)
    }

    /// Try, and on a miss sleep on `cond` up to `timeout`, retesting
    /// best-fit on every wakeup (spurious or broadcast) before re-sleeping
    /// for whatever remains of the deadline.
    pub(crate) fn allocate_timed(
        &self,
        requested: usize,
        min_split_size: usize,
        timeout: Duration,
    ) -> TimedOutcome {
        if requested > self.size {
            // impossible request for this segment; don't wait at all.
            return TimedOutcome::TooLarge;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.free.lock().unwrap();
        loop {
            if let Some(block) = unsafe { freelist::best_fit(&guard, requested) } {
                let block = unsafe { freelist::split(&mut guard, block, requested, min_split_size) };
                return TimedOutcome::Allocated(unsafe { payload_ptr(block) });
            }
            let now = Instant::now();
            if now >= deadline {
                return TimedOutcome::TimedOut;
            }
            let (next_guard, result) = self.cond.wait_timeout(guard, deadline - now).unwrap();
            guard = next_guard;
            if result.timed_out() {
                // one last retest before giving up the lock.
                return if let Some(block) = unsafe { freelist::best_fit(&guard, requested) } {
                    let block =
                        unsafe { freelist::split(&mut guard, block, requested, min_split_size) };
                    TimedOutcome::Allocated(unsafe { payload_ptr(block) })
                } else {
                    TimedOutcome::TimedOut
                };
            }
        }
    }

    /// Mark `header`'s block free, coalesce with physical neighbors, and
    /// wake any waiters.
    ///
    /// # Safety
    /// `header` must point at a block that belongs to this segment and is
    /// currently allocated.
    pub(crate) unsafe fn release(&self, header: *mut Header) {
        {
            let mut guard = self.free.lock().unwrap();
            freelist::free_and_coalesce(&mut guard, header);
        }
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// A `Segment` over a `Box<[u8]>` kept alive for the test's duration,
    /// mirroring how `facade::Inner` carves one out of the backing region.
    fn leaked_segment(size: usize) -> Segment {
        let buf = vec![0u8; size].into_boxed_slice();
        let start = Box::into_raw(buf) as *mut u8;
        unsafe { Segment::new(0, start, size) }
    }

    #[test]
    fn allocate_once_then_release_frees_the_block() {
        let seg = leaked_segment(4096);
        let ptr = seg.allocate_once(128, 32).expect("first allocation should succeed");
        unsafe {
            let header = crate::header::header_from_payload(ptr);
            seg.release(header);
        }
        // the whole segment should be free again, so a request for almost
        // the entire segment now succeeds.
        assert!(seg.allocate_once(4096 - HEADER_SIZE - 32, 32).is_some());
    }

    #[test]
    fn allocate_timed_returns_none_past_deadline_when_segment_stays_full() {
        let seg = leaked_segment(256);
        let _first = seg
            .allocate_once(256 - HEADER_SIZE, 32)
            .expect("should fill the whole segment");
        let second = seg.allocate_timed(64, 32, Duration::from_millis(20));
        assert!(matches!(second, TimedOutcome::TimedOut));
    }

    #[test]
    fn allocate_timed_wakes_up_when_another_thread_releases() {
        let seg = Arc::new(leaked_segment(256));
        let held = seg
            .allocate_once(256 - HEADER_SIZE, 32)
            .expect("should fill the whole segment");

        let seg2 = Arc::clone(&seg);
        let waiter = thread::spawn(move || seg2.allocate_timed(64, 32, Duration::from_millis(500)));

        thread::sleep(Duration::from_millis(20));
        unsafe {
            let header = crate::header::header_from_payload(held);
            seg.release(header);
        }

        assert!(matches!(waiter.join().unwrap(), TimedOutcome::Allocated(_)));
    }

    #[test]
    fn allocate_timed_rejects_a_request_larger_than_the_segment() {
        let seg = leaked_segment(256);
        assert!(matches!(
            seg.allocate_timed(10_000, 32, Duration::from_millis(10)),
            TimedOutcome::TooLarge
        ));
    }
}
