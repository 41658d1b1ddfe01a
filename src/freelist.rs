//! Best-fit search, split, and coalesce over a per-segment free list.
//!
//! Every function here requires the owning segment's lock to be held by the
//! caller (enforced by [`crate::segment::Segment`], which is the only caller).
//! The free list is a doubly-linked list of [`Header`]s embedded in the
//! backing region itself, addressed by raw pointer.

use crate::header::{Header, HEADER_SIZE};
use std::ptr::null_mut;

/// Head of a segment's free list. The only piece of free-list state that
/// needs to live outside the region itself.
pub(crate) struct FreeListState {
    pub(crate) head: *mut Header,
}

// Safety: all access happens while the owning segment's mutex is held.
unsafe impl Send for FreeListState {}

impl FreeListState {
    pub(crate) fn new(head: *mut Header) -> Self {
        FreeListState { head }
    }
}

/// Link `node` in at the head of the free list.
pub(crate) unsafe fn list_insert(state: &mut FreeListState, node: *mut Header) {
    (*node).list_prev = null_mut();
    (*node).list_next = state.head;
    if !state.head.is_null() {
        (*state.head).list_prev = node;
    }
    state.head = node;
}

/// Unlink `node` from the free list using its own stored `list_prev`/`list_next`.
///
/// Must be called before `node`'s link fields are overwritten for any other
/// purpose (e.g. before a split reuses the slot for a new tail header) —
/// reading the predecessor's `next`'s `next` instead of the node's own links
/// is the bug this design explicitly calls out and avoids.
pub(crate) unsafe fn list_remove(state: &mut FreeListState, node: *mut Header) {
    let prev = (*node).list_prev;
    let next = (*node).list_next;
    if !prev.is_null() {
        (*prev).list_next = next;
    } else {
        state.head = next;
    }
    if !next.is_null() {
        (*next).list_prev = prev;
    }
    (*node).list_prev = null_mut();
    (*node).list_next = null_mut();
}

/// Smallest free block whose size satisfies `requested`, list-order stable.
pub(crate) unsafe fn best_fit(state: &FreeListState, requested: usize) -> Option<*mut Header> {
    let mut best: *mut Header = null_mut();
    let mut best_size = usize::MAX;
    let mut cur = state.head;
    while !cur.is_null() {
        let size = (*cur).size;
        if size >= requested && size < best_size {
            best = cur;
            best_size = size;
        }
        cur = (*cur).list_next;
    }
    if best.is_null() {
        None
    } else {
        Some(best)
    }
}

/// Allocate `block` (a free-list member of size `>= requested`), splitting
/// off a free tail when the residual is large enough to be worth keeping.
///
/// Returns the (now allocated) header, unchanged in address.
pub(crate) unsafe fn split(
    state: &mut FreeListState,
    block: *mut Header,
    requested: usize,
    min_split_size: usize,
) -> *mut Header {
    list_remove(state, block);
    let total = (*block).size;
    let residual = total - requested;
    if residual >= min_split_size + HEADER_SIZE {
        let tail_addr = (block as usize) + HEADER_SIZE + requested;
        let tail = tail_addr as *mut Header;
        (*tail).size = residual - HEADER_SIZE;
        (*tail).free = true;
        (*tail).segment_id = (*block).segment_id;
        (*tail).list_prev = null_mut();
        (*tail).list_next = null_mut();
        (*tail).phys_prev = block;
        (*tail).phys_next = (*block).phys_next;
        if !(*tail).phys_next.is_null() {
            (*(*tail).phys_next).phys_prev = tail;
        }
        (*block).phys_next = tail;
        (*block).size = requested;
        list_insert(state, tail);
    }
    (*block).free = false;
    block
}

/// Mark `block` free, then coalesce with its left and then right physical
/// neighbor if they are themselves free. Neighbors are found via the
/// always-valid `phys_prev`/`phys_next` links rather than by trusting the
/// just-freed block's own free-list links (which invariant 6 says may be
/// stale) or by scanning.
pub(crate) unsafe fn free_and_coalesce(state: &mut FreeListState, block: *mut Header) {
    (*block).free = true;
    list_insert(state, block);

    let mut cur = block;

    let left = (*cur).phys_prev;
    if !left.is_null() && (*left).free {
        list_remove(state, cur);
        (*left).size += HEADER_SIZE + (*cur).size;
        (*left).phys_next = (*cur).phys_next;
        if !(*cur).phys_next.is_null() {
            (*(*cur).phys_next).phys_prev = left;
        }
        cur = left;
    }

    let right = (*cur).phys_next;
    if !right.is_null() && (*right).free {
        list_remove(state, right);
        (*cur).size += HEADER_SIZE + (*right).size;
        (*cur).phys_next = (*right).phys_next;
        if !(*right).phys_next.is_null() {
            (*(*right).phys_next).phys_prev = cur;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::null_mut;

    /// Lay out a single free block spanning `buf`, the way `Segment::new` does.
    unsafe fn init_single_block(buf: &mut [u8]) -> *mut Header {
        let header = buf.as_mut_ptr() as *mut Header;
        (*header).size = buf.len() - HEADER_SIZE;
        (*header).free = true;
        (*header).segment_id = 0;
        (*header).list_prev = null_mut();
        (*header).list_next = null_mut();
        (*header).phys_prev = null_mut();
        (*header).phys_next = null_mut();
        header
    }

    #[test]
    fn best_fit_picks_the_smallest_adequate_block() {
        let mut buf = [0u8; 4096];
        unsafe {
            let block = init_single_block(&mut buf);
            let mut state = FreeListState::new(block);

            // split off a 64-byte head, leaving a large tail free.
            let small = split(&mut state, block, 64, 32);
            assert_eq!((*small).size, 64);
            assert!(!(*small).free);

            let found = best_fit(&state, 64).expect("tail should satisfy a 64-byte request");
            assert!((*found).size >= 64);
            assert_ne!(found, small, "the allocated head must not be offered again");
        }
    }

    #[test]
    fn best_fit_returns_none_when_nothing_fits() {
        let mut buf = [0u8; 256];
        unsafe {
            let block = init_single_block(&mut buf);
            let state = FreeListState::new(block);
            assert!(best_fit(&state, 10_000).is_none());
        }
    }

    #[test]
    fn split_leaves_no_tail_when_residual_is_too_small() {
        let mut buf = [0u8; 256];
        unsafe {
            let block = init_single_block(&mut buf);
            let mut state = FreeListState::new(block);
            let total = (*block).size;

            // ask for everything but a sliver smaller than one header + min_split_size.
            let requested = total - (HEADER_SIZE / 2);
            let allocated = split(&mut state, block, requested, 32);

            assert_eq!(allocated, block);
            assert_eq!((*allocated).size, total, "no split should have occurred");
            assert!(best_fit(&state, 1).is_none(), "free list should be empty");
        }
    }

    #[test]
    fn free_and_coalesce_merges_both_physical_neighbors() {
        let mut buf = [0u8; 4096];
        unsafe {
            let block = init_single_block(&mut buf);
            let mut state = FreeListState::new(block);
            let total = (*block).size;

            // carve three adjacent blocks: left (alloc), mid (alloc), tail (free).
            let left = split(&mut state, block, 100, 0);
            let mid_hole = best_fit(&state, 1).unwrap();
            let mid = split(&mut state, mid_hole, 100, 0);
            let _ = left;

            // free the middle block; it should coalesce with neither neighbor yet
            // (left is still allocated, right is already free).
            free_and_coalesce(&mut state, mid);
            let right_of_mid = (*mid).phys_next;
            assert!(right_of_mid.is_null() || (*right_of_mid).free);

            // now free `left`; it should coalesce forward into `mid` (and onward
            // into the tail, transitively, since `free_and_coalesce` re-checks
            // after merging left).
            free_and_coalesce(&mut state, left);

            // walk from the segment start and confirm there is now exactly one
            // free block spanning everything after the header.
            let merged = state.head;
            assert!(!merged.is_null());
            assert_eq!((*merged).phys_prev, null_mut());
            assert_eq!((*merged).phys_next, null_mut());
            assert_eq!((*merged).size, total);
        }
    }
}
