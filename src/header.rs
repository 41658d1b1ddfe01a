//! The in-band block header and the raw-pointer arithmetic around it.
//!
//! Every block, free or allocated, is prefixed by a [`Header`]. This module
//! is the `unsafe` boundary the rest of the crate is built on: callers above
//! this module only ever see [`std::ptr::NonNull<u8>`] payload pointers, never
//! a `*mut Header` or a free-list link.

use std::mem::size_of;
use std::ptr::NonNull;

/// Bytes of header preceding every block's payload.
pub(crate) const HEADER_SIZE: usize = size_of::<Header>();

/// In-band per-block metadata.
///
/// `list_prev`/`list_next` are the per-segment free-list links and are only
/// meaningful while `free` is `true` (invariant: allocated blocks' links may
/// be stale garbage, per the design). `phys_prev`/`phys_next` mirror the
/// block's physical neighbors in the segment and are always valid; they
/// exist so coalescing on release can find a block's physical neighbors in
/// O(1) without scanning the free list or trusting the just-freed block's
/// own (possibly stale) free-list links, which a naive port of the source
/// design gets wrong (see DESIGN.md).
#[repr(C)]
pub(crate) struct Header {
    pub(crate) size: usize,
    pub(crate) free: bool,
    pub(crate) segment_id: u32,
    pub(crate) list_prev: *mut Header,
    pub(crate) list_next: *mut Header,
    pub(crate) phys_prev: *mut Header,
    pub(crate) phys_next: *mut Header,
}

/// Address of the payload immediately following `header`.
pub(crate) unsafe fn payload_ptr(header: *mut Header) -> NonNull<u8> {
    let addr = (header as usize) + HEADER_SIZE;
    NonNull::new_unchecked(addr as *mut u8)
}

/// Recover the header belonging to a payload pointer previously handed out
/// by [`payload_ptr`].
///
/// # Safety
/// `ptr` must have been returned by a prior `payload_ptr` call on a header
/// that is still alive (i.e. the region has not been torn down).
pub(crate) unsafe fn header_from_payload(ptr: NonNull<u8>) -> *mut Header {
    (ptr.as_ptr() as usize - HEADER_SIZE) as *mut Header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_roundtrips_through_header_from_payload() {
        let mut buf = [0u8; 128];
        let header = buf.as_mut_ptr() as *mut Header;
        unsafe {
            let payload = payload_ptr(header);
            assert_eq!(payload.as_ptr() as usize, header as usize + HEADER_SIZE);
            assert_eq!(header_from_payload(payload), header);
        }
    }
}
