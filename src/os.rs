//! One-shot acquisition and release of the backing region from the host.
//!
//! This is the single point of contact with the operating system: the
//! façade calls [`Region::acquire`] exactly once per initialization and
//! relies on `Drop` to call the matching release on teardown. No other part
//! of the crate touches the OS.

use std::fmt;

#[cfg(not(windows))]
use libc::{mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};

#[cfg(windows)]
use winapi::{
    shared::minwindef::LPVOID,
    um::memoryapi::{VirtualAlloc, VirtualFree},
    um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE},
};

/// Opaque failure from the host memory primitive.
#[derive(Debug)]
pub struct OsError {
    pub(crate) errno: i32,
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host allocation primitive failed, errno {}", self.errno)
    }
}

impl std::error::Error for OsError {}

/// The single contiguous byte buffer acquired from the host.
///
/// Owns `len` bytes starting at `ptr`; `Drop` releases them back to the host.
/// Every byte in the region is handed out to exactly one [`crate::segment::Segment`]
/// at initialization, so `Region` itself never needs synchronization — access
/// to its contents is always mediated by a segment's lock.
pub(crate) struct Region {
    pub(crate) ptr: *mut u8,
    pub(crate) len: usize,
}

// Safety: `Region` only exposes its contents through `Segment`s, each of
// which guards its own sub-range with a mutex. The bytes never alias across
// segments.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Acquire `len` bytes from the host in a single bulk call.
    pub(crate) fn acquire(len: usize) -> Result<Region, OsError> {
        #[cfg(not(windows))]
        {
            let ptr = unsafe {
                mmap(
                    std::ptr::null_mut(),
                    len,
                    PROT_READ | PROT_WRITE,
                    MAP_PRIVATE | MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == MAP_FAILED {
                let err = OsError {
                    errno: errno::errno().0,
                };
                log::error!("mmap failed acquiring {} bytes: {}", len, err);
                return Err(err);
            }
            Ok(Region {
                ptr: ptr as *mut u8,
                len,
            })
        }
        #[cfg(windows)]
        {
            let ptr = unsafe {
                VirtualAlloc(
                    std::ptr::null_mut(),
                    len,
                    MEM_RESERVE | MEM_COMMIT,
                    PAGE_READWRITE,
                )
            };
            if ptr.is_null() {
                let err = OsError {
                    errno: unsafe { winapi::um::errhandlingapi::GetLastError() } as i32,
                };
                log::error!("VirtualAlloc failed acquiring {} bytes: {}", len, err);
                return Err(err);
            }
            Ok(Region {
                ptr: ptr as *mut u8,
                len,
            })
        }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        #[cfg(not(windows))]
        unsafe {
            if munmap(self.ptr as *mut _, self.len) != 0 {
                log::warn!(
                    "munmap failed releasing {} bytes at {:p}: errno {}",
                    self.len,
                    self.ptr,
                    errno::errno().0
                );
            }
        }
        #[cfg(windows)]
        unsafe {
            let _ = self.len;
            if VirtualFree(self.ptr as LPVOID, 0, MEM_RELEASE) == 0 {
                log::warn!("VirtualFree failed releasing region at {:p}", self.ptr);
            }
        }
    }
}
