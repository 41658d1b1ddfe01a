//! A fixed-capacity, thread-safe dynamic memory allocator over a single
//! pre-reserved backing region.
//!
//! The backing region is acquired once from the host and sliced into `N`
//! segments: `N - 1` small segments shared round-robin, and one large
//! segment reserved for requests above [`Config::large_threshold`]. Each
//! segment owns a best-fit free list guarded by its own mutex, with a
//! condition variable callers can block on (with a bounded timeout) while
//! waiting for a block to free up.
//!
//! ```no_run
//! use arena_alloc::Allocator;
//!
//! let alloc = Allocator::new().expect("backing region acquisition failed");
//! let ptr = alloc.allocate(64).expect("allocation failed");
//! alloc.release(Some(ptr));
//! alloc.teardown();
//! ```

mod config;
mod error;
mod facade;
mod freelist;
mod header;
mod os;
mod segment;
mod stats;

pub use config::Config;
pub use error::AllocError;
pub use facade::Allocator;
pub use os::OsError;
pub use stats::StatsSnapshot;
