use thiserror::Error;

/// Failures that can occur while standing up or tearing down the allocator.
///
/// `allocate`/`release` never return this type: per the design, capacity
/// exhaustion, oversize requests, and misuse are outcomes signalled by a
/// null/`None` return, not by an error channel. Only the fallible
/// construction-time path (acquiring the backing region from the host, and
/// validating the layout before ever touching the host) is typed.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The host refused or failed to hand back the backing region.
    #[error("failed to acquire {requested} bytes from the host: {source}")]
    RegionAcquisitionFailed {
        requested: usize,
        #[source]
        source: crate::os::OsError,
    },

    /// The supplied `Config` cannot describe a valid segment layout.
    #[error("invalid allocator configuration: {reason}")]
    InvalidConfig { reason: &'static str },
}
