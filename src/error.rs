//! Error model (spec §7).
//!
//! Only `OutOfMemory` is a recoverable condition surfaced through `Result`.
//! `InvalidArgument` and `InternalCorruption` are programmer/heap-corruption
//! errors checked with `debug_assert!` at module boundaries, matching the
//! teacher's convention of asserting invariants inline rather than threading
//! a `Result` through the hot path.

use core::fmt;

/// The only error `allocate` can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieredAllocError {
    /// The OS refused a page-mapping request.
    OutOfMemory,
}

impl fmt::Display for TieredAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieredAllocError::OutOfMemory => write!(f, "out of memory: OS page request failed"),
        }
    }
}

impl std::error::Error for TieredAllocError {}

pub type Result<T> = core::result::Result<T, TieredAllocError>;
