//! OS virtual memory abstraction.
//!
//! Wraps `mmap`/`munmap` on Unix and `VirtualAlloc`/`VirtualFree` on Windows
//! behind a page-count-oriented pair of functions. The three-tier hierarchy
//! only ever grows by whole `PAGE_NUM - 1`-page chunks (§4.4); the
//! large-object fast path (§4.7) calls these directly with its own page
//! count and is responsible for returning its own pages.

#[cfg(windows)]
mod windows;

#[cfg(unix)]
mod unix;

use crate::config::PAGE_SIZE;

/// Map `num_pages` fresh, zero-initialized pages from the OS.
/// Returns null on failure.
///
/// # Safety
/// Caller must eventually call `system_unmap_pages` with the returned
/// pointer and the same `num_pages`.
#[inline]
pub unsafe fn system_map_pages(num_pages: usize) -> *mut u8 {
    let size = num_pages * PAGE_SIZE;
    #[cfg(windows)]
    {
        unsafe { windows::map(size) }
    }
    #[cfg(unix)]
    {
        unsafe { unix::map(size) }
    }
}

/// Release pages previously returned by `system_map_pages`.
///
/// # Safety
/// `ptr`/`num_pages` must match a prior `system_map_pages` call exactly.
#[inline]
pub unsafe fn system_unmap_pages(ptr: *mut u8, num_pages: usize) {
    let size = num_pages * PAGE_SIZE;
    #[cfg(windows)]
    {
        unsafe { windows::unmap(ptr) };
    }
    #[cfg(unix)]
    {
        unsafe { unix::unmap(ptr, size) };
    }
}
