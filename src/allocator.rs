//! Top-level allocator: ties the three tiers together and implements
//! `GlobalAlloc`. Grounded on the teacher's `src/allocator.rs` singleton-
//! statics pattern and `GlobalAlloc` shape, collapsed to the single `std`
//! thread-local strategy — the teacher's `percpu`/`nightly` branches have no
//! counterpart in this spec, which calls for one portable implementation.

use crate::central_cache::CentralCache;
use crate::config::{MAX_BYTES, PAGE_SHIFT, PAGE_SIZE};
use crate::error::{Result, TieredAllocError};
use crate::page_heap::PageHeap;
use crate::platform;
use crate::size_class;
use crate::span::{alloc_span, dealloc_span};
use crate::stats::{stat_add, stat_inc};
use crate::thread_cache;
use std::alloc::{GlobalAlloc, Layout};
use std::ptr::{self, NonNull};
use std::sync::LazyLock;

// `PageHeap::new` allocates its radix-tree root array, so it cannot be a
// plain `const`-initialized static the way `CentralCache` can.
static PAGE_HEAP: LazyLock<PageHeap> = LazyLock::new(PageHeap::new);
static CENTRAL_CACHE: CentralCache = CentralCache::new();

/// Allocate `n` bytes. Requests above [`MAX_BYTES`] take the large-object
/// fast path (spec §4.7) and bypass the thread/central/page cache
/// hierarchy entirely.
pub fn allocate(n: usize) -> Result<NonNull<u8>> {
    debug_assert!(n > 0, "allocate(0) is undefined");
    stat_add!(alloc_bytes, n as u64);

    if n > MAX_BYTES {
        return allocate_large(n, PAGE_SIZE);
    }

    let aligned = size_class::round_up(n);
    let idx = size_class::index_fast(aligned);
    let ptr = thread_cache::allocate(idx, aligned, &PAGE_HEAP, &CENTRAL_CACHE);
    NonNull::new(ptr).ok_or(TieredAllocError::OutOfMemory)
}

/// Return `p`, previously returned by [`allocate`].
///
/// # Safety
/// `p` must be a still-live pointer returned by [`allocate`] on this
/// allocator and not already freed.
pub unsafe fn deallocate(p: NonNull<u8>) {
    let Some(span) = PAGE_HEAP.map_object_to_span(p.as_ptr()) else {
        debug_assert!(false, "deallocate: pointer has no span mapping");
        return;
    };
    let obj_size = unsafe { span.as_ref().obj_size };
    if obj_size == 0 {
        // Large object: never entered a size class, return pages to the OS.
        // Use the span's own page_id/n (the full OS mapping), not the page
        // containing `p` directly — an over-aligned request may have
        // returned an interior pointer into a larger backing mapping.
        let (span_page_id, n) = unsafe { (span.as_ref().page_id, span.as_ref().n) };
        let base = (span_page_id << PAGE_SHIFT) as *mut u8;
        unsafe { platform::system_unmap_pages(base, n) };
        unsafe { dealloc_span(span) };
        return;
    }
    let idx = size_class::index(obj_size);
    thread_cache::deallocate(idx, obj_size, p.as_ptr(), &PAGE_HEAP, &CENTRAL_CACHE);
}

/// Map `n` bytes directly from the OS, satisfying `align`. When `align`
/// exceeds [`PAGE_SIZE`] this over-maps enough pages to guarantee an
/// aligned region exists inside, at the cost of leaving the unused
/// prefix mapped too (platform `unmap` only supports releasing an entire
/// prior mapping by its original base pointer — see `platform::windows` —
/// so the whole over-mapped range is kept as one span rather than trimmed).
fn allocate_large(n: usize, align: usize) -> Result<NonNull<u8>> {
    let size_pages = n.div_ceil(PAGE_SIZE);
    let align_pages = align.div_ceil(PAGE_SIZE).max(1);
    let total_pages = size_pages + align_pages - 1;

    let base = unsafe { platform::system_map_pages(total_pages) };
    if base.is_null() {
        return Err(TieredAllocError::OutOfMemory);
    }
    stat_inc!(os_alloc_count);
    stat_add!(os_alloc_bytes, (total_pages * PAGE_SIZE) as u64);

    let base_addr = base as usize;
    let aligned_addr = (base_addr + align - 1) & !(align - 1);
    let base_page = base_addr >> PAGE_SHIFT;

    let span = alloc_span(base_page, total_pages);
    unsafe {
        let s = &mut *span.as_ptr();
        s.in_use = true;
        s.obj_size = 0;
        for i in 0..total_pages {
            PAGE_HEAP.register_large_span(base_page + i, span);
        }
    }
    stat_inc!(large_object_allocs);
    NonNull::new(aligned_addr as *mut u8).ok_or(TieredAllocError::OutOfMemory)
}

/// tcmalloc-style global allocator.
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: tieredmalloc::TieredAlloc = tieredmalloc::TieredAlloc;
/// ```
pub struct TieredAlloc;

unsafe impl GlobalAlloc for TieredAlloc {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        if size == 0 {
            return layout.align() as *mut u8;
        }
        let align = layout.align();

        if size <= MAX_BYTES {
            let aligned = size_class::round_up(size);
            if align <= aligned && aligned.is_multiple_of(align) {
                return match allocate(size) {
                    Ok(p) => p.as_ptr(),
                    Err(_) => ptr::null_mut(),
                };
            }
        }
        match allocate_large(size, align.max(PAGE_SIZE)) {
            Ok(p) => p.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    #[inline]
    unsafe fn dealloc(&self, p: *mut u8, _layout: Layout) {
        let Some(nn) = NonNull::new(p) else { return };
        unsafe { deallocate(nn) };
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let p = unsafe { self.alloc(layout) };
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, layout.size()) };
        }
        p
    }

    unsafe fn realloc(&self, p: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if new_size == 0 {
            unsafe { self.dealloc(p, layout) };
            return layout.align() as *mut u8;
        }
        let new_layout = match Layout::from_size_align(new_size, layout.align()) {
            Ok(l) => l,
            Err(_) => return ptr::null_mut(),
        };
        let new_p = unsafe { self.alloc(new_layout) };
        if !new_p.is_null() {
            let copy_len = layout.size().min(new_size);
            unsafe { ptr::copy_nonoverlapping(p, new_p, copy_len) };
            unsafe { self.dealloc(p, layout) };
        }
        new_p
    }
}
