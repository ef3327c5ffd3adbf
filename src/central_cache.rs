//! Central cache: one shared, per-size-class span pool between the page
//! cache and every thread cache (spec §4.5). Grounded on
//! `original_source/CentralCache.{h,cpp}`'s `FetchRangeObj`/`GetOneSpan`/
//! `ReleaseListToSpans`, carried into the teacher's per-bucket
//! `SpinMutex<CentralFreeList>` array (renamed from `central_free_list.rs`;
//! bucket count corrected from the teacher's 46 to the spec's 208).
//!
//! The critical discipline, straight out of `GetOneSpan`: a bucket's lock
//! is always released before calling into the page cache, and re-acquired
//! after, so a thread waiting on `page_mtx` never blocks every other thread
//! wanting the same size class.

use crate::page_heap::PageHeap;
use crate::size_class::{self, NUM_SIZE_CLASSES};
use crate::span::{Span, SpanList};
use crate::stats::stat_inc;
use crate::sync::SpinMutex;
use std::ptr::NonNull;

/// Per-size-class span pool.
pub struct CentralFreeList {
    spans: SpanList,
}

unsafe impl Send for CentralFreeList {}

impl CentralFreeList {
    const fn new() -> Self {
        Self {
            spans: SpanList::new(),
        }
    }
}

/// 208 independently-locked central free lists, one per size class.
pub struct CentralCache {
    lists: [SpinMutex<CentralFreeList>; NUM_SIZE_CLASSES],
}

impl CentralCache {
    pub const fn new() -> Self {
        Self {
            lists: [const { SpinMutex::new(CentralFreeList::new()) }; NUM_SIZE_CLASSES],
        }
    }

    /// Fetch up to `batch` objects of `aligned_size` bytes, returning a
    /// singly-linked chain `(head, actual_count)`. `actual_count >= 1`
    /// unless the page cache is out of memory.
    pub fn fetch_range(
        &self,
        page_heap: &PageHeap,
        batch: usize,
        aligned_size: usize,
    ) -> (*mut u8, usize) {
        debug_assert!(batch >= 1);
        let idx = size_class::index(aligned_size);
        let bucket = &self.lists[idx];
        let mut guard = bucket.lock();

        let span = match guard.spans.first_with_free_objects() {
            Some(s) => s,
            None => {
                // Release the bucket lock before touching the page cache so
                // another thread returning to this bucket isn't blocked
                // behind us waiting on the OS.
                drop(guard);
                let span = self.get_one_span(page_heap, aligned_size);
                guard = bucket.lock();
                unsafe { guard.spans.push_front(span) };
                span
            }
        };

        let mut head: *mut u8 = std::ptr::null_mut();
        let mut tail: *mut u8 = std::ptr::null_mut();
        let mut actual = 0;
        unsafe {
            let s = &mut *span.as_ptr();
            while actual < batch {
                let Some(obj) = s.free_list_pop() else {
                    break;
                };
                if tail.is_null() {
                    head = obj;
                } else {
                    *(tail as *mut *mut u8) = obj;
                }
                tail = obj;
                actual += 1;
            }
            if !tail.is_null() {
                *(tail as *mut *mut u8) = std::ptr::null_mut();
            }
            s.use_count += actual;
        }
        debug_assert!(actual >= 1, "freshly carved span must yield at least one object");
        stat_inc!(central_cache_hits);
        (head, actual)
    }

    /// Carve a fresh span for `aligned_size` from the page cache. Called
    /// with no bucket lock held.
    fn get_one_span(&self, page_heap: &PageHeap, aligned_size: usize) -> NonNull<Span> {
        let pages = size_class::num_move_page(aligned_size);
        let span = page_heap.new_span(pages);
        unsafe {
            let s = &mut *span.as_ptr();
            s.in_use = true;
            s.obj_size = aligned_size;

            let base = (s.page_id << crate::config::PAGE_SHIFT) as *mut u8;
            let total_bytes = s.n * crate::config::PAGE_SIZE;
            let num_objects = total_bytes / aligned_size;
            let mut tail: *mut u8 = std::ptr::null_mut();
            for i in (0..num_objects).rev() {
                let obj = base.add(i * aligned_size);
                if i == num_objects - 1 {
                    tail = obj;
                    *(obj as *mut *mut u8) = std::ptr::null_mut();
                } else {
                    *(obj as *mut *mut u8) = tail;
                    tail = obj;
                }
            }
            s.free_list = tail;
        }
        stat_inc!(page_heap_allocs);
        span
    }

    /// Return a chain of `aligned_size`-byte objects starting at `start`.
    pub fn release_range(&self, page_heap: &PageHeap, start: *mut u8, aligned_size: usize) {
        let idx = size_class::index(aligned_size);
        let bucket = &self.lists[idx];
        let mut guard = bucket.lock();

        let mut cur = start;
        while !cur.is_null() {
            let next = unsafe { *(cur as *mut *mut u8) };
            let Some(span) = page_heap.map_object_to_span(cur) else {
                debug_assert!(false, "freed pointer has no span mapping");
                cur = next;
                continue;
            };
            let use_count_zero = unsafe {
                let s = &mut *span.as_ptr();
                s.free_list_push(cur);
                s.use_count -= 1;
                s.use_count == 0
            };
            if use_count_zero {
                unsafe { guard.spans.remove(span) };
                unsafe {
                    let s = &mut *span.as_ptr();
                    s.free_list = std::ptr::null_mut();
                }
                // Drop the bucket lock before calling into the page cache,
                // mirroring `fetch_range`'s discipline (spec §4.5/§5).
                drop(guard);
                page_heap.release_span(span);
                guard = bucket.lock();
            }
            cur = next;
        }
    }
}

impl Default for CentralCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size_class::round_up;

    #[test]
    fn fetch_then_release_round_trip() {
        let heap = PageHeap::new();
        let cache = CentralCache::new();
        let size = round_up(16);
        let (head, actual) = cache.fetch_range(&heap, 8, size);
        assert!(actual >= 1);
        assert!(!head.is_null());
        cache.release_range(&heap, head, size);
    }

    #[test]
    fn s3_two_threads_share_bucket_and_span_returns_cleanly() {
        let heap = std::sync::Arc::new(PageHeap::new());
        let cache = std::sync::Arc::new(CentralCache::new());
        let size = round_up(16);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let heap = std::sync::Arc::clone(&heap);
                let cache = std::sync::Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..7 {
                        let (head, actual) = cache.fetch_range(&heap, 1, size);
                        assert_eq!(actual, 1);
                        cache.release_range(&heap, head, size);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn fetch_batch_never_exceeds_requested() {
        let heap = PageHeap::new();
        let cache = CentralCache::new();
        let size = round_up(8);
        let (head, actual) = cache.fetch_range(&heap, 3, size);
        assert!(actual <= 3);
        cache.release_range(&heap, head, size);
    }
}
