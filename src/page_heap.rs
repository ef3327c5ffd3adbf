//! Page cache: owns whole pages, splits and coalesces spans, and is the
//! sole component that talks to the OS for memory (spec §4.4). Grounded on
//! `original_source/PageCache.{h,cpp}`'s `NewSpan`/`MapObjectToSpan`/
//! `ReleaseSpanToPageCache`, carried into the teacher's `SpinMutex`-guarded
//! struct layout.

use crate::config::{MAX_PAGES, OS_GROWTH_PAGES, PAGE_NUM, PAGE_SHIFT};
use crate::pagemap::PageMap;
use crate::platform;
use crate::span::{alloc_span, dealloc_span, Span, SpanList};
use crate::stats::{stat_add, stat_inc};
use crate::sync::SpinMutex;
use std::ptr::NonNull;

/// `buckets[k]` holds free spans of exactly `k` pages. Index 0 unused.
type Buckets = [SpanList; PAGE_NUM];

/// Singleton page cache.
///
/// `buckets` is guarded by `page_mtx`; `page_map` is not — every `set` call
/// happens with `page_mtx` held by the caller (serializing writes), while
/// `get` is lock-free by construction (spec §4.3), so `map_object_to_span`
/// never has to contend with an in-progress split or coalesce.
pub struct PageHeap {
    buckets: SpinMutex<Buckets>,
    page_map: PageMap,
}

impl PageHeap {
    pub fn new() -> Self {
        Self {
            buckets: SpinMutex::new(std::array::from_fn(|_| SpanList::new())),
            page_map: PageMap::new(),
        }
    }

    /// Obtain a span of exactly `k` pages (`1 <= k <= MAX_PAGES`).
    pub fn new_span(&self, k: usize) -> NonNull<Span> {
        debug_assert!(k > 0 && k <= MAX_PAGES);
        let mut buckets = self.buckets.lock();
        self.new_span_locked(&mut buckets, k)
    }

    fn new_span_locked(&self, buckets: &mut Buckets, k: usize) -> NonNull<Span> {
        // (1) an exact-size bucket is non-empty.
        if let Some(span) = buckets[k].pop_front() {
            unsafe {
                let s = span.as_ref();
                for i in 0..s.n {
                    self.page_map.set(s.page_id + i, span);
                }
            }
            return span;
        }

        // (2) split the smallest larger bucket that has a span.
        for i in (k + 1)..PAGE_NUM {
            if let Some(n_span) = buckets[i].pop_front() {
                let (page_id, n) = unsafe {
                    let s = n_span.as_ref();
                    (s.page_id, s.n)
                };
                let k_span = alloc_span(page_id, k);
                unsafe {
                    let n_ref = &mut *n_span.as_ptr();
                    n_ref.page_id += k;
                    n_ref.n = n - k;
                }
                unsafe { buckets[n - k].push_front(n_span) };
                unsafe {
                    let n_ref = n_span.as_ref();
                    self.page_map.set(n_ref.page_id, n_span);
                    self.page_map.set(n_ref.page_id + n_ref.n - 1, n_span);
                }
                unsafe {
                    let k_ref = k_span.as_ref();
                    for i in 0..k_ref.n {
                        self.page_map.set(k_ref.page_id + i, k_span);
                    }
                }
                stat_inc!(span_splits);
                return k_span;
            }
        }

        // (3) grow from the OS: map a fresh OS_GROWTH_PAGES-page span and retry.
        let ptr = unsafe { platform::system_map_pages(OS_GROWTH_PAGES) };
        assert!(!ptr.is_null(), "page cache: OS page mapping failed");
        stat_inc!(os_alloc_count);
        stat_add!(os_alloc_bytes, OS_GROWTH_PAGES << PAGE_SHIFT);
        let big_span = alloc_span(ptr as usize >> PAGE_SHIFT, OS_GROWTH_PAGES);
        unsafe { buckets[OS_GROWTH_PAGES].push_front(big_span) };
        self.new_span_locked(buckets, k)
    }

    /// Resolve a user pointer to its owning span. Lock-free.
    pub fn map_object_to_span(&self, obj: *const u8) -> Option<NonNull<Span>> {
        let id = (obj as usize) >> PAGE_SHIFT;
        self.page_map.get(id)
    }

    /// Register one page of a span that never enters the bucketed
    /// hierarchy (large-object fast path, spec §4.7). Unlike `new_span`'s
    /// boundary-only registration, every page of a large span must be
    /// registered individually, since it has no sibling to coalesce with
    /// and interior pointers must still resolve on `deallocate`. Safe to
    /// call without `buckets` locked: distinct large spans never share a
    /// page id, so concurrent callers never race on the same key.
    pub fn register_large_span(&self, page_id: usize, span: NonNull<Span>) {
        self.page_map.set(page_id, span);
    }

    /// Return a span with `use_count == 0` to the page cache, coalescing
    /// with free neighbors on both sides.
    pub fn release_span(&self, span: NonNull<Span>) {
        let mut buckets = self.buckets.lock();
        let mut span = span;

        // Coalesce left.
        loop {
            let (page_id, n) = unsafe {
                let s = span.as_ref();
                (s.page_id, s.n)
            };
            if page_id == 0 {
                break;
            }
            let Some(left) = self.page_map.get(page_id - 1) else {
                break;
            };
            let (left_in_use, left_n, left_page_id) = unsafe {
                let l = left.as_ref();
                (l.in_use, l.n, l.page_id)
            };
            if left_in_use || left_n + n > MAX_PAGES {
                break;
            }
            unsafe {
                let s = &mut *span.as_ptr();
                s.page_id = left_page_id;
                s.n += left_n;
            }
            unsafe { buckets[left_n].remove(left) };
            unsafe { dealloc_span(left) };
            stat_inc!(span_coalesces);
        }

        // Coalesce right.
        loop {
            let (page_id, n) = unsafe {
                let s = span.as_ref();
                (s.page_id, s.n)
            };
            let Some(right) = self.page_map.get(page_id + n) else {
                break;
            };
            let (right_in_use, right_n) = unsafe {
                let r = right.as_ref();
                (r.in_use, r.n)
            };
            if right_in_use || right_n + n > MAX_PAGES {
                break;
            }
            unsafe {
                let s = &mut *span.as_ptr();
                s.n += right_n;
            }
            unsafe { buckets[right_n].remove(right) };
            unsafe { dealloc_span(right) };
            stat_inc!(span_coalesces);
        }

        unsafe {
            let s = &mut *span.as_ptr();
            s.in_use = false;
            s.obj_size = 0;
        }
        let (page_id, n) = unsafe {
            let s = span.as_ref();
            (s.page_id, s.n)
        };
        unsafe { buckets[n].push_front(span) };
        self.page_map.set(page_id, span);
        self.page_map.set(page_id + n - 1, span);
    }
}

impl Default for PageHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_span_grows_from_os_and_returns_exact_size() {
        let heap = PageHeap::new();
        let span = heap.new_span(3);
        unsafe {
            assert_eq!(span.as_ref().n, 3);
        }
    }

    #[test]
    fn s5_split_then_coalesce_reforms_full_span() {
        let heap = PageHeap::new();
        let k_span = heap.new_span(3);
        unsafe {
            (*k_span.as_ptr()).in_use = false;
        }
        heap.release_span(k_span);
        let buckets = heap.buckets.lock();
        assert!(!buckets[MAX_PAGES].is_empty());
        assert!(buckets[3].is_empty());
        assert!(buckets[MAX_PAGES - 3].is_empty());
    }

    #[test]
    fn map_object_to_span_resolves_after_new_span() {
        let heap = PageHeap::new();
        let span = heap.new_span(2);
        let page_id = unsafe { span.as_ref().page_id };
        let addr = (page_id << PAGE_SHIFT) as *const u8;
        let found = heap.map_object_to_span(addr).unwrap();
        assert_eq!(found, span);
    }
}
