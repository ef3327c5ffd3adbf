//! Thread cache (front end): per-thread free lists for lock-free allocation
//! (spec §4.6). One instance lives in thread-local storage per thread; the
//! fast path (cache hit) touches no atomics and takes no lock.
//!
//! Grounded on `original_source/ThreadCache.cpp`'s `Allocate`/`Deallocate`/
//! `FetchFromCentralCache`/`ListTooLong`. The teacher's `src/thread_cache.rs`
//! adds per-CPU sharding, a transfer-cache tier, and a global steal-budget
//! scavenger (`UNCLAIMED_CACHE_SPACE`) — none of which this spec's plain
//! per-thread design calls for, so this module drops back to the simpler
//! original algorithm while keeping the teacher's module naming and
//! `FreeList`/`ThreadCache` split.

use crate::central_cache::CentralCache;
use crate::page_heap::PageHeap;
use crate::size_class::{self, NUM_SIZE_CLASSES};
use crate::stats::stat_inc;
use std::cell::RefCell;
use std::ptr;

/// Per-size-class free list within a thread cache: a singly-linked list
/// threaded through the first machine word of each free object.
struct FreeList {
    head: *mut u8,
    size: u32,
    max_size: u32,
}

impl FreeList {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            size: 0,
            max_size: 1,
        }
    }

    #[inline]
    fn pop(&mut self) -> Option<*mut u8> {
        let obj = self.head;
        if obj.is_null() {
            return None;
        }
        self.head = unsafe { *(obj as *mut *mut u8) };
        self.size -= 1;
        Some(obj)
    }

    #[inline]
    fn push(&mut self, obj: *mut u8) {
        unsafe { *(obj as *mut *mut u8) = self.head };
        self.head = obj;
        self.size += 1;
    }

    /// Push a chain of `count` objects already linked through their first
    /// word, with `head` as the first and a null-terminated tail.
    fn push_chain(&mut self, head: *mut u8, count: u32) {
        if head.is_null() || count == 0 {
            return;
        }
        let mut tail = head;
        loop {
            let next = unsafe { *(tail as *mut *mut u8) };
            if next.is_null() {
                break;
            }
            tail = next;
        }
        unsafe { *(tail as *mut *mut u8) = self.head };
        self.head = head;
        self.size += count;
    }

    /// Pop exactly `count` objects into a null-terminated chain (head, tail).
    fn pop_chain(&mut self, count: u32) -> (*mut u8, *mut u8) {
        let head = self.head;
        let mut tail = ptr::null_mut();
        let mut cur = self.head;
        for _ in 0..count {
            tail = cur;
            cur = unsafe { *(cur as *mut *mut u8) };
        }
        self.head = cur;
        self.size -= count;
        if !tail.is_null() {
            unsafe { *(tail as *mut *mut u8) = ptr::null_mut() };
        }
        (head, tail)
    }
}

/// Per-thread cache: 208 free lists, one per size class.
pub struct ThreadCache {
    lists: [FreeList; NUM_SIZE_CLASSES],
}

impl ThreadCache {
    fn new() -> Self {
        Self {
            lists: [const { FreeList::new() }; NUM_SIZE_CLASSES],
        }
    }

    fn allocate(&mut self, idx: usize, aligned: usize, page_heap: &PageHeap, central: &CentralCache) -> *mut u8 {
        let list = &mut self.lists[idx];
        if let Some(obj) = list.pop() {
            stat_inc!(alloc_count);
            stat_inc!(thread_cache_hits);
            return obj;
        }
        stat_inc!(thread_cache_misses);

        let num_move = size_class::num_move_size(aligned) as u32;
        let mut batch = list.max_size.min(num_move);
        if batch == list.max_size {
            list.max_size += 1;
        }
        batch = batch.max(1);

        let (head, actual) = central.fetch_range(page_heap, batch as usize, aligned);
        if head.is_null() {
            return ptr::null_mut();
        }
        stat_inc!(alloc_count);
        if actual == 1 {
            return head;
        }
        let rest = unsafe { *(head as *mut *mut u8) };
        list.push_chain(rest, actual as u32 - 1);
        head
    }

    fn deallocate(&mut self, idx: usize, aligned: usize, obj: *mut u8, page_heap: &PageHeap, central: &CentralCache) {
        let list = &mut self.lists[idx];
        list.push(obj);
        stat_inc!(dealloc_count);
        if list.size >= list.max_size {
            let to_release = list.max_size;
            let (head, _tail) = list.pop_chain(to_release);
            central.release_range(page_heap, head, aligned);
        }
    }
}

// Thread exit does not flush a thread's cached objects back to the central
// cache; they simply stop being reachable through any thread cache, which
// matches the original's behavior (spec §9) and is accepted as a known
// limitation rather than fixed here.
thread_local! {
    static CACHE: RefCell<ThreadCache> = RefCell::new(ThreadCache::new());
}

/// Allocate `aligned` bytes (already rounded to a size class) for size-class
/// index `idx`, refilling from `central`/`page_heap` on a cache miss.
pub fn allocate(idx: usize, aligned: usize, page_heap: &PageHeap, central: &CentralCache) -> *mut u8 {
    CACHE.with(|c| c.borrow_mut().allocate(idx, aligned, page_heap, central))
}

/// Return `obj` (size-class index `idx`, `aligned` bytes) to the thread
/// cache, draining to `central`/`page_heap` if the list has grown past its
/// current cap.
pub fn deallocate(idx: usize, aligned: usize, obj: *mut u8, page_heap: &PageHeap, central: &CentralCache) {
    CACHE.with(|c| c.borrow_mut().deallocate(idx, aligned, obj, page_heap, central))
}
