//! A fixed-type, lock-free object pool used to host the allocator's own
//! bookkeeping records (`Span`, radix-tree internal nodes) without
//! recursing into the allocator itself (spec §4.2).
//!
//! Grounded on `original_source/ObjectPool.h`'s `lockfree::ObjectPool<T>`:
//! a single tagged atomic word holds the free-list head — the low 48 bits
//! are the pointer, the high 16 are a generation counter bumped on every
//! push/pop, closing the ABA window on architectures with 48-bit canonical
//! addresses. Chunk growth (rare, amortized) is guarded by a short-lived
//! spinlock; the fast path (push/pop of a freed slot) never blocks.

use crate::platform;
use crate::sync::SpinMutex;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

const PTR_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const ABA_INC: u64 = 1 << 48;
const ABA_MASK: u64 = 0xFFFF << 48;

/// Bytes per backing chunk. Large enough to amortize the chunk-growth lock
/// over many slot allocations.
const CHUNK_BYTES: usize = 128 * 1024;

struct ChunkState {
    /// Next unused byte in the current chunk.
    cursor: *mut u8,
    /// Bytes remaining in the current chunk.
    remaining: usize,
}

unsafe impl Send for ChunkState {}

/// A pool of fixed-size `T` slots, fed by OS pages, with a lock-free LIFO
/// free-list layered on top of chunked bump allocation.
///
/// `T` must be at least pointer-sized: a freed slot's storage is reused to
/// hold the free-list's `next` link until the slot is handed out again.
pub struct ObjectPool<T> {
    chunk: SpinMutex<ChunkState>,
    free_head: AtomicU64,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for ObjectPool<T> {}
unsafe impl<T: Send> Sync for ObjectPool<T> {}

impl<T> ObjectPool<T> {
    pub const fn new() -> Self {
        Self {
            chunk: SpinMutex::new(ChunkState {
                cursor: std::ptr::null_mut(),
                remaining: 0,
            }),
            free_head: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    /// Allocate one `T`-sized, `T`-aligned slot of uninitialized memory.
    /// The caller is responsible for initializing it before use.
    pub fn allocate(&self) -> NonNull<T> {
        debug_assert!(size_of::<T>() >= size_of::<*mut u8>());
        if let Some(ptr) = self.pop_free() {
            return ptr;
        }
        self.allocate_from_chunk()
    }

    /// Return a slot previously obtained from `allocate` on this pool.
    ///
    /// # Safety
    /// `ptr` must have come from `allocate` on this same pool and must not
    /// be used again until a later `allocate` call returns it.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) {
        self.push_free(ptr);
    }

    fn pop_free(&self) -> Option<NonNull<T>> {
        loop {
            let old = self.free_head.load(Ordering::Acquire);
            let old_ptr = (old & PTR_MASK) as *mut T;
            let Some(head) = NonNull::new(old_ptr) else {
                return None;
            };
            // The freed slot's first word stores the next link.
            let next = unsafe { *(head.as_ptr() as *const u64) } as *mut T;
            let new_tag = old.wrapping_add(ABA_INC) & ABA_MASK;
            let new = new_tag | (next as u64 & PTR_MASK);
            if self
                .free_head
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(head);
            }
        }
    }

    fn push_free(&self, ptr: NonNull<T>) {
        loop {
            let old = self.free_head.load(Ordering::Acquire);
            let old_ptr = (old & PTR_MASK) as *mut T;
            unsafe {
                *(ptr.as_ptr() as *mut u64) = old_ptr as u64;
            }
            let new_tag = old.wrapping_add(ABA_INC) & ABA_MASK;
            let new = new_tag | (ptr.as_ptr() as u64 & PTR_MASK);
            if self
                .free_head
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    #[cold]
    fn allocate_from_chunk(&self) -> NonNull<T> {
        let slot_size = size_of::<T>().max(size_of::<*mut u8>());
        let align = std::mem::align_of::<T>();
        let mut chunk = self.chunk.lock();
        let aligned_cursor = align_up(chunk.cursor as usize, align) as *mut u8;
        let waste = aligned_cursor as usize - chunk.cursor as usize;
        if chunk.remaining < waste + slot_size {
            let pages = (CHUNK_BYTES.max(slot_size) + crate::config::PAGE_SIZE - 1)
                / crate::config::PAGE_SIZE;
            let base = unsafe { platform::system_map_pages(pages) };
            assert!(!base.is_null(), "object pool chunk allocation failed");
            chunk.cursor = base;
            chunk.remaining = pages * crate::config::PAGE_SIZE;
            return self.allocate_from_chunk_locked(&mut chunk, slot_size, align);
        }
        self.allocate_from_chunk_locked(&mut chunk, slot_size, align)
    }

    fn allocate_from_chunk_locked(
        &self,
        chunk: &mut ChunkState,
        slot_size: usize,
        align: usize,
    ) -> NonNull<T> {
        let aligned = align_up(chunk.cursor as usize, align) as *mut u8;
        let waste = aligned as usize - chunk.cursor as usize;
        debug_assert!(chunk.remaining >= waste + slot_size);
        chunk.remaining -= waste + slot_size;
        chunk.cursor = unsafe { aligned.add(slot_size) };
        NonNull::new(aligned as *mut T).expect("chunk cursor must be non-null")
    }
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[repr(align(8))]
    struct Slot {
        a: u64,
        b: u64,
    }

    #[test]
    fn allocate_then_deallocate_reuses_slot() {
        let pool: ObjectPool<Slot> = ObjectPool::new();
        let p1 = pool.allocate();
        unsafe {
            (*p1.as_ptr()).a = 1;
            (*p1.as_ptr()).b = 2;
        }
        unsafe { pool.deallocate(p1) };
        let p2 = pool.allocate();
        assert_eq!(p1, p2);
    }

    #[test]
    fn distinct_live_allocations_are_disjoint() {
        let pool: ObjectPool<Slot> = ObjectPool::new();
        let mut ptrs = Vec::new();
        for _ in 0..10_000 {
            ptrs.push(pool.allocate());
        }
        let mut addrs: Vec<usize> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), ptrs.len());
    }

    #[test]
    fn concurrent_allocate_deallocate() {
        let pool: Arc<ObjectPool<Slot>> = Arc::new(ObjectPool::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..5_000 {
                        let p = pool.allocate();
                        unsafe { (*p.as_ptr()).a = 7 };
                        unsafe { pool.deallocate(p) };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
