//! Radix-tree page map: resolves a page id to its owning [`Span`] (spec
//! §4.3). Grounded on `original_source/RadixTree.h`'s `TCMalloc_PageMap2`
//! (32-bit, two levels, fully pre-allocated) and `TCMalloc_PageMap3` (64-bit,
//! three levels, lazily allocated), combined with the teacher's
//! `AtomicPtr`-based lock-free-read structure.
//!
//! `set` is always called with the page-cache's `page_mtx` held, so writes
//! are serialized by the caller; `get` never takes a lock and may run
//! concurrently with a `set` in progress — each level is published with a
//! single `Release` store, so a reader either sees the old (null) pointer
//! or the fully-constructed new node, never a partially-built one.

use crate::object_pool::ObjectPool;
use crate::span::Span;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

#[cfg(target_pointer_width = "64")]
pub use sixty_four::PageMap;
#[cfg(target_pointer_width = "32")]
pub use thirty_two::PageMap;

#[cfg(target_pointer_width = "64")]
mod sixty_four {
    use super::*;
    use crate::config::PAGE_SHIFT;

    const ROOT_BITS: u32 = 12;
    const ROOT_LEN: usize = 1 << ROOT_BITS;
    const LEAF_BITS: u32 = 20;
    const LEAF_LEN: usize = 1 << LEAF_BITS;
    const MIDDLE_BITS: u32 = (usize::BITS - PAGE_SHIFT as u32) - ROOT_BITS - LEAF_BITS;
    const MIDDLE_LEN: usize = 1 << MIDDLE_BITS;

    pub struct Leaf {
        values: [AtomicPtr<Span>; LEAF_LEN],
    }

    pub struct Middle {
        values: [AtomicPtr<Leaf>; MIDDLE_LEN],
    }

    static LEAF_POOL: ObjectPool<Leaf> = ObjectPool::new();
    static MIDDLE_POOL: ObjectPool<Middle> = ObjectPool::new();

    /// Three-level radix tree over the 64-bit page-id space.
    pub struct PageMap {
        root: Box<[AtomicPtr<Middle>]>,
    }

    impl PageMap {
        pub fn new() -> Self {
            let mut v = Vec::with_capacity(ROOT_LEN);
            v.resize_with(ROOT_LEN, || AtomicPtr::new(std::ptr::null_mut()));
            Self {
                root: v.into_boxed_slice(),
            }
        }

        #[inline]
        fn split(key: usize) -> (usize, usize, usize) {
            let i1 = key >> (LEAF_BITS + MIDDLE_BITS);
            let i2 = (key >> LEAF_BITS) & (MIDDLE_LEN - 1);
            let i3 = key & (LEAF_LEN - 1);
            (i1, i2, i3)
        }

        /// Lock-free lookup. Returns `None` if `key` has never been `set`.
        pub fn get(&self, key: usize) -> Option<NonNull<Span>> {
            let (i1, i2, i3) = Self::split(key);
            if i1 >= self.root.len() {
                return None;
            }
            let middle = self.root[i1].load(Ordering::Acquire);
            let middle = unsafe { middle.as_ref() }?;
            let leaf = middle.values[i2].load(Ordering::Acquire);
            let leaf = unsafe { leaf.as_ref() }?;
            NonNull::new(leaf.values[i3].load(Ordering::Acquire))
        }

        /// Store `value` at `key`, allocating intermediate nodes as needed.
        ///
        /// Caller must serialize concurrent `set` calls (the page cache does
        /// this via `page_mtx`).
        pub fn set(&self, key: usize, value: NonNull<Span>) {
            let (i1, i2, i3) = Self::split(key);
            assert!(i1 < self.root.len(), "page id out of range");

            let mut middle = self.root[i1].load(Ordering::Acquire);
            if middle.is_null() {
                let fresh = MIDDLE_POOL.allocate();
                unsafe {
                    fresh
                        .as_ptr()
                        .write(Middle {
                            values: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
                        })
                };
                middle = fresh.as_ptr();
                self.root[i1].store(middle, Ordering::Release);
            }
            let middle = unsafe { &*middle };

            let mut leaf = middle.values[i2].load(Ordering::Acquire);
            if leaf.is_null() {
                let fresh = LEAF_POOL.allocate();
                unsafe {
                    fresh
                        .as_ptr()
                        .write(Leaf {
                            values: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
                        })
                };
                leaf = fresh.as_ptr();
                middle.values[i2].store(leaf, Ordering::Release);
            }
            let leaf = unsafe { &*leaf };

            leaf.values[i3].store(value.as_ptr(), Ordering::Release);
        }
    }

    impl Default for PageMap {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(target_pointer_width = "32")]
mod thirty_two {
    use super::*;
    use crate::config::PAGE_SHIFT;

    const ROOT_BITS: u32 = 5;
    const ROOT_LEN: usize = 1 << ROOT_BITS;
    const LEAF_BITS: u32 = (usize::BITS - PAGE_SHIFT as u32) - ROOT_BITS;
    const LEAF_LEN: usize = 1 << LEAF_BITS;

    pub struct Leaf {
        values: [AtomicPtr<Span>; LEAF_LEN],
    }

    static LEAF_POOL: ObjectPool<Leaf> = ObjectPool::new();

    /// Two-level radix tree over the 32-bit page-id space. All leaves are
    /// pre-allocated at construction (a few MiB), so `get` and `set` never
    /// need to check for a missing node.
    pub struct PageMap {
        root: Box<[AtomicPtr<Leaf>]>,
    }

    impl PageMap {
        pub fn new() -> Self {
            let mut v = Vec::with_capacity(ROOT_LEN);
            for _ in 0..ROOT_LEN {
                let fresh = LEAF_POOL.allocate();
                unsafe {
                    fresh
                        .as_ptr()
                        .write(Leaf {
                            values: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
                        })
                };
                v.push(AtomicPtr::new(fresh.as_ptr()));
            }
            Self {
                root: v.into_boxed_slice(),
            }
        }

        #[inline]
        fn split(key: usize) -> (usize, usize) {
            (key >> LEAF_BITS, key & (LEAF_LEN - 1))
        }

        pub fn get(&self, key: usize) -> Option<NonNull<Span>> {
            let (i1, i2) = Self::split(key);
            if i1 >= self.root.len() {
                return None;
            }
            let leaf = self.root[i1].load(Ordering::Acquire);
            let leaf = unsafe { leaf.as_ref() }?;
            NonNull::new(leaf.values[i2].load(Ordering::Acquire))
        }

        pub fn set(&self, key: usize, value: NonNull<Span>) {
            let (i1, i2) = Self::split(key);
            assert!(i1 < self.root.len(), "page id out of range");
            let leaf = self.root[i1].load(Ordering::Acquire);
            let leaf = unsafe { &*leaf };
            leaf.values[i2].store(value.as_ptr(), Ordering::Release);
        }
    }

    impl Default for PageMap {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::alloc_span;

    #[test]
    fn unset_key_returns_none() {
        let map = PageMap::new();
        assert!(map.get(12345).is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let map = PageMap::new();
        let span = alloc_span(42, 1);
        map.set(42, span);
        assert_eq!(map.get(42), Some(span));
        assert!(map.get(43).is_none());
    }

    #[test]
    fn overwriting_a_key_replaces_the_value() {
        let map = PageMap::new();
        let a = alloc_span(7, 1);
        let b = alloc_span(8, 1);
        map.set(100, a);
        map.set(100, b);
        assert_eq!(map.get(100), Some(b));
    }

    #[test]
    fn many_sparse_keys_are_independent() {
        let map = PageMap::new();
        let mut spans = Vec::new();
        for i in 0..1000usize {
            let key = i * 10_007; // sparse, forces distinct middle/leaf nodes
            let span = alloc_span(key, 1);
            map.set(key, span);
            spans.push((key, span));
        }
        for (key, span) in spans {
            assert_eq!(map.get(key), Some(span));
        }
    }
}
