//! Allocation statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and not
//! used as synchronization primitives; the allocator's own spinlocks provide
//! the ordering guarantees for correctness. Gated by the `stats` feature;
//! with the feature off, [`stat_inc!`]/[`stat_add!`] compile to nothing and
//! the counters are never touched.
//!
//! ```ignore
//! let snap = tieredmalloc::stats::snapshot();
//! println!("allocs: {}", snap.alloc_count);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    pub alloc_count: AtomicU64,
    pub dealloc_count: AtomicU64,
    pub alloc_bytes: AtomicU64,
    pub thread_cache_hits: AtomicU64,
    pub thread_cache_misses: AtomicU64,
    pub central_cache_hits: AtomicU64,
    pub page_heap_allocs: AtomicU64,
    pub large_object_allocs: AtomicU64,
    pub os_alloc_count: AtomicU64,
    pub os_alloc_bytes: AtomicU64,
    pub span_splits: AtomicU64,
    pub span_coalesces: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            dealloc_count: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            thread_cache_hits: AtomicU64::new(0),
            thread_cache_misses: AtomicU64::new(0),
            central_cache_hits: AtomicU64::new(0),
            page_heap_allocs: AtomicU64::new(0),
            large_object_allocs: AtomicU64::new(0),
            os_alloc_count: AtomicU64::new(0),
            os_alloc_bytes: AtomicU64::new(0),
            span_splits: AtomicU64::new(0),
            span_coalesces: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// Increment a counter by 1. No-op unless the `stats` feature is enabled.
macro_rules! stat_inc {
    ($field:ident) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS.$field.fetch_add(1, ::std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Increment a counter by `n`. No-op unless the `stats` feature is enabled.
macro_rules! stat_add {
    ($field:ident, $n:expr) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS.$field.fetch_add($n as u64, ::std::sync::atomic::Ordering::Relaxed);
        }
    };
}

pub(crate) use stat_add;
pub(crate) use stat_inc;

/// A point-in-time snapshot of all allocation statistics.
///
/// Fields are each atomically read, but the snapshot as a whole is not
/// globally consistent across fields — concurrent allocations may race
/// between loads. Sufficient for monitoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub alloc_count: u64,
    pub dealloc_count: u64,
    pub alloc_bytes: u64,
    pub thread_cache_hits: u64,
    pub thread_cache_misses: u64,
    pub central_cache_hits: u64,
    pub page_heap_allocs: u64,
    pub large_object_allocs: u64,
    pub os_alloc_count: u64,
    pub os_alloc_bytes: u64,
    pub span_splits: u64,
    pub span_coalesces: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        dealloc_count: s.dealloc_count.load(Ordering::Relaxed),
        alloc_bytes: s.alloc_bytes.load(Ordering::Relaxed),
        thread_cache_hits: s.thread_cache_hits.load(Ordering::Relaxed),
        thread_cache_misses: s.thread_cache_misses.load(Ordering::Relaxed),
        central_cache_hits: s.central_cache_hits.load(Ordering::Relaxed),
        page_heap_allocs: s.page_heap_allocs.load(Ordering::Relaxed),
        large_object_allocs: s.large_object_allocs.load(Ordering::Relaxed),
        os_alloc_count: s.os_alloc_count.load(Ordering::Relaxed),
        os_alloc_bytes: s.os_alloc_bytes.load(Ordering::Relaxed),
        span_splits: s.span_splits.load(Ordering::Relaxed),
        span_coalesces: s.span_coalesces.load(Ordering::Relaxed),
    }
}
