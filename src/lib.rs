//! tieredmalloc: a tcmalloc-style three-tier concurrent allocator.
//!
//! Three tiers satisfy an allocation, fastest first:
//! - a per-thread cache (no synchronization),
//! - a central cache (one lock per size class),
//! - a page cache (one coarse lock, talks to the OS).
//!
//! A radix-tree page map resolves freed pointers back to their owning span,
//! and a lock-free object pool supplies the `Span` and page-map bookkeeping
//! records so the allocator never recurses into itself.
//!
//! # Usage
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: tieredmalloc::TieredAlloc = tieredmalloc::TieredAlloc;
//! ```

pub mod allocator;
pub mod central_cache;
pub mod config;
pub mod error;
pub mod object_pool;
pub mod page_heap;
pub mod pagemap;
pub mod platform;
pub mod size_class;
pub mod span;
pub mod stats;
pub mod sync;
pub mod thread_cache;

pub use allocator::{allocate, deallocate, TieredAlloc};
pub use config::{FREE_LIST_NUM, MAX_BYTES, MAX_PAGES, PAGE_NUM, PAGE_SHIFT, PAGE_SIZE};
pub use error::TieredAllocError;
