//! Compile-time layout constants shared by every component.
//!
//! These must stay bit-exact across builds that share a heap: they determine
//! the size-class table, the page-cache bucket count, and the page-map key
//! space. Unlike the teacher's `build.rs`-generated constants, these are
//! plain `pub const`s — the size-class table is fixed by design, not
//! configurable per build.

/// log2 of the page size. 4 KiB pages.
pub const PAGE_SHIFT: usize = 12;
/// Page size in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Largest request served by the three-tier size-class hierarchy.
pub const MAX_BYTES: usize = 256 * 1024;

/// Number of size classes (5 alignment regions: 16 + 56 + 56 + 56 + 24).
pub const FREE_LIST_NUM: usize = 208;

/// Page-cache bucket count. Index 0 is unused; buckets 1..=128 hold spans of
/// that many pages.
pub const PAGE_NUM: usize = 129;
/// Largest span size the three-tier hierarchy manages directly.
pub const MAX_PAGES: usize = PAGE_NUM - 1;

/// Number of pages requested from the OS each time the page cache's top
/// bucket runs dry.
pub const OS_GROWTH_PAGES: usize = MAX_PAGES;
