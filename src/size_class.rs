//! Size class arithmetic (spec §4.1).
//!
//! 208 size classes across five alignment regions. Grounded directly on
//! `original_source/Common.h`'s `SizeClass::RoundUp`/`Index`/`NumMoveSize`/
//! `NumMovePage` — the region boundaries and `group_array = {16, 56, 56, 56}`
//! bucket counts must stay bit-exact so that a pointer freed by one build is
//! understood by another; this is not a tunable.
//!
//! The (1024, 8192] region uses a 128-byte bucket width here, not the
//! 64-byte width its `RoundUp` nominally suggests: the source's `Index`
//! function buckets that region in 128-byte steps (`_Index(.., 7)`) while
//! its `RoundUp` rounds to 64-byte steps, so two distinct 64-rounded sizes
//! can collide into a single bucket — the central cache would then carve
//! and return wrong-sized objects for whichever size loses the race. 128 is
//! made authoritative for both functions here, the same fix that keeps
//! `FREE_LIST_NUM` at exactly 208 (see DESIGN.md).

use crate::config::{MAX_BYTES, PAGE_SHIFT};

/// Cumulative bucket counts per region, ascending: [1,128], (128,1024],
/// (1024,8Ki], (8Ki,64Ki], (64Ki,256Ki].
const GROUP_SIZES: [usize; 4] = [16, 56, 56, 56];

#[inline]
const fn round_up_to(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

#[inline]
const fn index_within(size: usize, align_shift: u32) -> usize {
    ((size + (1 << align_shift) - 1) >> align_shift) - 1
}

/// Round a request up to its size class's byte size.
///
/// `size` must be in `1..=MAX_BYTES`.
pub fn round_up(size: usize) -> usize {
    debug_assert!(size >= 1 && size <= MAX_BYTES);
    if size <= 128 {
        round_up_to(size, 8)
    } else if size <= 1024 {
        round_up_to(size, 16)
    } else if size <= 8 * 1024 {
        round_up_to(size, 128)
    } else if size <= 64 * 1024 {
        round_up_to(size, 1024)
    } else {
        round_up_to(size, 8 * 1024)
    }
}

/// Map a request size to its size-class bucket index (`0..FREE_LIST_NUM`).
///
/// `size` must be in `1..=MAX_BYTES`.
pub fn index(size: usize) -> usize {
    debug_assert!(size >= 1 && size <= MAX_BYTES);
    if size <= 128 {
        index_within(size, 3)
    } else if size <= 1024 {
        GROUP_SIZES[0] + index_within(size - 128, 4)
    } else if size <= 8 * 1024 {
        GROUP_SIZES[0] + GROUP_SIZES[1] + index_within(size - 1024, 7)
    } else if size <= 64 * 1024 {
        GROUP_SIZES[0] + GROUP_SIZES[1] + GROUP_SIZES[2] + index_within(size - 8 * 1024, 10)
    } else {
        GROUP_SIZES[0]
            + GROUP_SIZES[1]
            + GROUP_SIZES[2]
            + GROUP_SIZES[3]
            + index_within(size - 64 * 1024, 13)
    }
}

/// Number of size classes. `16 + 56*3 + 24 == 208`.
pub const NUM_SIZE_CLASSES: usize = GROUP_SIZES[0] + GROUP_SIZES[1] * 3 + 24;

/// Byte size of a size class's elements, given its bucket index.
///
/// Computed by rounding the smallest size that maps to `idx` up through
/// `round_up`, i.e. this is the inverse of `index`.
pub fn class_to_size(idx: usize) -> usize {
    debug_assert!(idx < NUM_SIZE_CLASSES);
    // Binary search the boundary: idx determines both the region and the
    // position within it, so we can compute the size directly per region.
    let g0 = GROUP_SIZES[0];
    let g1 = g0 + GROUP_SIZES[1];
    let g2 = g1 + GROUP_SIZES[1];
    let g3 = g2 + GROUP_SIZES[1];
    if idx < g0 {
        (idx + 1) * 8
    } else if idx < g1 {
        128 + (idx - g0 + 1) * 16
    } else if idx < g2 {
        1024 + (idx - g1 + 1) * 128
    } else if idx < g3 {
        8 * 1024 + (idx - g2 + 1) * 1024
    } else {
        64 * 1024 + (idx - g3 + 1) * 8 * 1024
    }
}

/// Upper bound on objects moved in one batch between a thread cache and the
/// central cache for a given size-class byte size.
pub fn num_move_size(size: usize) -> usize {
    debug_assert!(size > 0);
    (MAX_BYTES / size).clamp(2, 512)
}

/// Pages the central cache should request from the page cache when it needs
/// a fresh span for this size class.
pub fn num_move_page(size: usize) -> usize {
    let num = num_move_size(size);
    let npage = (num * size) >> PAGE_SHIFT;
    npage.max(1)
}

/// Fast lookup table for small sizes (<=1024 bytes), indexed by
/// `(size - 1) / 8`, giving the bucket index directly without branching
/// through `index`'s region checks.
const SMALL_LOOKUP_MAX: usize = 1024;
static SMALL_LOOKUP: [u16; SMALL_LOOKUP_MAX / 8] = build_small_lookup();

const fn build_small_lookup() -> [u16; SMALL_LOOKUP_MAX / 8] {
    let mut table = [0u16; SMALL_LOOKUP_MAX / 8];
    let mut i = 0;
    while i < table.len() {
        let size = (i + 1) * 8;
        let idx = if size <= 128 {
            index_within(size, 3)
        } else {
            GROUP_SIZES[0] + index_within(size - 128, 4)
        };
        table[i] = idx as u16;
        i += 1;
    }
    table
}

/// Map a request size to its bucket index, using the small-size lookup
/// table when it applies.
pub fn index_fast(size: usize) -> usize {
    debug_assert!(size >= 1 && size <= MAX_BYTES);
    if size <= SMALL_LOOKUP_MAX {
        let rounded = round_up(size);
        SMALL_LOOKUP[(rounded - 1) / 8] as usize
    } else {
        index(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_bucket_count_is_208() {
        assert_eq!(NUM_SIZE_CLASSES, 208);
    }

    #[test]
    fn round_up_matches_region_alignment() {
        assert_eq!(round_up(1), 8);
        assert_eq!(round_up(6), 8);
        assert_eq!(round_up(7), 8);
        assert_eq!(round_up(129), 144);
        assert_eq!(round_up(1025), 1024 + 128);
        assert_eq!(round_up(8 * 1024 + 1), 8 * 1024 + 1024);
        assert_eq!(round_up(64 * 1024 + 1), 64 * 1024 + 8 * 1024);
        assert_eq!(round_up(MAX_BYTES), MAX_BYTES);
    }

    #[test]
    fn index_is_monotonic_and_in_range() {
        let mut last = None;
        for size in 1..=MAX_BYTES {
            let i = index(size);
            assert!(i < NUM_SIZE_CLASSES);
            if let Some(l) = last {
                assert!(i >= l);
            }
            last = Some(i);
        }
    }

    #[test]
    fn class_to_size_is_inverse_of_index() {
        for idx in 0..NUM_SIZE_CLASSES {
            let size = class_to_size(idx);
            assert_eq!(index(size), idx);
            assert_eq!(round_up(size), size);
        }
    }

    #[test]
    fn small_lookup_matches_index() {
        for size in 1..=1024usize {
            assert_eq!(index_fast(size), index(size));
        }
    }

    #[test]
    fn s1_first_refill_batches_one_then_two() {
        // S1: fresh thread, allocate(6) maps to size class 8.
        let aligned = round_up(6);
        assert_eq!(aligned, 8);
        // num_move_size(8) = clamp(262144/8, 2, 512) = 512, but slow-start
        // means the *cache's* max_size grows 1, 2, 3, ... — exercised in
        // thread_cache tests, not here.
        assert_eq!(num_move_size(aligned), 512);
    }

    #[test]
    fn s2_large_request_page_count() {
        let size = 129 * 1024;
        let rounded = round_up(size);
        assert_eq!(rounded, 136 * 1024);
        assert_eq!(num_move_size(rounded), 2);
        assert_eq!(num_move_page(rounded), 68);
    }
}
