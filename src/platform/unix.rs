//! Unix virtual memory via raw `mmap`/`munmap` bindings (no `libc` dependency).
//!
//! `PAGE_SIZE` (4 KiB) matches the system mmap granularity on every
//! supported Unix target, so unlike the teacher's 8 KiB `PAGE_SIZE` variant
//! this needs no over-allocate-and-trim dance to guarantee alignment.

use std::ffi::c_void;

const PROT_READ: i32 = 0x1;
const PROT_WRITE: i32 = 0x2;
const MAP_PRIVATE: i32 = 0x02;
const MAP_ANONYMOUS: i32 = 0x20;
const MAP_FAILED: *mut c_void = !0usize as *mut c_void;

unsafe extern "C" {
    fn mmap(
        addr: *mut c_void,
        length: usize,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: i64,
    ) -> *mut c_void;

    fn munmap(addr: *mut c_void, length: usize) -> i32;
}

pub unsafe fn map(size: usize) -> *mut u8 {
    let raw = unsafe {
        mmap(
            std::ptr::null_mut(),
            size,
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == MAP_FAILED {
        return std::ptr::null_mut();
    }
    raw as *mut u8
}

pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    unsafe {
        munmap(ptr as *mut c_void, size);
    }
}
