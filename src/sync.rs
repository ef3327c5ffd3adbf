//! Spinlock-backed synchronization for the allocator's short critical
//! sections (spec §5): a central-cache bucket lock, the page cache's single
//! `page_mtx`, and an object pool's chunk-growth lock. None of these ever
//! blocks long enough to justify `std::sync::Mutex`'s syscall-capable park
//! path, and `Mutex::new` would itself allocate on some platforms — exactly
//! the kind of recursion the allocator cannot afford.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Test-and-test-and-set spinlock: no state beyond one flag, no waiting
/// queue, no poisoning.
pub struct SpinLock {
    taken: AtomicBool,
}

unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            taken: AtomicBool::new(false),
        }
    }

    /// Block until the lock is held by this caller.
    #[inline]
    pub fn lock(&self) {
        if self.try_lock() {
            return;
        }
        self.spin_until_acquired();
    }

    /// The contended path: spin reading the flag (no cache-line ping-pong
    /// from a failing CAS) until a test-and-set attempt succeeds.
    #[cold]
    fn spin_until_acquired(&self) {
        loop {
            while self.taken.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
            if self.try_lock() {
                return;
            }
        }
    }

    #[inline]
    pub fn unlock(&self) {
        self.taken.store(false, Ordering::Release);
    }

    /// Attempt to acquire without spinning. Returns `false` if already held.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.taken
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// A `Mutex`-shaped wrapper around [`SpinLock`]: `const fn new`, no
/// allocation, safe to park in a `static` (every singleton in this crate —
/// `PageHeap`'s bucket array, `CentralCache`'s 208 lists, `ObjectPool`'s
/// chunk state — is guarded by one of these).
pub struct SpinMutex<T> {
    lock: SpinLock,
    cell: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            lock: SpinLock::new(),
            cell: UnsafeCell::new(value),
        }
    }

    #[inline]
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.lock.lock();
        SpinMutexGuard { owner: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        self.lock.try_lock().then_some(SpinMutexGuard { owner: self })
    }
}

impl<T> Default for SpinMutex<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard returned by [`SpinMutex::lock`]. Releases the underlying
/// [`SpinLock`] when dropped, including on unwind out of a critical section.
pub struct SpinMutexGuard<'a, T> {
    owner: &'a SpinMutex<T>,
}

impl<T> Deref for SpinMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.owner.cell.get() }
    }
}

impl<T> DerefMut for SpinMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.owner.cell.get() }
    }
}

impl<T> Drop for SpinMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.owner.lock.unlock();
    }
}
