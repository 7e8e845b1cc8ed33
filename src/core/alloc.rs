//! Allocator yang di-inject
//!
//! Semua alokasi dinamis codec (encoded buffer, decoded record, string,
//! list node) lewat satu [`Allocator`]. Bentuknya sengaja mirip C:
//! `release` hanya menerima pointer, tanpa layout.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::c_char;
use std::ptr::{self, NonNull};

use crate::error::{Error, Result};

/// Allocate/release pair used for all dynamic memory.
///
/// Blocks must be aligned for any primitive field (malloc alignment).
pub trait Allocator {
    /// Returns `None` when the request cannot be satisfied.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    /// `ptr` must come from `allocate` on this allocator and must not have
    /// been released already.
    unsafe fn release(&self, ptr: NonNull<u8>);
}

impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline(always)]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    #[inline(always)]
    unsafe fn release(&self, ptr: NonNull<u8>) {
        (**self).release(ptr)
    }
}

/// Allocate or report [`Error::AllocationFailure`]
#[inline]
pub(crate) fn allocate<A: Allocator + ?Sized>(alloc: &A, size: usize) -> Result<NonNull<u8>> {
    match alloc.allocate(size) {
        Some(ptr) => Ok(ptr),
        None => {
            tracing::warn!(size, "allocation failed");
            Err(Error::AllocationFailure { size })
        }
    }
}

/// Platform allocator (malloc/free di unix)
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

#[cfg(unix)]
impl Allocator for System {
    #[inline]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: malloc has no preconditions; zero-sized requests are bumped
        // so a successful call never yields null
        NonNull::new(unsafe { libc::malloc(size.max(1)) }.cast())
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>) {
        libc::free(ptr.as_ptr().cast());
    }
}

/// Size header in front of every block, so `release` can rebuild the layout
#[cfg(not(unix))]
const BLOCK_HEADER: usize = 16;

#[cfg(not(unix))]
impl Allocator for System {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        use std::alloc::{alloc, Layout};

        let total = size.checked_add(BLOCK_HEADER)?;
        let layout = Layout::from_size_align(total, BLOCK_HEADER).ok()?;
        // SAFETY: layout has non-zero size
        let base = NonNull::new(unsafe { alloc(layout) })?;
        unsafe {
            base.as_ptr().cast::<usize>().write(total);
            NonNull::new(base.as_ptr().add(BLOCK_HEADER))
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        use std::alloc::{dealloc, Layout};

        let base = ptr.as_ptr().sub(BLOCK_HEADER);
        let total = base.cast::<usize>().read();
        dealloc(base, Layout::from_size_align_unchecked(total, BLOCK_HEADER));
    }
}

/// Allocator dengan instrumentasi
///
/// Counts allocations and releases, remembers live blocks so a double or
/// foreign release is counted instead of forwarded, and can be told to
/// fail after a fixed number of successful allocations.
#[derive(Debug)]
pub struct Tracking<A = System> {
    inner: A,
    live: RefCell<HashSet<usize>>,
    allocations: Cell<usize>,
    releases: Cell<usize>,
    invalid_releases: Cell<usize>,
    fail_after: Cell<Option<usize>>,
}

impl Default for Tracking<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracking<System> {
    pub fn new() -> Self {
        Self::with(System)
    }
}

impl<A: Allocator> Tracking<A> {
    pub fn with(inner: A) -> Self {
        Self {
            inner,
            live: RefCell::new(HashSet::new()),
            allocations: Cell::new(0),
            releases: Cell::new(0),
            invalid_releases: Cell::new(0),
            fail_after: Cell::new(None),
        }
    }

    /// Fail every request once `n` allocations have succeeded
    pub fn fail_after(self, n: usize) -> Self {
        self.fail_after.set(Some(n));
        self
    }

    /// Lift a previously configured failure point
    pub fn stop_failing(&self) {
        self.fail_after.set(None);
    }

    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    /// Blocks allocated and not yet released
    pub fn live(&self) -> usize {
        self.live.borrow().len()
    }

    /// Releases of pointers that were not live (double or foreign frees)
    pub fn invalid_releases(&self) -> usize {
        self.invalid_releases.get()
    }
}

impl<A: Allocator> Allocator for Tracking<A> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if let Some(limit) = self.fail_after.get() {
            if self.allocations.get() >= limit {
                return None;
            }
        }

        let ptr = self.inner.allocate(size)?;
        self.live.borrow_mut().insert(ptr.as_ptr() as usize);
        self.allocations.set(self.allocations.get() + 1);
        Some(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        if self.live.borrow_mut().remove(&(ptr.as_ptr() as usize)) {
            self.releases.set(self.releases.get() + 1);
            self.inner.release(ptr);
        } else {
            self.invalid_releases.set(self.invalid_releases.get() + 1);
        }
    }
}

/// Copy `bytes` ke string baru ber-NUL milik `alloc`
pub fn new_string<A: Allocator + ?Sized>(bytes: &[u8], alloc: &A) -> Result<NonNull<c_char>> {
    let dest = allocate(alloc, bytes.len() + 1)?;
    // SAFETY: dest holds len + 1 bytes and cannot overlap a live borrow
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), dest.as_ptr(), bytes.len());
        dest.as_ptr().add(bytes.len()).write(0);
    }
    Ok(dest.cast())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_tracking_counts() {
        let alloc = Tracking::new();

        let a = alloc.allocate(16).unwrap();
        let b = alloc.allocate(0).unwrap();
        assert_eq!(alloc.allocations(), 2);
        assert_eq!(alloc.live(), 2);

        unsafe {
            alloc.release(a);
            alloc.release(b);
        }
        assert_eq!(alloc.releases(), 2);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_double_release_is_counted() {
        let alloc = Tracking::new();
        let a = alloc.allocate(8).unwrap();

        unsafe {
            alloc.release(a);
            alloc.release(a);
        }
        assert_eq!(alloc.releases(), 1);
        assert_eq!(alloc.invalid_releases(), 1);
    }

    #[test]
    fn test_fail_after() {
        let alloc = Tracking::new().fail_after(1);

        let a = alloc.allocate(8).unwrap();
        assert!(alloc.allocate(8).is_none());

        alloc.stop_failing();
        let b = alloc.allocate(8).unwrap();
        unsafe {
            alloc.release(a);
            alloc.release(b);
        }
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_new_string() {
        let alloc = Tracking::new();
        let s = new_string(b"hello", &alloc).unwrap();

        let copied = unsafe { CStr::from_ptr(s.as_ptr()) };
        assert_eq!(copied.to_bytes(), b"hello");

        unsafe { alloc.release(s.cast()) };
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_new_string_failure() {
        let alloc = Tracking::new().fail_after(0);
        let err = new_string(b"abc", &alloc).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure { size: 4 }));
    }
}
