// ── Mapping ───────────────────────────────────────────────────────────────────
//
// An active read/write mapping produced by `Memory::map`.  It owns the
// address range only: the `Memory` (and its handle) may be closed while the
// mapping is alive, exactly as with mmap + close on POSIX.
//
// This module owns a raw address range, so `unsafe` is permitted here.
// Every `unsafe` block MUST carry a `// SAFETY:` comment.

#![allow(unsafe_code)]

use std::{
    ptr::NonNull,
    slice,
    sync::atomic::{AtomicU8, Ordering},
};

use crate::platform;

/// A mapped view of a shared-memory region.
///
/// The bytes are shared with every other mapping of the same region, in this
/// process or another.  Nothing here synchronizes access to them.
#[derive(Debug, Default)]
pub struct Mapping {
    base: Option<NonNull<u8>>,
    size: usize,
}

// SAFETY: the mapping is an owned address range with no thread affinity;
// unmapping from another thread is fine on every backend.
unsafe impl Send for Mapping {}
// SAFETY: `&Mapping` only hands out `&[AtomicU8]`; plain slices need `unsafe`.
unsafe impl Sync for Mapping {}

impl Mapping {
    /// Adopt an established mapping of `size` bytes at `base`.
    ///
    /// # Safety
    /// `base` must be the start of a live mapping of at least `size` bytes
    /// made by `platform::map` and owned by nothing else.
    pub(crate) unsafe fn from_raw_parts(base: NonNull<u8>, size: usize) -> Self {
        Self {
            base: Some(base),
            size,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.base.is_some()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The start of the mapping, or null when invalid.
    pub fn base(&self) -> *mut u8 {
        self.base.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// The mapped bytes, as atomics.  Empty when invalid.
    ///
    /// Other mappings of the region (here or in another process) may write
    /// these bytes at any time, so they are only reachable through atomic
    /// loads and stores.
    pub fn bytes(&self) -> &[AtomicU8] {
        match self.base {
            // SAFETY: `base` maps `size` read/write bytes for as long as
            // `self` lives, and the returned slice borrows `self`.  AtomicU8
            // has the layout of u8, and concurrent writers are tolerated.
            Some(base) => unsafe {
                slice::from_raw_parts(base.as_ptr().cast::<AtomicU8>(), self.size)
            },
            None => &[],
        }
    }

    /// Read one byte.
    ///
    /// # Panics
    /// If `offset` is out of bounds.
    pub fn load(&self, offset: usize) -> u8 {
        self.bytes()[offset].load(Ordering::Relaxed)
    }

    /// Write one byte.
    ///
    /// # Panics
    /// If `offset` is out of bounds.
    pub fn store(&self, offset: usize, value: u8) {
        self.bytes()[offset].store(value, Ordering::Relaxed);
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// # Panics
    /// If the range is out of bounds.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let src = &self.bytes()[offset..offset + buf.len()];
        for (dst, src) in buf.iter_mut().zip(src) {
            *dst = src.load(Ordering::Relaxed);
        }
    }

    /// Copy `data` into the mapping starting at `offset`.
    ///
    /// # Panics
    /// If the range is out of bounds.
    pub fn write_at(&self, offset: usize, data: &[u8]) {
        let dst = &self.bytes()[offset..offset + data.len()];
        for (dst, &b) in dst.iter().zip(data) {
            dst.store(b, Ordering::Relaxed);
        }
    }

    /// The mapped bytes as a plain slice.  Empty when invalid.
    ///
    /// # Safety
    /// No other mapping of the region, in this process or another, may write
    /// to it while the returned slice is alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        match self.base {
            // SAFETY: bounds as for `bytes`; the caller rules out writers.
            Some(base) => unsafe { slice::from_raw_parts(base.as_ptr(), self.size) },
            None => &[],
        }
    }

    /// The mapped bytes as a plain mutable slice.  Empty when invalid.
    ///
    /// # Safety
    /// No other mapping of the region, in this process or another, may read
    /// or write it while the returned slice is alive.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.base {
            // SAFETY: bounds as for `bytes`; `&mut self` excludes borrows
            // through this mapping and the caller rules out the others.
            Some(base) => unsafe { slice::from_raw_parts_mut(base.as_ptr(), self.size) },
            None => &mut [],
        }
    }

    /// The base address reinterpreted as `*mut T`.
    ///
    /// No size or alignment check is made; dereferencing is the caller's
    /// responsibility.
    pub fn as_ptr<T>(&self) -> *mut T {
        self.base().cast()
    }

    /// Move the mapping out, leaving `self` invalid.
    pub fn take(&mut self) -> Self {
        Self {
            base: self.base.take(),
            size: std::mem::take(&mut self.size),
        }
    }

    /// Unmap.  Safe to call repeatedly.
    pub fn reset(&mut self) {
        if let Some(base) = self.base.take() {
            // SAFETY: `base`/`size` came from `platform::map` and this was
            // the only owner; every slice handed out borrowed `self`, so none
            // is still alive.
            unsafe { platform::unmap(base, self.size) };
            tracing::debug!(size = self.size, "unmapped region");
            self.size = 0;
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        self.reset();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
