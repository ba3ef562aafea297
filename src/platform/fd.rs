// ── File-descriptor helpers ───────────────────────────────────────────────────
//
// Shared by every backend whose regions (or some handle kinds) are plain file
// descriptors: linux memfd, android ashmem, and fd-kind handles on macOS.

#![allow(unsafe_code)]

use std::{os::fd::RawFd, ptr::NonNull};

use crate::error::{Error, Result};

pub(crate) fn is_valid(fd: RawFd) -> bool {
    fd >= 0
}

/// Close `fd`, logging (not returning) any failure.
pub(crate) fn close(fd: RawFd) {
    // SAFETY: the caller owns `fd` and gives it up here; nothing else closes
    // the same descriptor number afterwards.
    if unsafe { libc::close(fd) } != 0 {
        tracing::warn!(fd, error = %std::io::Error::last_os_error(), "close failed");
    }
}

/// `dup(2)`.  Unlike a bare `dup`, a `-1` return is reported as an error
/// rather than wrapped as a new (invalid) handle.
pub(crate) fn dup(fd: RawFd) -> Result<RawFd> {
    // SAFETY: dup only reads the descriptor table; `fd` is owned by the
    // caller's OsHandle for the duration of the call.
    match unsafe { libc::dup(fd) } {
        -1 => Err(Error::last_os("dup")),
        new_fd => Ok(new_fd),
    }
}

/// Map `size` bytes of `fd` from offset 0, shared and read/write.
pub(crate) fn mmap_shared(fd: RawFd, size: usize) -> Result<NonNull<u8>> {
    // SAFETY: a null hint lets the kernel pick the address, so no existing
    // mapping is replaced.  `fd` stays open for the duration of the call.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(Error::last_os("mmap"));
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| Error::last_os("mmap"))
}

/// Unmap a range returned by [`mmap_shared`].
///
/// # Safety
/// `base`/`size` must describe a live mapping that no reference outlives.
pub(crate) unsafe fn munmap(base: NonNull<u8>, size: usize) {
    // SAFETY: guaranteed by the caller.
    if unsafe { libc::munmap(base.as_ptr().cast(), size) } != 0 {
        tracing::warn!(size, error = %std::io::Error::last_os_error(), "munmap failed");
    }
}

/// The system page size.
#[cfg_attr(target_os = "macos", allow(dead_code))]
pub(crate) fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n > 0 {
        n as usize
    } else {
        4096
    }
}
