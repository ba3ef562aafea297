// ── Linux backend ─────────────────────────────────────────────────────────────
//
// Regions are sealed memfds; handles are plain file descriptors.

#![allow(unsafe_code)]

use std::{
    os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd},
    ptr::NonNull,
};

use super::{fd, page_align, region_name};
use crate::{
    config::RegionOptions,
    error::{Error, Result},
};

/// The only handle kind on Linux.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum NativeHandle {
    Fd(RawFd),
}

impl From<OwnedFd> for NativeHandle {
    fn from(fd: OwnedFd) -> Self {
        Self::Fd(fd.into_raw_fd())
    }
}

pub(crate) fn is_valid(handle: &NativeHandle) -> bool {
    let NativeHandle::Fd(raw) = *handle;
    fd::is_valid(raw)
}

pub(crate) fn close(handle: NativeHandle) {
    let NativeHandle::Fd(raw) = handle;
    fd::close(raw);
}

pub(crate) fn duplicate(handle: &NativeHandle) -> Result<NativeHandle> {
    let NativeHandle::Fd(raw) = *handle;
    fd::dup(raw).map(NativeHandle::Fd)
}

/// Longest name memfd_create accepts (`MFD_NAME_MAX_LEN`), excluding the NUL.
const MEMFD_NAME_MAX: usize = 249;

pub(crate) fn allocate(size: usize, opts: &RegionOptions) -> Result<NativeHandle> {
    let region_size = page_align(size, fd::page_size())?;
    let mut name = region_name(&opts.name, MEMFD_NAME_MAX).into_bytes();
    name.push(0);

    // SAFETY: `name` is NUL-terminated with no interior NUL and outlives the
    // call.
    let raw = unsafe { libc::memfd_create(name.as_ptr().cast(), libc::MFD_ALLOW_SEALING | libc::MFD_CLOEXEC) };
    if raw < 0 {
        return Err(Error::last_os("memfd_create"));
    }
    // SAFETY: memfd_create just returned this descriptor and nothing else owns
    // it.  The OwnedFd closes it on every early return below.
    let memfd = unsafe { OwnedFd::from_raw_fd(raw) };

    let len = libc::off_t::try_from(region_size).map_err(|_| Error::SizeOverflow { size })?;
    // SAFETY: `memfd` is a valid, writable memfd.
    if unsafe { libc::ftruncate(memfd.as_raw_fd(), len) } != 0 {
        return Err(Error::last_os("ftruncate"));
    }

    if opts.seal_shrink {
        // SAFETY: `memfd` was created with MFD_ALLOW_SEALING.
        if unsafe { libc::fcntl(memfd.as_raw_fd(), libc::F_ADD_SEALS, libc::F_SEAL_SHRINK) } != 0 {
            return Err(Error::last_os("fcntl(F_ADD_SEALS)"));
        }
    }

    tracing::debug!(size, region_size, fd = memfd.as_raw_fd(), "allocated memfd region");
    Ok(NativeHandle::from(memfd))
}

pub(crate) fn map(handle: &NativeHandle, size: usize) -> Result<NonNull<u8>> {
    let NativeHandle::Fd(raw) = *handle;
    fd::mmap_shared(raw, size)
}

/// # Safety
/// See [`fd::munmap`].
pub(crate) unsafe fn unmap(base: NonNull<u8>, size: usize) {
    // SAFETY: forwarded from the caller.
    unsafe { fd::munmap(base, size) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seals(handle: &NativeHandle) -> libc::c_int {
        let NativeHandle::Fd(raw) = *handle;
        // SAFETY: `raw` is a live memfd owned by the test.
        unsafe { libc::fcntl(raw, libc::F_GET_SEALS) }
    }

    #[test]
    fn allocation_is_sealed_against_shrinking() {
        let handle = allocate(100, &RegionOptions::default()).expect("allocate");
        assert!(seals(&handle) & libc::F_SEAL_SHRINK != 0);
        close(handle);
    }

    #[test]
    fn seal_can_be_disabled() {
        let opts = RegionOptions {
            seal_shrink: false,
            ..RegionOptions::default()
        };
        let handle = allocate(100, &opts).expect("allocate");
        assert_eq!(seals(&handle) & libc::F_SEAL_SHRINK, 0);
        close(handle);
    }

    /// The kernel object is rounded up to whole pages.
    #[test]
    fn memfd_is_page_sized() {
        let handle = allocate(10, &RegionOptions::default()).expect("allocate");
        let NativeHandle::Fd(raw) = handle;
        // SAFETY: `raw` is a live memfd; `st` is plain data written by fstat.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::fstat(raw, &mut st) }, 0);
        assert_eq!(st.st_size as usize, fd::page_size());
        close(handle);
    }

    #[test]
    fn duplicate_of_closed_fd_is_an_error() {
        let err = duplicate(&NativeHandle::Fd(-1)).unwrap_err();
        assert!(matches!(err, Error::Os { function: "dup", .. }), "got {err:?}");
    }

    fn memfd_name(handle: &NativeHandle) -> String {
        let NativeHandle::Fd(raw) = *handle;
        let target = std::fs::read_link(format!("/proc/self/fd/{raw}")).expect("readlink");
        target.to_string_lossy().into_owned()
    }

    fn named(name: &str) -> RegionOptions {
        RegionOptions {
            name: name.to_owned(),
            ..RegionOptions::default()
        }
    }

    #[test]
    fn interior_nul_is_removed_from_the_name() {
        let handle = allocate(64, &named("a\0b")).expect("allocate");
        assert!(memfd_name(&handle).starts_with("/memfd:ab"), "{}", memfd_name(&handle));
        close(handle);
    }

    /// memfd_create refuses names over 249 bytes with EINVAL.
    #[test]
    fn overlong_name_is_truncated() {
        let handle = allocate(64, &named(&"n".repeat(300))).expect("allocate");
        let expected = format!("/memfd:{}", "n".repeat(MEMFD_NAME_MAX));
        assert!(memfd_name(&handle).starts_with(&expected), "{}", memfd_name(&handle));
        close(handle);
    }
}
