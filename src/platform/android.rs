// ── Android backend ───────────────────────────────────────────────────────────
//
// Regions are ashmem file descriptors created through the `/dev/ashmem`
// ioctl interface; mapping and handle management are the plain fd paths.

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

const ASHMEM_DEVICE: &[u8] = b"/dev/ashmem\0";
const ASHMEM_NAME_LEN: usize = 256;

// _IOW(__ASHMEMIOC, nr, type) from <linux/ashmem.h>.
const ASHMEMIOC: u32 = 0x77;

const fn iow(nr: u32, size: usize) -> u32 {
    (1 << 30) | ((size as u32) << 16) | (ASHMEMIOC << 8) | nr
}

const ASHMEM_SET_NAME: u32 = iow(1, ASHMEM_NAME_LEN);
const ASHMEM_SET_SIZE: u32 = iow(3, std::mem::size_of::<usize>());
const ASHMEM_SET_PROT_MASK: u32 = iow(5, std::mem::size_of::<libc::c_ulong>());

/// The only handle kind on Android.
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

pub(crate) fn allocate(size: usize, opts: &RegionOptions) -> Result<NativeHandle> {
    let region_size = page_align(size, fd::page_size())?;
    let region = create_region(&opts.name, region_size)?;
    set_prot_region(&region, libc::PROT_READ | libc::PROT_WRITE)?;
    tracing::debug!(size, region_size, fd = region.as_raw_fd(), "allocated ashmem region");
    Ok(NativeHandle::from(region))
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

// ── ashmem ioctls ─────────────────────────────────────────────────────────────

fn create_region(name: &str, size: usize) -> Result<OwnedFd> {
    // SAFETY: ASHMEM_DEVICE is a NUL-terminated path.
    let raw = unsafe {
        libc::open(
            ASHMEM_DEVICE.as_ptr().cast(),
            libc::O_RDWR | libc::O_CLOEXEC,
        )
    };
    if raw < 0 {
        return Err(Error::last_os("open(/dev/ashmem)"));
    }
    // SAFETY: open just returned this descriptor; the OwnedFd closes it on
    // every early return below.
    let region = unsafe { OwnedFd::from_raw_fd(raw) };

    let name = region_name(name, ASHMEM_NAME_LEN - 1);
    let mut buf = [0u8; ASHMEM_NAME_LEN];
    buf[..name.len()].copy_from_slice(name.as_bytes());

    // SAFETY: ASHMEM_SET_NAME reads exactly ASHMEM_NAME_LEN bytes from `buf`.
    if unsafe { libc::ioctl(region.as_raw_fd(), ASHMEM_SET_NAME as _, buf.as_ptr()) } < 0 {
        return Err(Error::last_os("ioctl(ASHMEM_SET_NAME)"));
    }
    // SAFETY: ASHMEM_SET_SIZE takes the size by value.
    if unsafe { libc::ioctl(region.as_raw_fd(), ASHMEM_SET_SIZE as _, size) } < 0 {
        return Err(Error::last_os("ioctl(ASHMEM_SET_SIZE)"));
    }
    Ok(region)
}

fn set_prot_region(region: &OwnedFd, prot: libc::c_int) -> Result<()> {
    let prot = prot as libc::c_ulong;
    // SAFETY: ASHMEM_SET_PROT_MASK takes the mask by value; `region` is a
    // live ashmem descriptor.
    if unsafe { libc::ioctl(region.as_raw_fd(), ASHMEM_SET_PROT_MASK as _, prot) } < 0 {
        return Err(Error::last_os("ioctl(ASHMEM_SET_PROT_MASK)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_match_kernel_header() {
        assert_eq!(ASHMEM_SET_NAME, 0x4100_7701);
        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(ASHMEM_SET_SIZE, 0x4008_7703);
            assert_eq!(ASHMEM_SET_PROT_MASK, 0x4008_7705);
        }
        #[cfg(target_pointer_width = "32")]
        {
            assert_eq!(ASHMEM_SET_SIZE, 0x4004_7703);
            assert_eq!(ASHMEM_SET_PROT_MASK, 0x4004_7705);
        }
    }

    #[test]
    fn awkward_names_still_allocate() {
        for name in ["a\0b".to_owned(), "n".repeat(300)] {
            let opts = RegionOptions {
                name,
                ..RegionOptions::default()
            };
            let handle = allocate(64, &opts).expect("allocate");
            close(handle);
        }
    }
}
