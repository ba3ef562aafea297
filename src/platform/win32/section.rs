// ── File-mapping sections ─────────────────────────────────────────────────────
//
// Sections are created unnamed and pagefile-backed.  The handle returned to
// callers holds FILE_MAP_READ | FILE_MAP_WRITE and nothing else.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{DUPLICATE_HANDLE_OPTIONS, INVALID_HANDLE_VALUE},
        System::Memory::{
            CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_READ, FILE_MAP_WRITE,
            MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
        },
    },
};

use super::handle::{close, duplicate_with_access, NativeHandle};
use crate::{
    config::RegionOptions,
    error::{Error, Result},
};

pub(crate) fn allocate(size: usize, _opts: &RegionOptions) -> Result<NativeHandle> {
    let size64 = size as u64;
    // SAFETY: INVALID_HANDLE_VALUE requests a pagefile-backed section; no
    // security attributes and no name are passed.
    let section = unsafe {
        CreateFileMappingW(
            INVALID_HANDLE_VALUE,
            None,
            PAGE_READWRITE,
            (size64 >> 32) as u32,
            size64 as u32,
            PCWSTR::null(),
        )
    }
    .map_err(|e| Error::win32("CreateFileMappingW", e))?;

    // The creator's handle carries rights such as WRITE_DAC that sandboxed
    // receivers refuse to accept.  Keep only what mapping needs.
    let narrowed = duplicate_with_access(
        section,
        (FILE_MAP_READ | FILE_MAP_WRITE).0,
        DUPLICATE_HANDLE_OPTIONS(0),
    );
    close(NativeHandle::Handle(section));
    let narrowed = narrowed?;

    tracing::debug!(size, "allocated file-mapping section");
    Ok(NativeHandle::Handle(narrowed))
}

pub(crate) fn map(handle: &NativeHandle, size: usize) -> Result<NonNull<u8>> {
    let NativeHandle::Handle(section) = *handle;
    // SAFETY: `section` is a live file-mapping handle with read/write access.
    let view = unsafe { MapViewOfFile(section, FILE_MAP_READ | FILE_MAP_WRITE, 0, 0, size) };
    NonNull::new(view.Value.cast::<u8>()).ok_or_else(|| Error::last_os("MapViewOfFile"))
}

/// # Safety
/// `base` must be a live view returned by [`map`] that no reference outlives.
pub(crate) unsafe fn unmap(base: NonNull<u8>, size: usize) {
    let view = MEMORY_MAPPED_VIEW_ADDRESS {
        Value: base.as_ptr().cast(),
    };
    // SAFETY: guaranteed by the caller.
    if let Err(e) = unsafe { UnmapViewOfFile(view) } {
        tracing::warn!(size, error = %Error::win32("UnmapViewOfFile", e), "unmapping failed");
    }
}

#[cfg(test)]
mod tests {
    use windows::Win32::{
        Foundation::{BOOL, ERROR_ACCESS_DENIED, HANDLE},
        Security::{
            InitializeSecurityDescriptor, SetKernelObjectSecurity, SetSecurityDescriptorDacl,
            DACL_SECURITY_INFORMATION, PSECURITY_DESCRIPTOR, SECURITY_DESCRIPTOR,
        },
    };

    use super::*;

    // SECURITY_DESCRIPTOR_REVISION
    const SD_REVISION: u32 = 1;

    /// Replace the section's DACL, which needs WRITE_DAC on `h`.
    fn replace_dacl(h: HANDLE) -> windows::core::Result<()> {
        let mut sd = SECURITY_DESCRIPTOR::default();
        let psd = PSECURITY_DESCRIPTOR(std::ptr::addr_of_mut!(sd).cast());
        // SAFETY: `sd` outlives every call below; a null DACL needs no ACL
        // buffer.
        unsafe {
            InitializeSecurityDescriptor(psd, SD_REVISION)?;
            SetSecurityDescriptorDacl(psd, BOOL::from(true), None, BOOL::from(false))?;
            SetKernelObjectSecurity(h, DACL_SECURITY_INFORMATION, psd)
        }
    }

    fn unnarrowed_section() -> HANDLE {
        // SAFETY: as in `allocate`.
        unsafe {
            CreateFileMappingW(INVALID_HANDLE_VALUE, None, PAGE_READWRITE, 0, 4096, PCWSTR::null())
        }
        .expect("CreateFileMappingW")
    }

    #[test]
    fn creator_handle_can_rewrite_its_dacl() {
        let h = unnarrowed_section();
        assert!(replace_dacl(h).is_ok());
        close(NativeHandle::Handle(h));
    }

    #[test]
    fn allocated_handle_is_narrowed_to_map_rights() {
        let handle = allocate(4096, &RegionOptions::default()).expect("allocate");
        let NativeHandle::Handle(h) = handle;

        let err = replace_dacl(h).unwrap_err();
        assert_eq!(err.code(), ERROR_ACCESS_DENIED.to_hresult());

        // Read and write survive the narrowing.
        let base = map(&handle, 4096).expect("map");
        // SAFETY: `base` is a fresh 4096-byte read/write view.
        unsafe {
            base.as_ptr().write(5);
            assert_eq!(base.as_ptr().read(), 5);
            unmap(base, 4096);
        }
        close(handle);
    }
}
