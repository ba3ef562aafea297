// ── Fuchsia backend ───────────────────────────────────────────────────────────
//
// Regions are VMOs stripped of ZX_RIGHT_EXECUTE; mappings live in the root
// VMAR.  The syscalls are declared directly against the vDSO.

#![allow(unsafe_code)]
#![allow(non_camel_case_types)]

use std::ptr::NonNull;

use super::page_align;
use crate::{
    config::RegionOptions,
    error::{Error, Result},
};

type zx_handle_t = u32;
type zx_status_t = i32;
type zx_rights_t = u32;
type zx_vaddr_t = usize;
type zx_vm_option_t = u32;

const ZX_OK: zx_status_t = 0;
const ZX_ERR_INTERNAL: zx_status_t = -1;
const ZX_HANDLE_INVALID: zx_handle_t = 0;

const ZX_RIGHT_DUPLICATE: zx_rights_t = 1 << 0;
const ZX_RIGHT_TRANSFER: zx_rights_t = 1 << 1;
const ZX_RIGHT_READ: zx_rights_t = 1 << 2;
const ZX_RIGHT_WRITE: zx_rights_t = 1 << 3;
const ZX_RIGHT_EXECUTE: zx_rights_t = 1 << 4;
const ZX_RIGHT_MAP: zx_rights_t = 1 << 5;
const ZX_RIGHT_GET_PROPERTY: zx_rights_t = 1 << 6;
const ZX_RIGHT_SET_PROPERTY: zx_rights_t = 1 << 7;
const ZX_RIGHT_SIGNAL: zx_rights_t = 1 << 12;
const ZX_RIGHT_WAIT: zx_rights_t = 1 << 14;
const ZX_RIGHT_INSPECT: zx_rights_t = 1 << 15;
const ZX_RIGHT_SAME_RIGHTS: zx_rights_t = 1 << 31;

const ZX_DEFAULT_VMO_RIGHTS: zx_rights_t = ZX_RIGHT_TRANSFER
    | ZX_RIGHT_DUPLICATE
    | ZX_RIGHT_WAIT
    | ZX_RIGHT_INSPECT
    | ZX_RIGHT_READ
    | ZX_RIGHT_WRITE
    | ZX_RIGHT_GET_PROPERTY
    | ZX_RIGHT_SET_PROPERTY
    | ZX_RIGHT_MAP
    | ZX_RIGHT_SIGNAL;

const ZX_VM_PERM_READ: zx_vm_option_t = 1 << 0;
const ZX_VM_PERM_WRITE: zx_vm_option_t = 1 << 1;
const ZX_VM_REQUIRE_NON_RESIZABLE: zx_vm_option_t = 1 << 11;

#[link(name = "zircon")]
extern "C" {
    fn zx_vmo_create(size: u64, options: u32, out: *mut zx_handle_t) -> zx_status_t;
    fn zx_handle_replace(
        handle: zx_handle_t,
        rights: zx_rights_t,
        out: *mut zx_handle_t,
    ) -> zx_status_t;
    fn zx_handle_duplicate(
        handle: zx_handle_t,
        rights: zx_rights_t,
        out: *mut zx_handle_t,
    ) -> zx_status_t;
    fn zx_handle_close(handle: zx_handle_t) -> zx_status_t;
    fn zx_vmar_map(
        handle: zx_handle_t,
        options: zx_vm_option_t,
        vmar_offset: usize,
        vmo: zx_handle_t,
        vmo_offset: u64,
        len: usize,
        mapped_addr: *mut zx_vaddr_t,
    ) -> zx_status_t;
    fn zx_vmar_unmap(handle: zx_handle_t, addr: zx_vaddr_t, len: usize) -> zx_status_t;
    fn zx_system_get_page_size() -> u32;
}

extern "C" {
    // Provided by Fuchsia's libc from the process startup handles.
    fn zx_vmar_root_self() -> zx_handle_t;
}

/// The only handle kind on Fuchsia.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum NativeHandle {
    Zx(zx_handle_t),
}

fn check(function: &'static str, status: zx_status_t) -> Result<()> {
    if status == ZX_OK {
        Ok(())
    } else {
        Err(Error::Zircon { function, status })
    }
}

pub(crate) fn is_valid(handle: &NativeHandle) -> bool {
    let NativeHandle::Zx(raw) = *handle;
    raw != ZX_HANDLE_INVALID
}

pub(crate) fn close(handle: NativeHandle) {
    let NativeHandle::Zx(raw) = handle;
    // SAFETY: the caller owns `raw` and gives it up here.
    let status = unsafe { zx_handle_close(raw) };
    if let Err(e) = check("zx_handle_close", status) {
        tracing::warn!(handle = raw, error = %e, "closing handle failed");
    }
}

pub(crate) fn duplicate(handle: &NativeHandle) -> Result<NativeHandle> {
    let NativeHandle::Zx(raw) = *handle;
    let mut out = ZX_HANDLE_INVALID;
    // SAFETY: `raw` is a live handle and `out` a live out-pointer.
    let status = unsafe { zx_handle_duplicate(raw, ZX_RIGHT_SAME_RIGHTS, &mut out) };
    check("zx_handle_duplicate", status)?;
    Ok(NativeHandle::Zx(out))
}

pub(crate) fn allocate(size: usize, _opts: &RegionOptions) -> Result<NativeHandle> {
    let region_size = page_align(size, page_size())?;

    let mut vmo = ZX_HANDLE_INVALID;
    // SAFETY: `vmo` is a live out-pointer.
    let status = unsafe { zx_vmo_create(region_size as u64, 0, &mut vmo) };
    check("zx_vmo_create", status)?;

    // zx_handle_replace consumes `vmo` whether or not it succeeds.
    let mut restricted = ZX_HANDLE_INVALID;
    // SAFETY: `vmo` was just created and is owned here.
    let status = unsafe {
        zx_handle_replace(vmo, ZX_DEFAULT_VMO_RIGHTS & !ZX_RIGHT_EXECUTE, &mut restricted)
    };
    check("zx_handle_replace", status)?;

    tracing::debug!(size, region_size, handle = restricted, "allocated vmo");
    Ok(NativeHandle::Zx(restricted))
}

pub(crate) fn map(handle: &NativeHandle, size: usize) -> Result<NonNull<u8>> {
    let NativeHandle::Zx(vmo) = *handle;
    let mut addr: zx_vaddr_t = 0;
    // SAFETY: without ZX_VM_SPECIFIC the kernel picks a free range of the
    // root VMAR; `addr` is a live out-pointer.
    let status = unsafe {
        zx_vmar_map(
            zx_vmar_root_self(),
            ZX_VM_REQUIRE_NON_RESIZABLE | ZX_VM_PERM_READ | ZX_VM_PERM_WRITE,
            0,
            vmo,
            0,
            size,
            &mut addr,
        )
    };
    check("zx_vmar_map", status)?;
    NonNull::new(addr as *mut u8).ok_or(Error::Zircon {
        function: "zx_vmar_map",
        status: ZX_ERR_INTERNAL,
    })
}

/// # Safety
/// `base`/`size` must describe a live mapping that no reference outlives.
pub(crate) unsafe fn unmap(base: NonNull<u8>, size: usize) {
    // SAFETY: guaranteed by the caller.
    let status = unsafe { zx_vmar_unmap(zx_vmar_root_self(), base.as_ptr() as zx_vaddr_t, size) };
    if let Err(e) = check("zx_vmar_unmap", status) {
        tracing::warn!(size, error = %e, "unmapping failed");
    }
}

fn page_size() -> usize {
    // SAFETY: no preconditions.
    unsafe { zx_system_get_page_size() as usize }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZX_INFO_HANDLE_BASIC: u32 = 2;

    #[repr(C)]
    #[derive(Default)]
    struct zx_info_handle_basic_t {
        koid: u64,
        rights: zx_rights_t,
        type_: u32,
        related_koid: u64,
        reserved: u32,
        padding: [u8; 4],
    }

    #[link(name = "zircon")]
    extern "C" {
        fn zx_object_get_info(
            handle: zx_handle_t,
            topic: u32,
            buffer: *mut u8,
            buffer_size: usize,
            actual: *mut usize,
            avail: *mut usize,
        ) -> zx_status_t;
    }

    fn rights_of(handle: &NativeHandle) -> zx_rights_t {
        let NativeHandle::Zx(raw) = *handle;
        let mut info = zx_info_handle_basic_t::default();
        let (mut actual, mut avail) = (0usize, 0usize);
        // SAFETY: `info` is a live buffer of the size passed; the counters are
        // live out-pointers.
        let status = unsafe {
            zx_object_get_info(
                raw,
                ZX_INFO_HANDLE_BASIC,
                std::ptr::addr_of_mut!(info).cast(),
                std::mem::size_of::<zx_info_handle_basic_t>(),
                &mut actual,
                &mut avail,
            )
        };
        assert_eq!(status, ZX_OK);
        info.rights
    }

    #[test]
    fn allocated_vmo_cannot_be_executed() {
        let handle = allocate(4096, &RegionOptions::default()).expect("allocate");
        let rights = rights_of(&handle);
        assert_eq!(rights & ZX_RIGHT_EXECUTE, 0);
        assert_eq!(rights & ZX_RIGHT_MAP, ZX_RIGHT_MAP);
        assert_eq!(rights & ZX_RIGHT_WRITE, ZX_RIGHT_WRITE);
        close(handle);
    }

    #[test]
    fn duplicate_keeps_the_narrowed_rights() {
        let handle = allocate(4096, &RegionOptions::default()).expect("allocate");
        let dup = duplicate(&handle).expect("duplicate");
        assert_eq!(rights_of(&dup), rights_of(&handle));
        close(dup);
        close(handle);
    }
}
