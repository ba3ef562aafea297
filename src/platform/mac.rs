// ── macOS backend ─────────────────────────────────────────────────────────────
//
// Regions are named Mach memory entries (send rights).  A handle may also be
// a plain file descriptor, a receive right or a port set, because the same
// handle type is used for everything a transport can carry.
//
// Receive rights and port sets are exclusive by nature: the kernel has no way
// to alias them, so `duplicate` treats an attempt as a programming error.

#![allow(unsafe_code)]

use std::{
    os::fd::{IntoRawFd, OwnedFd, RawFd},
    ptr::NonNull,
};

use mach2::{
    kern_return::{kern_return_t, KERN_INVALID_ADDRESS, KERN_SUCCESS},
    mach_port::{mach_port_deallocate, mach_port_mod_refs},
    port::{
        mach_port_right_t, mach_port_t, MACH_PORT_DEAD, MACH_PORT_NULL, MACH_PORT_RIGHT_PORT_SET,
        MACH_PORT_RIGHT_RECEIVE, MACH_PORT_RIGHT_SEND,
    },
    traps::mach_task_self,
    vm::{mach_make_memory_entry_64, mach_vm_deallocate, mach_vm_map},
    vm_inherit::VM_INHERIT_NONE,
    vm_prot::{vm_prot_t, VM_PROT_READ, VM_PROT_WRITE},
    vm_statistics::VM_FLAGS_ANYWHERE,
    vm_types::mach_vm_address_t,
};

use super::fd;
use crate::{
    config::RegionOptions,
    error::{Error, Result},
};

// <mach/memory_object_types.h>; not exported by mach2.
const MAP_MEM_NAMED_CREATE: vm_prot_t = 0x0002_0000;

/// Discriminant of a [`NativeHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    FileDescriptor,
    MachSendRight,
    MachReceiveRight,
    MachPortSet,
}

/// A macOS kernel handle: a file descriptor or one Mach port right.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum NativeHandle {
    Fd(RawFd),
    MachSendRight(mach_port_t),
    MachReceiveRight(mach_port_t),
    MachPortSet(mach_port_t),
}

impl NativeHandle {
    pub fn kind(&self) -> HandleKind {
        match self {
            Self::Fd(_) => HandleKind::FileDescriptor,
            Self::MachSendRight(_) => HandleKind::MachSendRight,
            Self::MachReceiveRight(_) => HandleKind::MachReceiveRight,
            Self::MachPortSet(_) => HandleKind::MachPortSet,
        }
    }
}

impl From<OwnedFd> for NativeHandle {
    fn from(fd: OwnedFd) -> Self {
        Self::Fd(fd.into_raw_fd())
    }
}

fn port_is_valid(port: mach_port_t) -> bool {
    port != MACH_PORT_NULL && port != MACH_PORT_DEAD
}

fn check(function: &'static str, kr: kern_return_t) -> Result<()> {
    if kr == KERN_SUCCESS {
        Ok(())
    } else {
        Err(Error::Mach { function, code: kr })
    }
}

pub(crate) fn is_valid(handle: &NativeHandle) -> bool {
    match *handle {
        NativeHandle::Fd(raw) => fd::is_valid(raw),
        NativeHandle::MachSendRight(port)
        | NativeHandle::MachReceiveRight(port)
        | NativeHandle::MachPortSet(port) => port_is_valid(port),
    }
}

pub(crate) fn close(handle: NativeHandle) {
    let (function, kr, port) = match handle {
        NativeHandle::Fd(raw) => return fd::close(raw),
        NativeHandle::MachSendRight(port) => (
            "mach_port_deallocate",
            // SAFETY: the caller owns one user reference to this send right
            // and gives it up here.
            unsafe { mach_port_deallocate(mach_task_self(), port) },
            port,
        ),
        NativeHandle::MachReceiveRight(port) => (
            "mach_port_mod_refs(RECEIVE, -1)",
            // SAFETY: the caller owns this receive right; dropping its only
            // reference destroys the port.
            unsafe { mach_port_mod_refs(mach_task_self(), port, MACH_PORT_RIGHT_RECEIVE, -1) },
            port,
        ),
        NativeHandle::MachPortSet(port) => (
            "mach_port_mod_refs(PORT_SET, -1)",
            // SAFETY: the caller owns this port set; dropping its only
            // reference destroys the set, not its members.
            unsafe { mach_port_mod_refs(mach_task_self(), port, MACH_PORT_RIGHT_PORT_SET, -1) },
            port,
        ),
    };
    if let Err(e) = check(function, kr) {
        tracing::warn!(port, error = %e, "releasing mach port failed");
    }
}

pub(crate) fn duplicate(handle: &NativeHandle) -> Result<NativeHandle> {
    match *handle {
        NativeHandle::Fd(raw) => fd::dup(raw).map(NativeHandle::Fd),
        NativeHandle::MachSendRight(port) => {
            add_send_ref(port, MACH_PORT_RIGHT_SEND)?;
            Ok(NativeHandle::MachSendRight(port))
        }
        NativeHandle::MachReceiveRight(_) => panic!("cannot clone a Mach receive right"),
        NativeHandle::MachPortSet(_) => panic!("cannot clone a Mach port set"),
    }
}

fn add_send_ref(port: mach_port_t, right: mach_port_right_t) -> Result<()> {
    // SAFETY: `port` names a send right held by this task; adding a user
    // reference leaves the existing one untouched.
    let kr = unsafe { mach_port_mod_refs(mach_task_self(), port, right, 1) };
    check("mach_port_mod_refs(SEND, +1)", kr)
}

pub(crate) fn allocate(size: usize, _opts: &RegionOptions) -> Result<NativeHandle> {
    let mut entry_size = size as u64;
    let mut port: mach_port_t = MACH_PORT_NULL;
    // SAFETY: both out-pointers reference live locals.  The kernel rounds the
    // entry up to whole pages and reports the real size in `entry_size`.
    let kr = unsafe {
        mach_make_memory_entry_64(
            mach_task_self(),
            &mut entry_size,
            0,
            MAP_MEM_NAMED_CREATE | VM_PROT_READ | VM_PROT_WRITE,
            &mut port,
            MACH_PORT_NULL,
        )
    };
    check("mach_make_memory_entry_64", kr)?;
    tracing::debug!(size, entry_size, port, "allocated mach memory entry");
    Ok(NativeHandle::MachSendRight(port))
}

pub(crate) fn map(handle: &NativeHandle, size: usize) -> Result<NonNull<u8>> {
    let port = match *handle {
        NativeHandle::MachSendRight(port) => port,
        NativeHandle::Fd(raw) => return fd::mmap_shared(raw, size),
        ref other => panic!("cannot map a {:?}", other.kind()),
    };

    let prot = VM_PROT_READ | VM_PROT_WRITE;
    let mut address: mach_vm_address_t = 0;
    // SAFETY: VM_FLAGS_ANYWHERE lets the kernel choose the address, so no
    // existing mapping is replaced.  `port` is a memory entry send right.
    let kr = unsafe {
        mach_vm_map(
            mach_task_self(),
            &mut address,
            size as u64,
            0,
            VM_FLAGS_ANYWHERE,
            port,
            0,
            0,
            prot,
            prot,
            VM_INHERIT_NONE,
        )
    };
    check("mach_vm_map", kr)?;
    mapped_base(address)
}

/// A successful `mach_vm_map` that reports address 0 is still a failure.
fn mapped_base(address: mach_vm_address_t) -> Result<NonNull<u8>> {
    NonNull::new(address as usize as *mut u8).ok_or(Error::Mach {
        function: "mach_vm_map",
        code: KERN_INVALID_ADDRESS,
    })
}

/// # Safety
/// `base`/`size` must describe a live mapping that no reference outlives.
pub(crate) unsafe fn unmap(base: NonNull<u8>, size: usize) {
    // SAFETY: guaranteed by the caller.  mach_vm_deallocate also releases
    // ranges produced by mmap, so fd-backed mappings take the same path.
    let kr = unsafe {
        mach_vm_deallocate(
            mach_task_self(),
            base.as_ptr() as usize as mach_vm_address_t,
            size as u64,
        )
    };
    if let Err(e) = check("mach_vm_deallocate", kr) {
        tracing::warn!(size, error = %e, "unmapping failed");
    }
}

#[cfg(test)]
mod tests {
    use mach2::mach_port::mach_port_allocate;

    use super::*;
    use crate::os_handle::OsHandle;

    fn allocate_right(right: mach_port_right_t) -> mach_port_t {
        let mut port: mach_port_t = MACH_PORT_NULL;
        // SAFETY: `port` is a live out-pointer.
        let kr = unsafe { mach_port_allocate(mach_task_self(), right, &mut port) };
        assert_eq!(kr, KERN_SUCCESS);
        port
    }

    #[test]
    fn memory_entry_is_a_send_right() {
        let handle = allocate(4096, &RegionOptions::default()).expect("allocate");
        assert_eq!(handle.kind(), HandleKind::MachSendRight);
        close(handle);
    }

    #[test]
    #[should_panic(expected = "receive right")]
    fn cloning_a_receive_right_panics() {
        let port = allocate_right(MACH_PORT_RIGHT_RECEIVE);
        // SAFETY: the receive right was just allocated and is owned here.
        let handle = unsafe { OsHandle::from_native(NativeHandle::MachReceiveRight(port)) };
        let _ = handle.try_clone();
    }

    #[test]
    #[should_panic(expected = "port set")]
    fn cloning_a_port_set_panics() {
        let port = allocate_right(MACH_PORT_RIGHT_PORT_SET);
        // SAFETY: the port set was just allocated and is owned here.
        let handle = unsafe { OsHandle::from_native(NativeHandle::MachPortSet(port)) };
        let _ = handle.try_clone();
    }

    #[test]
    fn receive_right_is_released_on_reset() {
        let port = allocate_right(MACH_PORT_RIGHT_RECEIVE);
        // SAFETY: as above.
        let mut handle = unsafe { OsHandle::from_native(NativeHandle::MachReceiveRight(port)) };
        assert!(handle.is_valid());
        handle.reset();
        assert!(!handle.is_valid());
    }

    #[test]
    fn null_map_address_is_reported_as_invalid_address() {
        let err = mapped_base(0).unwrap_err();
        assert!(
            matches!(err, Error::Mach { function: "mach_vm_map", code } if code == KERN_INVALID_ADDRESS),
            "got {err:?}"
        );
        assert!(mapped_base(0x1000).is_ok());
    }
}
