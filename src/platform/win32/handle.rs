// ── Win32 handles ─────────────────────────────────────────────────────────────
//
// A `NativeHandle` wraps one HANDLE.  Closing and duplicating stay within the
// current process; cross-process transfer is the transport's job.

#![allow(unsafe_code)]

use std::os::windows::io::{IntoRawHandle, OwnedHandle};

use windows::Win32::{
    Foundation::{
        CloseHandle, DuplicateHandle, BOOL, DUPLICATE_HANDLE_OPTIONS, DUPLICATE_SAME_ACCESS,
        HANDLE, INVALID_HANDLE_VALUE,
    },
    System::Threading::GetCurrentProcess,
};

use crate::error::{Error, Result};

/// The only handle kind on Windows.
#[derive(Debug, PartialEq, Eq)]
pub enum NativeHandle {
    Handle(HANDLE),
}

// SAFETY: a HANDLE is a process-wide table index, not a pointer into memory;
// kernel objects may be used and closed from any thread.
unsafe impl Send for NativeHandle {}
// SAFETY: as above; `&NativeHandle` only allows reading the value.
unsafe impl Sync for NativeHandle {}

impl From<OwnedHandle> for NativeHandle {
    fn from(handle: OwnedHandle) -> Self {
        Self::Handle(HANDLE(handle.into_raw_handle()))
    }
}

pub(crate) fn is_valid(handle: &NativeHandle) -> bool {
    let NativeHandle::Handle(h) = *handle;
    !h.0.is_null() && h != INVALID_HANDLE_VALUE
}

pub(crate) fn close(handle: NativeHandle) {
    let NativeHandle::Handle(h) = handle;
    // SAFETY: the caller owns `h` and gives it up here.
    if let Err(e) = unsafe { CloseHandle(h) } {
        tracing::warn!(error = %Error::win32("CloseHandle", e), "closing handle failed");
    }
}

pub(crate) fn duplicate(handle: &NativeHandle) -> Result<NativeHandle> {
    let NativeHandle::Handle(h) = *handle;
    duplicate_with_access(h, 0, DUPLICATE_SAME_ACCESS).map(NativeHandle::Handle)
}

/// `DuplicateHandle` within the current process.  `access` is ignored when
/// `options` contains `DUPLICATE_SAME_ACCESS`.
pub(super) fn duplicate_with_access(
    h: HANDLE,
    access: u32,
    options: DUPLICATE_HANDLE_OPTIONS,
) -> Result<HANDLE> {
    let mut out = HANDLE::default();
    // SAFETY: GetCurrentProcess returns a pseudo-handle that needs no
    // closing.  `h` is a live handle owned by the caller; `out` is a live
    // out-pointer.
    let result = unsafe {
        let process = GetCurrentProcess();
        DuplicateHandle(process, h, process, &mut out, access, BOOL::from(false), options)
    };
    result.map_err(|e| Error::win32("DuplicateHandle", e))?;
    Ok(out)
}
