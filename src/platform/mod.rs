// ── Platform abstraction layer ────────────────────────────────────────────────
//
// Exactly one backend is compiled in, chosen by target OS.  Every backend
// exposes the same surface to `os_handle`, `memory` and `mapping`:
//
//   NativeHandle                      sum type of the platform's handle kinds
//   is_valid(&NativeHandle) -> bool
//   close(NativeHandle)               releases one kernel reference
//   duplicate(&NativeHandle)          new reference to the same kernel object
//   allocate(size, &RegionOptions)    new anonymous shared-memory object
//   map(&NativeHandle, size)          read/write mapping at offset 0
//   unmap(base, size)
//
// All kernel FFI lives below this module; nothing above it uses `unsafe`
// except `mapping`, which owns a raw address range.

use crate::error::{Error, Result};

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
mod fd;

#[cfg(target_os = "linux")]
mod posix;
#[cfg(target_os = "linux")]
use posix as imp;

#[cfg(target_os = "android")]
mod android;
#[cfg(target_os = "android")]
use android as imp;

#[cfg(target_os = "macos")]
mod mac;
#[cfg(target_os = "macos")]
use mac as imp;
#[cfg(target_os = "macos")]
pub use mac::HandleKind;

#[cfg(target_os = "fuchsia")]
mod fuchsia;
#[cfg(target_os = "fuchsia")]
use fuchsia as imp;

#[cfg(windows)]
mod win32;
#[cfg(windows)]
use win32 as imp;

pub use imp::NativeHandle;
pub(crate) use imp::{allocate, close, duplicate, is_valid, map, unmap};

/// Round `size` up to the next multiple of `page_size`.
///
/// `page_size` must be a power of two.  Fails instead of wrapping when the
/// rounded value does not fit in `usize`.
#[cfg_attr(any(target_os = "macos", windows), allow(dead_code))]
pub(crate) fn page_align(size: usize, page_size: usize) -> Result<usize> {
    debug_assert!(page_size.is_power_of_two());
    let mask = page_size - 1;
    size.checked_add(mask)
        .map(|n| n & !mask)
        .ok_or(Error::SizeOverflow { size })
}

/// The debug name handed to the kernel: `name` with NULs removed, cut to at
/// most `max` bytes on a char boundary.
///
/// Names are diagnostic only, so an unusable name is trimmed rather than
/// failing the allocation.
#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
pub(crate) fn region_name(name: &str, max: usize) -> String {
    let mut out = String::with_capacity(name.len().min(max));
    for c in name.chars().filter(|&c| c != '\0') {
        if out.len() + c.len_utf8() > max {
            break;
        }
        out.push(c);
    }
    out
}
