// ── Win32 backend ─────────────────────────────────────────────────────────────
//
// Regions are pagefile-backed file-mapping sections.  `handle` owns HANDLE
// lifetimes and duplication; `section` creates, maps and unmaps sections and
// narrows the creator's handle to map rights before it is handed out.
//
// Both sub-modules call Win32 directly.  Each `unsafe` block carries a
// `// SAFETY:` comment naming the handle or view it relies on.

#![allow(unsafe_code)]

// ── Sub-modules ───────────────────────────────────────────────────────────────

mod handle; // HANDLE ownership: validity, CloseHandle, DuplicateHandle
mod section; // CreateFileMappingW, MapViewOfFile, UnmapViewOfFile

pub use handle::NativeHandle;
pub(crate) use handle::{close, duplicate, is_valid};
pub(crate) use section::{allocate, map, unmap};
