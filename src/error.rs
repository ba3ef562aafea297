// ── Central error type ────────────────────────────────────────────────────────
//
// All fallible operations in shmem-driver return `error::Result<T>`.  Kernel
// failures surface here; contract violations (using an invalid object,
// cloning a Mach receive right) panic instead and never reach this type.

use std::io;

use thiserror::Error;

/// Every error that shmem-driver can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// A POSIX or Win32 call failed and set `errno` / `GetLastError()`.
    #[error("{function} failed: {source}")]
    Os {
        /// The name of the failing function, for display purposes.
        function: &'static str,
        #[source]
        source: io::Error,
    },

    /// A windows-crate call returned a failing HRESULT.
    #[error("{function} failed (error {code:#010x})")]
    Win32 {
        function: &'static str,
        /// HRESULT bits; Win32 errors appear as 0x8007xxxx.
        code: u32,
    },

    /// A Mach call returned something other than `KERN_SUCCESS`.
    #[error("{function} failed (kern_return {code})")]
    Mach { function: &'static str, code: i32 },

    /// A Zircon syscall returned something other than `ZX_OK`.
    #[error("{function} failed (zx_status {status})")]
    Zircon { function: &'static str, status: i32 },

    /// A zero-byte region was requested.  No backend can map one.
    #[error("cannot allocate an empty shared-memory region")]
    EmptyRegion,

    /// Rounding `size` up to a page multiple overflowed `usize`.
    #[error("region size {size} overflows when rounded to a page boundary")]
    SizeOverflow { size: usize },

    /// The configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid JSON for `RegionOptions`.
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Capture `errno` (or `GetLastError()`) for the call that just failed.
    ///
    /// Must be called before any other OS call on the same thread.
    #[cfg_attr(target_os = "fuchsia", allow(dead_code))]
    pub(crate) fn last_os(function: &'static str) -> Self {
        Self::Os {
            function,
            source: io::Error::last_os_error(),
        }
    }
}

// Convert a windows-crate error (HRESULT) into an `Error` tagged with the
// failing function, so `map_err` reads naturally in the win32 backend.
#[cfg(windows)]
impl Error {
    pub(crate) fn win32(function: &'static str, e: windows::core::Error) -> Self {
        // HRESULT.0 is i32; reinterpret bits as u32 for display purposes.
        Self::Win32 {
            function,
            code: e.code().0 as u32,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
