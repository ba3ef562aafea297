// ── OsHandle ──────────────────────────────────────────────────────────────────
//
// Exclusive ownership of one native kernel handle.  The handle is released
// exactly once: by `reset()`, by `Drop`, or by being handed off through
// `into_native()`.  `try_clone()` is the only way to get a second owner, and
// it yields a new kernel reference rather than sharing this one.

use std::fmt;

use crate::{
    error::Result,
    platform::{self, NativeHandle},
};

/// A move-only owner of one native kernel handle.
///
/// Default-constructed handles are invalid.  Dropping a valid handle closes
/// the underlying kernel reference.
#[derive(Default)]
pub struct OsHandle {
    native: Option<NativeHandle>,
}

impl OsHandle {
    /// An invalid handle.
    pub const fn new() -> Self {
        Self { native: None }
    }

    /// Adopt `native` without duplicating it.
    ///
    /// A value that is invalid by platform convention (a negative fd, a null
    /// port or HANDLE) produces an invalid `OsHandle`.
    ///
    /// # Safety
    /// The caller must own the kernel reference named by `native` and must
    /// not release it elsewhere; this `OsHandle` will release it.
    #[allow(unsafe_code)]
    pub unsafe fn from_native(native: NativeHandle) -> Self {
        if platform::is_valid(&native) {
            Self {
                native: Some(native),
            }
        } else {
            Self::new()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.native.is_some()
    }

    /// Borrow the native value, or `None` when invalid.
    pub fn as_native(&self) -> Option<&NativeHandle> {
        self.native.as_ref()
    }

    /// Give up ownership of the native value without releasing it.
    ///
    /// This is how a handle leaves the process: the transport sends the raw
    /// value and the receiver adopts it with [`OsHandle::from_native`].
    pub fn into_native(mut self) -> Option<NativeHandle> {
        self.native.take()
    }

    /// Move ownership out, leaving `self` invalid.
    pub fn take(&mut self) -> Self {
        Self {
            native: self.native.take(),
        }
    }

    /// Release the kernel reference, if any.  Safe to call repeatedly.
    pub fn reset(&mut self) {
        if let Some(native) = self.native.take() {
            platform::close(native);
        }
    }

    /// Create a second owner of the same kernel object.
    ///
    /// # Panics
    /// If this handle is invalid, or if it is a Mach receive right or port
    /// set (neither can be aliased).
    pub fn try_clone(&self) -> Result<Self> {
        let native = self
            .native
            .as_ref()
            .expect("OsHandle::try_clone called on an invalid handle");
        let duplicate = platform::duplicate(native)?;
        tracing::trace!(?native, ?duplicate, "cloned handle");
        Ok(Self {
            native: Some(duplicate),
        })
    }

    /// What kind of kernel handle this is, or `None` when invalid.
    #[cfg(target_os = "macos")]
    pub fn kind(&self) -> Option<platform::HandleKind> {
        self.native.as_ref().map(NativeHandle::kind)
    }
}

impl Drop for OsHandle {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for OsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.native {
            Some(native) => f.debug_tuple("OsHandle").field(native).finish(),
            None => f.write_str("OsHandle(invalid)"),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
impl From<std::os::fd::OwnedFd> for OsHandle {
    fn from(fd: std::os::fd::OwnedFd) -> Self {
        Self {
            native: Some(NativeHandle::from(fd)),
        }
    }
}

#[cfg(windows)]
impl From<std::os::windows::io::OwnedHandle> for OsHandle {
    fn from(handle: std::os::windows::io::OwnedHandle) -> Self {
        Self {
            native: Some(NativeHandle::from(handle)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
