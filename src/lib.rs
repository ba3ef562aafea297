// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except:
//   • `platform::*` – kernel FFI (POSIX, ashmem, Mach, Zircon, Win32)
//   • `mapping`     – owns a raw mapped address range
// plus the adoption points in `os_handle` and `memory`, which are marked
// individually.  Each unsafe block MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

//! Cross-platform shared memory.
//!
//! Three move-only types, leaves first:
//!
//! * [`OsHandle`] owns one native kernel handle (fd, Mach port, Zircon handle
//!   or Win32 `HANDLE`).
//! * [`Memory`] is an `OsHandle` to a shared-memory object plus its agreed
//!   size.  It can be cloned (a second handle to the same object), taken
//!   apart for transfer, and rebuilt on the other side with
//!   [`Memory::from_handle`].
//! * [`Mapping`] is a live read/write view of a `Memory`, and keeps working
//!   after the `Memory` that produced it is gone.  Its bytes are exposed as
//!   atomics because other mappings of the region may write them.
//!
//! ```no_run
//! use shmem_driver::Memory;
//!
//! let m = Memory::new(4096);
//! let h2 = m.handle().try_clone()?;
//! let m2 = Memory::from_handle(h2, 4096);
//!
//! let map1 = m.map();
//! let map2 = m2.map();
//! map1.store(0, 42);
//! assert_eq!(map2.load(0), 42);
//! # Ok::<(), shmem_driver::Error>(())
//! ```

pub mod config;
pub mod error;
mod mapping;
mod memory;
mod os_handle;
pub mod platform;

pub use config::RegionOptions;
pub use error::{Error, Result};
pub use mapping::Mapping;
pub use memory::Memory;
pub use os_handle::OsHandle;
pub use platform::NativeHandle;
