// ── Memory ────────────────────────────────────────────────────────────────────
//
// A shared-memory region: one `OsHandle` plus the size both ends agreed on.
// The handle carries no size of its own, so anyone transferring a region
// must send `size()` alongside the handle and rebuild with `from_handle`.

use crate::{
    config::RegionOptions,
    error::{Error, Result},
    mapping::Mapping,
    os_handle::OsHandle,
    platform,
};

/// A shared-memory region that can be cloned, transferred and mapped.
#[derive(Debug, Default)]
pub struct Memory {
    handle: OsHandle,
    size: usize,
}

impl Memory {
    /// Adopt a region handle received from elsewhere.
    ///
    /// `size` must match the size of the region the handle came from; it is
    /// not checked against the kernel object.
    pub fn from_handle(handle: OsHandle, size: usize) -> Self {
        Self { handle, size }
    }

    /// Allocate a new region of at least `size` bytes.
    ///
    /// # Panics
    /// If the kernel refuses the allocation.  Use [`Memory::try_new`] to
    /// handle the failure instead.
    pub fn new(size: usize) -> Self {
        match Self::try_new(size) {
            Ok(memory) => memory,
            Err(e) => panic!("failed to allocate {size}-byte shared memory region: {e}"),
        }
    }

    /// Allocate a new region of at least `size` bytes with default options.
    pub fn try_new(size: usize) -> Result<Self> {
        Self::with_options(size, &RegionOptions::default())
    }

    /// Allocate a new region of at least `size` bytes.
    pub fn with_options(size: usize, opts: &RegionOptions) -> Result<Self> {
        if size == 0 {
            return Err(Error::EmptyRegion);
        }
        let native = platform::allocate(size, opts)?;
        // SAFETY: `allocate` returned a fresh kernel reference owned by no one
        // else.
        #[allow(unsafe_code)]
        let handle = unsafe { OsHandle::from_native(native) };
        Ok(Self { handle, size })
    }

    /// The logical size agreed for this region, not the page-rounded size of
    /// the kernel object.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn handle(&self) -> &OsHandle {
        &self.handle
    }

    /// Move the handle out, leaving this `Memory` invalid.
    ///
    /// `size()` keeps reporting the old size afterwards even though the
    /// object can no longer be mapped or cloned.
    pub fn take_handle(&mut self) -> OsHandle {
        self.handle.take()
    }

    /// Split into the handle and size a transport needs to send.
    pub fn into_parts(mut self) -> (OsHandle, usize) {
        (self.handle.take(), self.size)
    }

    /// Close the handle early.  Existing mappings stay valid.
    pub fn reset(&mut self) {
        self.handle.reset();
    }

    /// A second `Memory` over the same region, with its own handle.
    ///
    /// # Panics
    /// If this `Memory` is invalid.
    pub fn try_clone(&self) -> Result<Self> {
        assert!(self.is_valid(), "Memory::try_clone called on an invalid region");
        Ok(Self {
            handle: self.handle.try_clone()?,
            size: self.size,
        })
    }

    /// Map the whole region read/write.
    ///
    /// # Panics
    /// If this `Memory` is invalid or the kernel refuses the mapping.  Use
    /// [`Memory::try_map`] to handle mapping failure instead.
    pub fn map(&self) -> Mapping {
        match self.try_map() {
            Ok(mapping) => mapping,
            Err(e) => panic!("failed to map {}-byte shared memory region: {e}", self.size),
        }
    }

    /// Map the whole region read/write, covering exactly `size()` bytes from
    /// offset 0.
    ///
    /// # Panics
    /// If this `Memory` is invalid.
    pub fn try_map(&self) -> Result<Mapping> {
        let native = self
            .handle
            .as_native()
            .expect("Memory::map called on an invalid region");
        let base = platform::map(native, self.size)?;
        tracing::debug!(size = self.size, base = ?base, "mapped region");
        // SAFETY: `base` is a fresh mapping of exactly `self.size` bytes that
        // nothing else owns.
        #[allow(unsafe_code)]
        let mapping = unsafe { Mapping::from_raw_parts(base, self.size) };
        Ok(mapping)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn default_is_invalid() {
        let m = Memory::default();
        assert!(!m.is_valid());
        assert_eq!(m.size(), 0);
    }

    #[test]
    fn new_region_is_valid_with_requested_size() {
        let m = Memory::new(4096);
        assert!(m.is_valid());
        assert_eq!(m.size(), 4096);

        // Sizes that are not page multiples are reported as requested.
        let m = Memory::new(100);
        assert_eq!(m.size(), 100);
    }

    #[test]
    fn new_region_is_zeroed() {
        let m = Memory::new(8192);
        let map = m.map();
        assert!((0..8192).all(|i| map.load(i) == 0));
    }

    #[test]
    fn empty_region_is_rejected() {
        let err = Memory::try_new(0).unwrap_err();
        assert!(matches!(err, Error::EmptyRegion), "got {err:?}");
    }

    #[test]
    fn clone_aliases_the_same_region() {
        let m = Memory::new(4096);
        let c = m.try_clone().expect("clone");
        assert!(c.is_valid());
        assert_eq!(c.size(), m.size());

        let map1 = m.map();
        let map2 = c.map();
        map1.store(0, 0x5a);
        map1.store(4095, 0xa5);
        assert_eq!(map2.load(0), 0x5a);
        assert_eq!(map2.load(4095), 0xa5);
    }

    #[test]
    fn adopted_handle_maps_the_same_region() {
        let m = Memory::new(4096);
        let h2 = m.handle().try_clone().expect("clone handle");
        let m2 = Memory::from_handle(h2, 4096);

        let map1 = m.map();
        let map2 = m2.map();
        map1.store(0, 42);
        assert_eq!(map2.load(0), 42);
    }

    #[test]
    fn take_handle_keeps_size() {
        let mut m = Memory::new(300);
        let h = m.take_handle();
        assert!(h.is_valid());
        assert!(!m.is_valid());
        assert_eq!(m.size(), 300);
    }

    #[test]
    fn into_parts_round_trips_through_from_handle() {
        let m = Memory::new(512);
        let (h, size) = m.into_parts();
        let rebuilt = Memory::from_handle(h, size);
        assert!(rebuilt.is_valid());
        assert_eq!(rebuilt.size(), 512);
        assert_eq!(rebuilt.map().size(), 512);
    }

    #[test]
    fn move_carries_state() {
        let a = Memory::new(1024);
        let b = a;
        assert!(b.is_valid());
        assert_eq!(b.size(), 1024);

        let mut c = Memory::new(256);
        let d = std::mem::take(&mut c);
        assert!(!c.is_valid());
        assert!(d.is_valid());
        assert_eq!(d.size(), 256);
    }

    #[test]
    fn mapping_outlives_memory() {
        let m = Memory::new(4096);
        let map = m.map();
        drop(m);

        map.store(10, 7);
        assert_eq!(map.load(10), 7);
    }

    #[test]
    fn mapping_survives_reset() {
        let mut m = Memory::new(4096);
        let map = m.map();
        m.reset();
        assert!(!m.is_valid());
        map.store(0, 1);
        assert_eq!(map.load(0), 1);
    }

    #[test]
    fn mapping_covers_requested_size_only() {
        let m = Memory::new(10);
        assert_eq!(m.map().bytes().len(), 10);
    }

    #[test]
    #[should_panic(expected = "invalid region")]
    fn map_of_invalid_memory_panics() {
        let _ = Memory::default().map();
    }

    #[test]
    #[should_panic(expected = "invalid region")]
    fn clone_of_invalid_memory_panics() {
        let _ = Memory::default().try_clone();
    }

    #[test]
    #[should_panic(expected = "invalid region")]
    fn map_after_take_handle_panics() {
        let mut m = Memory::new(64);
        let _h = m.take_handle();
        let _ = m.try_map();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_positive_size_allocates(size in 1usize..=(1 << 20)) {
            let m = Memory::try_new(size).expect("allocate");
            prop_assert!(m.is_valid());
            prop_assert_eq!(m.size(), size);

            let map = m.map();
            prop_assert_eq!(map.size(), size);
            map.store(size - 1, 0xff);
            prop_assert_eq!(map.load(size - 1), 0xff);
        }
    }
}
