use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};

/// A window of memory shared with another processor, addressed by offset.
///
/// `Region` is a plain `(base, len)` pair and is `Copy`; whoever created it
/// keeps the backing memory alive (`HeapRegion`, `MmapRegion`, or a mapping
/// owned by the platform).
///
/// # Safety
///
/// The caller that builds a region guarantees:
/// - `base` is valid for reads and writes of `len` bytes
/// - `base` is aligned for every register type placed in it (4 bytes)
/// - the memory outlives every copy of the region
#[derive(Clone, Copy)]
pub struct Region {
    base: NonNull<u8>,
    len: usize,
}

impl Region {
    /// Wrap a raw pointer and length.
    ///
    /// # Safety
    ///
    /// See the type-level contract.
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        let Some(base) = NonNull::new(base) else {
            panic!("region base must be non-null");
        };
        Self { base, len }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if `off..off + len` lies inside the region.
    #[inline]
    pub fn contains(&self, off: usize, len: usize) -> bool {
        off.checked_add(len).is_some_and(|end| end <= self.len)
    }

    /// Pointer to byte `off`. Panics when out of bounds.
    #[inline]
    pub fn offset(&self, off: usize) -> *mut u8 {
        assert!(
            off < self.len,
            "offset {off:#x} out of bounds (len={:#x})",
            self.len
        );
        unsafe { self.as_ptr().add(off) }
    }

    /// Borrow a `T` placed at `off`.
    ///
    /// # Safety
    ///
    /// `off` must be aligned for `T`, the whole `T` must be in bounds, and
    /// the bytes must be a valid `T`. Only use this for atomics and other
    /// types that tolerate concurrent mutation by the peer.
    #[inline]
    pub unsafe fn get<T>(&self, off: usize) -> &T {
        debug_assert!(self.contains(off, size_of::<T>()));
        debug_assert!(off.is_multiple_of(align_of::<T>()));
        unsafe { &*(self.offset(off) as *const T) }
    }

    /// Copy `dst.len()` bytes starting at `off` out of the region.
    ///
    /// Panics when the range is out of bounds.
    pub fn read_bytes(&self, off: usize, dst: &mut [u8]) {
        assert!(
            self.contains(off, dst.len()),
            "read {off:#x}+{:#x} out of bounds (len={:#x})",
            dst.len(),
            self.len
        );
        // SAFETY: bounds checked above; the destination is a distinct
        // local buffer.
        unsafe { ptr::copy_nonoverlapping(self.as_ptr().add(off), dst.as_mut_ptr(), dst.len()) };
    }

    /// Copy `src` into the region starting at `off`.
    ///
    /// Panics when the range is out of bounds.
    pub fn write_bytes(&self, off: usize, src: &[u8]) {
        assert!(
            self.contains(off, src.len()),
            "write {off:#x}+{:#x} out of bounds (len={:#x})",
            src.len(),
            self.len
        );
        // SAFETY: bounds checked above.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.as_ptr().add(off), src.len()) };
    }

    /// A sub-window `off..off + len` of this region.
    pub fn subregion(&self, off: usize, len: usize) -> Region {
        assert!(self.contains(off, len), "subregion out of bounds");
        Region {
            // SAFETY: in bounds, and offsetting a non-null pointer inside an
            // allocation stays non-null.
            base: unsafe { NonNull::new_unchecked(self.as_ptr().add(off)) },
            len,
        }
    }
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

#[cfg(any(test, feature = "alloc"))]
mod heap {
    use super::Region;
    use alloc::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
    use core::ptr::NonNull;

    /// Zeroed heap memory standing in for the shared window.
    pub struct HeapRegion {
        base: NonNull<u8>,
        len: usize,
        layout: Layout,
    }

    impl HeapRegion {
        /// Allocate `size` zeroed bytes, 64-byte aligned.
        pub fn new_zeroed(size: usize) -> Self {
            let Ok(layout) = Layout::from_size_align(size.max(1), 64) else {
                panic!("invalid heap region size {size:#x}");
            };
            let ptr = unsafe { alloc_zeroed(layout) };
            let Some(base) = NonNull::new(ptr) else {
                handle_alloc_error(layout)
            };
            Self {
                base,
                len: size,
                layout,
            }
        }

        #[inline]
        pub fn region(&self) -> Region {
            unsafe { Region::from_raw(self.base.as_ptr(), self.len) }
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.len
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.len == 0
        }
    }

    impl Drop for HeapRegion {
        fn drop(&mut self) {
            unsafe { dealloc(self.base.as_ptr(), self.layout) };
        }
    }

    unsafe impl Send for HeapRegion {}
    unsafe impl Sync for HeapRegion {}
}

#[cfg(any(test, feature = "alloc"))]
pub use heap::HeapRegion;

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn byte_copies_stay_inside_the_window() {
        let heap = HeapRegion::new_zeroed(64);
        let region = heap.region();

        region.write_bytes(60, b"abcd");
        let mut out = [0u8; 4];
        region.read_bytes(60, &mut out);
        assert_eq!(&out, b"abcd");

        assert!(region.contains(60, 4));
        assert!(!region.contains(61, 4));
        assert!(!region.contains(usize::MAX, 2));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn write_past_end_panics() {
        let heap = HeapRegion::new_zeroed(16);
        heap.region().write_bytes(14, b"xyz");
    }

    #[test]
    fn subregion_shares_memory() {
        let heap = HeapRegion::new_zeroed(128);
        let region = heap.region();
        let tail = region.subregion(96, 32);

        tail.write_bytes(0, &[7; 4]);
        let mut out = [0u8; 4];
        region.read_bytes(96, &mut out);
        assert_eq!(out, [7; 4]);
        assert_eq!(tail.len(), 32);
    }
}
