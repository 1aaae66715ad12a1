//! Circular byte FIFOs laid out inside a shared window.
//!
//! Each FIFO is a pair of 32-bit indices (`head`, `tail`) plus a data area
//! whose size is a power of two. The producer advances `head`, the consumer
//! advances `tail`, and one byte is always left unused so that
//! `head == tail` unambiguously means empty. Index arithmetic follows the
//! classic circ-buf macros:
//!
//! ```text
//! count          = (head - tail) & (size - 1)
//! space          = (tail - head - 1) & (size - 1)
//! count_to_end   = min(count, size - tail)
//! space_to_end   = min(space, size - head)
//! ```
//!
//! Indices written by the peer are masked on every load, so a corrupt value
//! can never send a copy outside the data area.

use core::mem::size_of;
use core::ptr;

use crate::region::Region;
use crate::sync::{AtomicU32, Ordering};

/// Head/tail pair as stored in the shared window.
#[repr(C)]
pub struct FifoIndex {
    /// Producer position.
    pub head: AtomicU32,
    /// Consumer position.
    pub tail: AtomicU32,
}

#[cfg(not(loom))]
const _: () = assert!(size_of::<FifoIndex>() == 8);

/// Where one FIFO lives inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoGeometry {
    pub index_offset: usize,
    pub data_offset: usize,
    pub size: u32,
}

impl FifoGeometry {
    pub const fn new(index_offset: usize, data_offset: usize, size: u32) -> Self {
        Self {
            index_offset,
            data_offset,
            size,
        }
    }

    /// True if the geometry is usable inside a region of `len` bytes.
    pub fn fits(&self, len: usize) -> bool {
        self.size.is_power_of_two()
            && self.size >= 2
            && self.index_offset.is_multiple_of(4)
            && self
                .index_offset
                .checked_add(size_of::<FifoIndex>())
                .is_some_and(|end| end <= len)
            && self
                .data_offset
                .checked_add(self.size as usize)
                .is_some_and(|end| end <= len)
    }

    /// Byte range of the data area.
    pub fn data_range(&self) -> core::ops::Range<usize> {
        self.data_offset..self.data_offset + self.size as usize
    }
}

/// How much can be read right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadWindow {
    /// Bytes readable before the data area wraps.
    pub contiguous: u32,
    /// All bytes readable.
    pub total: u32,
}

/// A byte FIFO over raw pointers into the shared window.
pub struct ByteFifoRaw {
    index: *const FifoIndex,
    data: *mut u8,
    size: u32,
}

unsafe impl Send for ByteFifoRaw {}
unsafe impl Sync for ByteFifoRaw {}

impl ByteFifoRaw {
    /// # Safety
    ///
    /// - `index` points to a live, 4-byte aligned `FifoIndex`
    /// - `data` is valid for `size` bytes
    /// - `size` is a power of two
    /// - the memory outlives this value
    #[inline]
    pub unsafe fn from_raw(index: *const FifoIndex, data: *mut u8, size: u32) -> Self {
        debug_assert!(size.is_power_of_two());
        Self { index, data, size }
    }

    #[inline]
    fn index(&self) -> &FifoIndex {
        unsafe { &*self.index }
    }

    #[inline]
    fn mask(&self) -> u32 {
        self.size - 1
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn head(&self) -> u32 {
        self.index().head.load(Ordering::Acquire) & self.mask()
    }

    #[inline]
    pub fn tail(&self) -> u32 {
        self.index().tail.load(Ordering::Acquire) & self.mask()
    }

    /// Bytes waiting to be consumed.
    #[inline]
    pub fn count(&self) -> u32 {
        self.head().wrapping_sub(self.tail()) & self.mask()
    }

    /// Bytes that can be produced without overwriting unread data.
    #[inline]
    pub fn space(&self) -> u32 {
        self.tail().wrapping_sub(self.head().wrapping_add(1)) & self.mask()
    }

    /// Readable bytes before the consumer position wraps.
    pub fn count_to_end(&self) -> u32 {
        let (head, tail) = (self.head(), self.tail());
        let end = self.size - tail;
        let n = head.wrapping_add(end) & self.mask();
        if n < end { n } else { end }
    }

    /// Writable bytes before the producer position wraps.
    pub fn space_to_end(&self) -> u32 {
        let (head, tail) = (self.head(), self.tail());
        let end = self.size - 1 - head;
        let n = end.wrapping_add(tail) & self.mask();
        if n <= end { n } else { end + 1 }
    }

    pub fn read_window(&self) -> ReadWindow {
        ReadWindow {
            contiguous: self.count_to_end(),
            total: self.count(),
        }
    }

    /// Append all of `src`, or nothing.
    ///
    /// Returns the number of bytes written: `src.len()` on success, `0`
    /// when free space is short.
    pub fn write(&self, src: &[u8]) -> usize {
        let len = src.len();
        if len == 0 || len > self.space() as usize {
            return 0;
        }

        let head = self.head();
        let first = len.min(self.space_to_end() as usize);
        // SAFETY: head < size and first <= size - head; the remainder
        // starts at offset 0 and is bounded by space.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.data.add(head as usize), first);
            if first < len {
                ptr::copy_nonoverlapping(src.as_ptr().add(first), self.data, len - first);
            }
        }

        let next = (head as usize + len) as u32 & self.mask();
        self.index().head.store(next, Ordering::Release);
        len
    }

    /// Borrow the unread bytes as at most two slices, oldest first.
    ///
    /// The slices stay meaningful until the next `skip`, `purge` or `read`
    /// on this FIFO.
    pub fn peek(&self) -> (&[u8], &[u8]) {
        let window = self.read_window();
        let tail = self.tail() as usize;
        // SAFETY: tail + contiguous <= size, and the wrapped part starts at
        // zero with length total - contiguous < size.
        unsafe {
            let first = core::slice::from_raw_parts(self.data.add(tail), window.contiguous as usize);
            let second = core::slice::from_raw_parts(
                self.data,
                (window.total - window.contiguous) as usize,
            );
            (first, second)
        }
    }

    /// Copy up to `dst.len()` unread bytes out and consume them.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let (first, second) = self.peek();
        let n1 = first.len().min(dst.len());
        dst[..n1].copy_from_slice(&first[..n1]);
        let n2 = second.len().min(dst.len() - n1);
        dst[n1..n1 + n2].copy_from_slice(&second[..n2]);
        self.skip((n1 + n2) as u32);
        n1 + n2
    }

    /// Consume `n` bytes without copying them.
    pub fn skip(&self, n: u32) {
        let next = self.tail().wrapping_add(n) & self.mask();
        self.index().tail.store(next, Ordering::Release);
    }

    /// Drop everything by resetting both indices.
    pub fn purge(&self) {
        let index = self.index();
        index.head.store(0, Ordering::Release);
        index.tail.store(0, Ordering::Release);
    }
}

/// A `ByteFifoRaw` placed inside a [`Region`] by a [`FifoGeometry`].
///
/// Like the region it was built from, this is a view: it does not keep the
/// backing memory alive.
pub struct ByteFifo {
    inner: ByteFifoRaw,
}

impl ByteFifo {
    /// Lay out a fresh, empty FIFO.
    ///
    /// # Safety
    ///
    /// The region must be writable, must outlive the returned FIFO, and
    /// nobody else may use this FIFO's bytes during initialization.
    pub unsafe fn init(region: Region, geometry: FifoGeometry) -> Self {
        assert!(
            geometry.fits(region.len()),
            "fifo geometry {geometry:?} does not fit region of {:#x} bytes",
            region.len()
        );
        let index = region.offset(geometry.index_offset) as *mut FifoIndex;
        unsafe {
            ptr::write(
                index,
                FifoIndex {
                    head: AtomicU32::new(0),
                    tail: AtomicU32::new(0),
                },
            )
        };
        unsafe { Self::attach(region, geometry) }
    }

    /// View a FIFO the peer (or an earlier `init`) already laid out.
    ///
    /// # Safety
    ///
    /// The index words at `geometry.index_offset` must hold a valid
    /// `FifoIndex`, and the region must outlive the returned FIFO.
    pub unsafe fn attach(region: Region, geometry: FifoGeometry) -> Self {
        assert!(
            geometry.fits(region.len()),
            "fifo geometry {geometry:?} does not fit region of {:#x} bytes",
            region.len()
        );
        let index = region.offset(geometry.index_offset) as *const FifoIndex;
        let data = region.offset(geometry.data_offset);
        let inner = unsafe { ByteFifoRaw::from_raw(index, data, geometry.size) };
        Self { inner }
    }

    #[inline]
    pub fn inner(&self) -> &ByteFifoRaw {
        &self.inner
    }
}

impl core::ops::Deref for ByteFifo {
    type Target = ByteFifoRaw;

    fn deref(&self) -> &ByteFifoRaw {
        &self.inner
    }
}
