#![doc = include_str!("../README.md")]
#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod fifo;
pub mod region;
pub mod sync;

#[cfg(all(unix, feature = "std"))]
pub mod mmap;

pub use fifo::{ByteFifo, ByteFifoRaw, FifoGeometry, FifoIndex};
#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;

#[cfg(all(unix, feature = "std"))]
pub use mmap::MmapRegion;

#[cfg(all(test, not(loom)))]
mod proptests;
