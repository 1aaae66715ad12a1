//! Atomic shims so the FIFO can be model-checked under loom.

#[cfg(not(loom))]
pub use core::sync::atomic::{AtomicU32, Ordering, fence};
#[cfg(loom)]
pub use loom::sync::atomic::{AtomicU32, Ordering, fence};

#[cfg(loom)]
pub use loom::thread;
#[cfg(all(not(loom), any(test, feature = "std")))]
pub use std::thread;
