// Logging macros for sipc.
//
// Thin forwards to the tracing crate so call sites read the same in every
// module and the backend can be swapped in one place.

#![allow(unused_macro_rules)]

// trace! - per-chunk codec progress, queue churn

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!($($arg)*) }
}

// debug! - dispatch decisions, link commands

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!($($arg)*) }
}

// info! - links bound and cleared, devices opened

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) }
}

// warn! - framing errors, unroutable frames, dropped messages

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) }
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!($($arg)*) }
}

// Made available crate-wide via #[macro_use] on the module in lib.rs
