// Logging macros for onedram.
//
// These forward to the tracing crate.

#![allow(unused_macro_rules)]

// trace! - arbiter decisions, fifo index updates

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!($($arg)*) }
}

// debug! - mailbox traffic, lifecycle transitions

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!($($arg)*) }
}

// info! - administrative operations

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) }
}

// warn! - unbalanced releases, unexpected mailbox values, dropped input

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) }
}

// error! - modem crashes and power sequencing failures

macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!($($arg)*) }
}
