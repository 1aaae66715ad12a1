//! Error types for the OneDRAM endpoint.

use std::fmt;
use std::io;

use sipc::LinkError;

use crate::layout::LayoutError;
use crate::lifecycle::ModemState;
use crate::wait::Timeout;

/// Failure of an endpoint or administrative operation.
#[derive(Debug)]
pub enum ModemError {
    /// The semaphore, boot or ramdump wait ran out of time.
    Timeout,
    /// The caller's cancellation token fired while it was waiting.
    Interrupted,
    /// The modem is not running.
    NotRunning,
    /// The modem reported a crash; only a reset recovers.
    Crashed,
    /// Another control session is open.
    Busy,
    /// The operation is not legal in the current lifecycle state.
    InvalidState {
        expected: ModemState,
        actual: ModemState,
    },
    /// The modem bootloader has not posted its ready marker.
    BootloaderNotReady,
    /// The AP does not hold the hardware semaphore.
    NotOwner,
    /// Position or length outside the visible window.
    OutOfRange { offset: usize, len: usize },
    /// The message can never fit the pipe's FIFO.
    TooLarge { len: usize, max: usize },
    /// The power collaborator failed.
    Power(io::Error),
    Layout(LayoutError),
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemError::Timeout => write!(f, "timed out"),
            ModemError::Interrupted => write!(f, "interrupted"),
            ModemError::NotRunning => write!(f, "modem not running"),
            ModemError::Crashed => write!(f, "modem crashed"),
            ModemError::Busy => write!(f, "control session already open"),
            ModemError::InvalidState { expected, actual } => {
                write!(f, "modem is {actual:?}, expected {expected:?}")
            }
            ModemError::BootloaderNotReady => write!(f, "bootloader not ready"),
            ModemError::NotOwner => write!(f, "semaphore not held"),
            ModemError::OutOfRange { offset, len } => {
                write!(f, "range {offset:#x}+{len:#x} outside the visible window")
            }
            ModemError::TooLarge { len, max } => {
                write!(f, "message of {len} bytes exceeds pipe limit of {max}")
            }
            ModemError::Power(err) => write!(f, "power sequencing failed: {err}"),
            ModemError::Layout(err) => write!(f, "bad layout: {err}"),
        }
    }
}

impl std::error::Error for ModemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModemError::Power(err) => Some(err),
            ModemError::Layout(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ModemError {
    fn from(err: io::Error) -> Self {
        ModemError::Power(err)
    }
}

impl From<LayoutError> for ModemError {
    fn from(err: LayoutError) -> Self {
        ModemError::Layout(err)
    }
}

impl From<Timeout> for ModemError {
    fn from(_: Timeout) -> Self {
        ModemError::Timeout
    }
}

impl From<ModemError> for LinkError {
    fn from(err: ModemError) -> Self {
        match err {
            ModemError::Timeout => LinkError::Timeout,
            ModemError::Interrupted => LinkError::Interrupted,
            ModemError::Busy => LinkError::Busy,
            ModemError::Crashed => LinkError::Crashed,
            ModemError::TooLarge { len, max } => LinkError::TooLarge { len, max },
            ModemError::Power(_) | ModemError::Layout(_) => LinkError::NoDevice,
            ModemError::NotRunning
            | ModemError::InvalidState { .. }
            | ModemError::BootloaderNotReady
            | ModemError::NotOwner
            | ModemError::OutOfRange { .. } => LinkError::NotRunning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_errors_keep_retry_semantics() {
        assert!(LinkError::from(ModemError::Timeout).is_retryable());
        assert!(LinkError::from(ModemError::Interrupted).is_retryable());
        assert!(LinkError::from(ModemError::NotRunning).discards_message());
        assert_eq!(LinkError::from(ModemError::Crashed), LinkError::Crashed);
        assert_eq!(
            LinkError::from(ModemError::TooLarge { len: 9, max: 4 }),
            LinkError::TooLarge { len: 9, max: 4 }
        );
    }

    #[test]
    fn power_errors_expose_their_source() {
        use std::error::Error;
        let err = ModemError::from(io::Error::other("regulator stuck"));
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "power sequencing failed: regulator stuck"
        );
    }
}
