//! Flow-control gate and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::IpcError;

/// How often a blocked waiter re-checks its cancellation token.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A flag a blocked operation polls to give up early.
///
/// Clones share the flag. Cancelling wakes nothing by itself; waiters
/// notice within [`CANCEL_POLL_INTERVAL`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Whether a transmit may wait for flow control to lift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Blocking,
    /// Fail with `Busy` instead of waiting.
    NonBlocking,
}

/// An open/closed gate that blocked transmitters wait on.
pub struct FlowGate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl FlowGate {
    pub fn new(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            changed: Condvar::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.changed.notify_all();
    }

    pub fn close(&self) {
        *self.open.lock() = false;
    }

    /// Return once the gate is open.
    pub fn pass(&self, mode: TxMode, cancel: Option<&CancelToken>) -> Result<(), IpcError> {
        let mut open = self.open.lock();
        while !*open {
            if mode == TxMode::NonBlocking {
                return Err(IpcError::Busy);
            }
            match cancel {
                Some(token) => {
                    if token.is_cancelled() {
                        return Err(IpcError::Interrupted);
                    }
                    self.changed.wait_for(&mut open, CANCEL_POLL_INTERVAL);
                }
                None => self.changed.wait(&mut open),
            }
        }
        Ok(())
    }
}
