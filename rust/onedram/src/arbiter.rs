//! Bookkeeping for the OneDRAM hardware semaphore.
//!
//! The semaphore is a single bit: whoever holds it may touch the window.
//! Local users take references; the first one asks the modem for the
//! semaphore and the last one gives it back, together with whatever
//! "data sent" bits accumulated meanwhile. The modem may ask for it back at
//! any time and is told to wait until the references drain.
//!
//! [`Arbiter`] is plain data. Every method reports what the caller must do
//! to the hardware (post a mailbox message, flip the semaphore), so the
//! endpoint can apply the effect while it still holds the lock guarding
//! this struct.

/// Outcome of [`Arbiter::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Already owned; go ahead.
    Owned,
    /// The semaphore was already ours in hardware and is now claimed.
    Claimed,
    /// Not owned; ask the modem with `REQ_SEM`.
    Ask,
    /// Not owned and the modem cannot be asked right now.
    Wait,
}

/// What to do when ownership is given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Keep the hardware semaphore; nobody needs to hear about it.
    None,
    /// Give it back and answer the modem's pending request with `RES_SEM`.
    ResSem,
    /// Give it back and signal these data bits.
    Signal(u32),
}

/// How to answer a `REQ_SEM` from the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRequest {
    /// It asked for a semaphore it already holds; acknowledge anyway.
    Confused,
    /// Nobody is using it; give it back and acknowledge now.
    Instant,
    /// Busy; the last release will answer.
    Delayed,
}

/// Counters kept by the arbiter and the pipes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    pub request_wait: u64,
    pub request_no_wait: u64,
    pub release_bp_waiting: u64,
    pub release_bp_signaled: u64,
    pub release_no_action: u64,
    pub release_unbalanced: u64,
    pub bp_req_instant: u64,
    pub bp_req_delayed: u64,
    pub bp_req_confused: u64,
    pub pipe_tx: u64,
    pub pipe_tx_delayed: u64,
}

#[derive(Debug, Default)]
pub struct Arbiter {
    req_count: u32,
    owner: bool,
    bp_request: bool,
    signal_bits: u32,
    pub(crate) stats: ArbiterStats,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn ref_count(&self) -> u32 {
        self.req_count
    }

    pub fn has_waiters(&self) -> bool {
        self.req_count > 0
    }

    pub fn peer_waiting(&self) -> bool {
        self.bp_request
    }

    pub fn pending_bits(&self) -> u32 {
        self.signal_bits
    }

    pub fn stats(&self) -> ArbiterStats {
        self.stats
    }

    /// Take a reference.
    ///
    /// `sem_held` is the hardware semaphore as read right now; `running`
    /// says whether the modem can be asked. Outside Running the register
    /// belongs to the boot loader and is never claimed.
    pub fn request(&mut self, sem_held: bool, running: bool) -> Request {
        self.req_count += 1;
        if self.owner {
            self.stats.request_no_wait += 1;
            return Request::Owned;
        }
        if sem_held && running {
            trace!(refs = self.req_count, "semaphore already ours, claiming");
            self.owner = true;
            self.stats.request_no_wait += 1;
            return Request::Claimed;
        }
        self.stats.request_wait += 1;
        if running && self.req_count == 1 {
            Request::Ask
        } else {
            Request::Wait
        }
    }

    /// Drop a reference, adding `bits` to the pending signal.
    ///
    /// Releasing with no references left changes nothing.
    pub fn release(&mut self, bits: u32, running: bool) -> Handoff {
        let Some(remaining) = self.req_count.checked_sub(1) else {
            warn!(bits, "semaphore released without a reference");
            self.stats.release_unbalanced += 1;
            return Handoff::None;
        };
        self.req_count = remaining;
        self.signal_bits |= bits;
        if remaining > 0 || !running {
            return Handoff::None;
        }

        let handoff = if self.bp_request {
            self.bp_request = false;
            self.stats.release_bp_waiting += 1;
            Handoff::ResSem
        } else if self.signal_bits != 0 {
            self.stats.release_bp_signaled += 1;
            Handoff::Signal(self.signal_bits)
        } else {
            self.stats.release_no_action += 1;
            Handoff::None
        };
        self.owner = false;
        self.signal_bits = 0;
        trace!(?handoff, "last reference released");
        handoff
    }

    /// The modem asked for the semaphore.
    pub fn peer_request(&mut self, sem_held: bool) -> PeerRequest {
        if !sem_held {
            self.stats.bp_req_confused += 1;
            PeerRequest::Confused
        } else if self.req_count == 0 {
            self.owner = false;
            self.stats.bp_req_instant += 1;
            PeerRequest::Instant
        } else {
            self.bp_request = true;
            self.stats.bp_req_delayed += 1;
            PeerRequest::Delayed
        }
    }

    /// The hardware semaphore reads as ours but we have not claimed it.
    ///
    /// Claims it when somebody is waiting and reports whether it did.
    pub fn claim_for_waiters(&mut self) -> bool {
        if self.owner || self.req_count == 0 {
            return false;
        }
        self.owner = true;
        true
    }

    /// Pending bits to send now that I/O processing is over, if the
    /// semaphore is not being kept for a local user.
    pub fn take_signal(&mut self) -> Option<u32> {
        if self.owner || self.signal_bits == 0 {
            return None;
        }
        Some(std::mem::take(&mut self.signal_bits))
    }

    /// Forget ownership; used when the modem goes away.
    pub fn drop_ownership(&mut self) {
        self.owner = false;
        self.bp_request = false;
        self.signal_bits = 0;
    }
}
