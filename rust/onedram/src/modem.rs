//! The OneDRAM endpoint: semaphore arbitration, mailbox interrupt handling
//! and lifecycle bookkeeping around one shared window.
//!
//! One lock guards the arbiter, the lifecycle state and the cached FIFO
//! levels; one condition variable wakes everybody waiting on any of them.
//! Hardware effects decided by the [`Arbiter`] are applied while that lock
//! is still held, so the semaphore register and the arbiter never disagree
//! from the point of view of another thread. Inbound bytes are handed to
//! link callbacks with the lock released.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use sipc::CancelToken;
use sipc::gate::CANCEL_POLL_INTERVAL;

use crate::arbiter::{Arbiter, ArbiterStats, Handoff, PeerRequest, Request};
use crate::config::ModemConfig;
use crate::control::ControlState;
use crate::error::ModemError;
use crate::layout::*;
use crate::lifecycle::{ModemState, ModemVariant, sanitize_error_message};
use crate::pipe::{Pipe, PipeAvail, PipeId};
use crate::power::PowerControl;
use crate::smr::Smr;

/// Raises the modem's mailbox interrupt after the AP posted a value.
///
/// Called with the endpoint lock held; implementations must not block and
/// must not call back into the endpoint.
pub trait Doorbell: Send + Sync {
    fn ring(&self, value: u32);
}

/// For hardware where writing the mailbox register interrupts the modem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterDoorbell;

impl Doorbell for RegisterDoorbell {
    fn ring(&self, _value: u32) {}
}

/// Everything guarded by the endpoint lock.
#[derive(Debug, Default)]
pub(crate) struct CtlState {
    pub(crate) arbiter: Arbiter,
    pub(crate) modem: ModemState,
    pub(crate) avail: [PipeAvail; PipeId::COUNT],
    /// Bytes announced by the last ramdump size message, 0 once consumed.
    pub(crate) ramdump_size: usize,
    pub(crate) logdump_done: bool,
    pub(crate) crash_reason: Option<String>,
}

pub struct ModemCtl {
    config: ModemConfig,
    pub(crate) smr: Smr,
    pub(crate) power: Arc<dyn PowerControl>,
    doorbell: Arc<dyn Doorbell>,
    pub(crate) state: Mutex<CtlState>,
    pub(crate) wq: Condvar,
    pub(crate) ctl_lock: Mutex<ControlState>,
    pub(crate) control_open: AtomicBool,
    pub(crate) pipes: [Pipe; PipeId::COUNT],
}

impl ModemCtl {
    /// An endpoint over a fresh in-process window laid out by
    /// `config.layout`.
    pub fn new(
        config: ModemConfig,
        power: Arc<dyn PowerControl>,
        doorbell: Arc<dyn Doorbell>,
    ) -> Result<Arc<Self>, ModemError> {
        let smr = Smr::heap(config.layout.clone())?;
        Ok(Self::with_smr(config, smr, power, doorbell))
    }

    /// An endpoint over an existing window. The window's layout wins over
    /// `config.layout`.
    pub fn with_smr(
        mut config: ModemConfig,
        smr: Smr,
        power: Arc<dyn PowerControl>,
        doorbell: Arc<dyn Doorbell>,
    ) -> Arc<Self> {
        if config.layout != *smr.layout() {
            debug!("configured layout differs from the window's, using the window's");
            config.layout = smr.layout().clone();
        }
        let pipes = PipeId::ALL.map(|id| Pipe::new(&smr, id));
        info!(
            variant = config.variant.name(),
            size = smr.layout().size,
            "onedram endpoint ready"
        );
        Arc::new(Self {
            config,
            smr,
            power,
            doorbell,
            state: Mutex::new(CtlState::default()),
            wq: Condvar::new(),
            ctl_lock: Mutex::new(ControlState::default()),
            control_open: AtomicBool::new(false),
            pipes,
        })
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn variant(&self) -> ModemVariant {
        self.config.variant
    }

    pub fn smr(&self) -> &Smr {
        &self.smr
    }

    pub fn pipe(&self, id: PipeId) -> &Pipe {
        &self.pipes[id as usize]
    }

    pub fn state(&self) -> ModemState {
        self.state.lock().modem
    }

    /// Sanitized message of the last crash, if the modem left one.
    pub fn crash_reason(&self) -> Option<String> {
        self.state.lock().crash_reason.clone()
    }

    pub fn logdump_done(&self) -> bool {
        self.state.lock().logdump_done
    }

    /// Bytes of the current ramdump chunk, 0 when none is announced.
    pub fn ramdump_size(&self) -> usize {
        self.state.lock().ramdump_size
    }

    pub fn stats(&self) -> ArbiterStats {
        self.state.lock().arbiter.stats()
    }

    pub fn is_owner(&self) -> bool {
        self.state.lock().arbiter.is_owner()
    }

    pub fn ref_count(&self) -> u32 {
        self.state.lock().arbiter.ref_count()
    }

    /// Cached FIFO levels of `id`, as of the last refresh.
    pub fn pipe_avail(&self, id: PipeId) -> PipeAvail {
        self.state.lock().avail[id as usize]
    }

    // ── semaphore ───────────────────────────────────────────────────────

    /// Take a reference without blocking. Returns whether the semaphore is
    /// ours now.
    pub fn request_access(&self) -> bool {
        let mut st = self.state.lock();
        self.request_locked(&mut st)
    }

    /// Take a reference and wait until the semaphore is ours.
    ///
    /// On any failure the reference is dropped again.
    pub fn acquire_access(&self, cancel: Option<&CancelToken>) -> Result<(), ModemError> {
        let mut st = self.state.lock();
        let waited = if self.request_locked(&mut st) {
            Ok(())
        } else {
            self.wait_until(&mut st, self.config.acquire_timeout, cancel, |s| {
                s.arbiter.is_owner() || s.modem.is_offline()
            })
        };
        let err = match waited {
            Ok(()) if st.arbiter.is_owner() && st.modem.is_running() => return Ok(()),
            Ok(()) => ModemError::NotRunning,
            Err(err) => err,
        };
        debug!(%err, state = ?st.modem, "semaphore not acquired");
        self.release_locked(&mut st, 0);
        Err(err)
    }

    /// Drop a reference, asking for `bits` to be signalled to the modem.
    pub fn release_access(&self, bits: u32) {
        let mut st = self.state.lock();
        self.release_locked(&mut st, bits);
    }

    pub(crate) fn request_locked(&self, st: &mut CtlState) -> bool {
        let running = st.modem.is_running();
        match st.arbiter.request(self.smr.sem_held(), running) {
            Request::Owned => true,
            Request::Claimed => {
                self.refresh_all(st);
                true
            }
            Request::Ask => {
                self.mailbox(command(MBC_REQ_SEM));
                false
            }
            Request::Wait => false,
        }
    }

    pub(crate) fn release_locked(&self, st: &mut CtlState, bits: u32) {
        let handoff = st.arbiter.release(bits, st.modem.is_running());
        self.apply_handoff(handoff);
    }

    fn apply_handoff(&self, handoff: Handoff) {
        match handoff {
            Handoff::None => {}
            Handoff::ResSem => {
                self.smr.give_sem();
                self.mailbox(command(MBC_RES_SEM));
            }
            Handoff::Signal(bits) => {
                self.smr.give_sem();
                self.mailbox(MB_VALID | bits);
            }
        }
    }

    /// Post `value` to the modem and ring its doorbell.
    pub(crate) fn mailbox(&self, value: u32) {
        debug!(value = format_args!("{value:#010x}"), "mailbox -> modem");
        self.smr.post_ap_mailbox(value);
        self.doorbell.ring(value);
    }

    /// Wait on the endpoint condition until `done` holds.
    ///
    /// With a cancellation token the wait is sliced so cancellation is
    /// noticed promptly.
    pub(crate) fn wait_until(
        &self,
        st: &mut MutexGuard<'_, CtlState>,
        timeout: Duration,
        cancel: Option<&CancelToken>,
        mut done: impl FnMut(&CtlState) -> bool,
    ) -> Result<(), ModemError> {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&**st) {
                return Ok(());
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(ModemError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ModemError::Timeout);
            }
            let mut slice = deadline - now;
            if cancel.is_some() {
                slice = slice.min(CANCEL_POLL_INTERVAL);
            }
            self.wq.wait_for(st, slice);
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    pub(crate) fn set_state(&self, st: &mut CtlState, to: ModemState) {
        let from = std::mem::replace(&mut st.modem, to);
        if from != to {
            debug!(?from, ?to, "modem state");
        }
        // Outside Running the semaphore register is not a grant we asked
        // for.
        if to != ModemState::Running {
            st.arbiter.drop_ownership();
        }
        self.wq.notify_all();
    }

    fn crash(&self, st: &mut CtlState, reason: Option<String>) {
        match &reason {
            Some(reason) => error!(%reason, state = ?st.modem, "modem crashed"),
            None => error!(state = ?st.modem, "modem crashed"),
        }
        st.crash_reason = reason;
        self.set_state(st, ModemState::Crashed);
    }

    /// Record an anomaly detected on this side and take the modem down.
    pub fn force_crash(&self, reason: &str) {
        let mut st = self.state.lock();
        self.crash(&mut st, Some(reason.to_owned()));
    }

    fn enter_running(&self, st: &mut CtlState) {
        if self.config.variant.eager_init_end() {
            self.mailbox(command(MBC_INIT_END) | CP_BOOT_AIRPLANE);
        }
        self.set_state(st, ModemState::Running);
        if st.arbiter.has_waiters() && !st.arbiter.is_owner() {
            if self.smr.sem_held() {
                self.refresh_all(st);
                st.arbiter.claim_for_waiters();
            } else {
                self.mailbox(command(MBC_REQ_SEM));
            }
        }
    }

    // ── interrupt ───────────────────────────────────────────────────────

    /// Process one mailbox interrupt from the modem.
    pub fn handle_mailbox_irq(&self) {
        let value = self.smr.bp_mailbox();
        debug!(value = format_args!("{value:#010x}"), "mailbox <- modem");

        let mut st = self.state.lock();
        if !st.modem.is_running() {
            self.handle_boot_message(&mut st, value);
            return;
        }

        if value & MB_VALID == 0 {
            if value == MODEM_MSG_LOGDUMP_DONE {
                info!("modem log dump complete");
                st.logdump_done = true;
            } else {
                warn!(value = format_args!("{value:#010x}"), "unexpected mailbox value");
            }
            return;
        }

        if value & MB_COMMAND != 0 {
            if !self.handle_command(&mut st, value & MB_COMMAND_MASK) {
                return;
            }
        } else if self.config.variant.requests_sem_on_data() && !self.smr.sem_held() {
            self.mailbox(command(MBC_REQ_SEM));
            return;
        }

        if !self.smr.sem_held() {
            return;
        }

        self.refresh_all(&mut st);
        if st.arbiter.claim_for_waiters() {
            trace!(refs = st.arbiter.ref_count(), "semaphore granted to waiters");
        }
        let ready = PipeId::DRAIN_ORDER.map(|id| st.avail[id as usize].rx_count > 0);
        drop(st);

        for (id, ready) in PipeId::DRAIN_ORDER.into_iter().zip(ready) {
            if !ready {
                continue;
            }
            if let Err(err) = self.pipe_recv(id) {
                debug!(pipe = ?id, %err, "inbound drain skipped");
            }
        }

        let mut st = self.state.lock();
        if self.smr.sem_held()
            && let Some(bits) = st.arbiter.take_signal()
        {
            self.smr.give_sem();
            self.mailbox(MB_VALID | bits);
        }
    }

    /// Returns whether the interrupt should go on to inbound processing.
    fn handle_command(&self, st: &mut CtlState, cmd: u32) -> bool {
        match cmd {
            MBC_REQ_SEM => match st.arbiter.peer_request(self.smr.sem_held()) {
                PeerRequest::Confused => {
                    debug!("modem asked for a semaphore it holds");
                    self.mailbox(command(MBC_RES_SEM));
                }
                PeerRequest::Instant => {
                    self.refresh_all(st);
                    self.smr.give_sem();
                    self.mailbox(command(MBC_RES_SEM));
                    return false;
                }
                PeerRequest::Delayed => {
                    trace!(refs = st.arbiter.ref_count(), "semaphore request deferred");
                }
            },
            MBC_PHONE_START => {
                info!("modem phone start");
                self.mailbox(command(MBC_INIT_END) | CP_BOOT_AIRPLANE | AP_OS_ANDROID);
                if st.arbiter.has_waiters() && !st.arbiter.is_owner() {
                    self.mailbox(command(MBC_REQ_SEM));
                }
            }
            MBC_RESET => {
                self.crash(st, Some("modem requested reset".to_owned()));
                return false;
            }
            MBC_ERR_DISPLAY => {
                let reason = sanitize_error_message(&self.smr.error_message());
                self.crash(st, Some(reason));
                return false;
            }
            MBC_SUSPEND => debug!("modem suspending"),
            MBC_RESUME => debug!("modem resuming"),
            other => debug!(cmd = other, "unhandled mailbox command"),
        }
        true
    }

    fn handle_boot_message(&self, st: &mut CtlState, value: u32) {
        let crash_cmd = value & (MB_VALID | MB_COMMAND) == MB_VALID | MB_COMMAND
            && matches!(value & MB_COMMAND_MASK, MBC_RESET | MBC_ERR_DISPLAY);

        match (st.modem, value) {
            (ModemState::BootingNormal, MODEM_MSG_BINARY_DONE) => {
                info!("modem binary running");
                self.enter_running(st);
            }
            (ModemState::BootingRamdump | ModemState::Dumping, MODEM_MSG_RAMDUMP_LARGE) => {
                st.ramdump_size = self.smr.layout().ramdump_large();
                debug!(size = st.ramdump_size, "large ramdump chunk announced");
                self.set_state(st, ModemState::Dumping);
            }
            (ModemState::BootingRamdump | ModemState::Dumping, MODEM_MSG_RAMDUMP_SMALL) => {
                st.ramdump_size = self.smr.layout().ramdump_small;
                debug!(size = st.ramdump_size, "small ramdump chunk announced");
                self.set_state(st, ModemState::Dumping);
            }
            (_, MODEM_MSG_LOGDUMP_DONE) => {
                info!("modem log dump complete");
                st.logdump_done = true;
            }
            (state, _) if crash_cmd && !state.is_offline() => {
                let reason = if value & MB_COMMAND_MASK == MBC_ERR_DISPLAY {
                    sanitize_error_message(&self.smr.error_message())
                } else {
                    "modem requested reset".to_owned()
                };
                self.crash(st, Some(reason));
            }
            (state, _) => {
                debug!(
                    ?state,
                    value = format_args!("{value:#010x}"),
                    "mailbox value ignored while not running"
                );
            }
        }
    }
}
