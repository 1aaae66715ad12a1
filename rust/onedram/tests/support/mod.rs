//! A simulated modem on the far side of the window.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use onedram::layout::*;
use onedram::{
    ControlSession, Doorbell, Input, ModemConfig, ModemCtl, ModemState, Pin, PipeId,
    PowerControl, Supply,
};
use parking_lot::{Condvar, Mutex};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Every value the AP posted, in order.
#[derive(Default)]
pub struct RecordingDoorbell {
    rung: Mutex<VecDeque<u32>>,
    changed: Condvar,
}

impl Doorbell for RecordingDoorbell {
    fn ring(&self, value: u32) {
        self.rung.lock().push_back(value);
        self.changed.notify_all();
    }
}

impl RecordingDoorbell {
    /// Oldest value not yet consumed.
    pub fn next(&self, timeout: Duration) -> Option<u32> {
        let deadline = Instant::now() + timeout;
        let mut rung = self.rung.lock();
        loop {
            if let Some(value) = rung.pop_front() {
                return Some(value);
            }
            if self.changed.wait_until(&mut rung, deadline).timed_out() {
                return rung.pop_front();
            }
        }
    }

    /// Consume values up to and including `value`.
    pub fn wait_for(&self, value: u32) -> bool {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.next(left) {
                Some(v) if v == value => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    }

    pub fn pending(&self) -> Vec<u32> {
        self.rung.lock().iter().copied().collect()
    }

    pub fn clear(&self) {
        self.rung.lock().clear();
    }
}

/// Pins and supplies that only remember what was done to them.
#[derive(Default)]
pub struct FakePower {
    pub pins: Mutex<Vec<(Pin, bool)>>,
}

impl PowerControl for FakePower {
    fn set_pin(&self, pin: Pin, high: bool) -> io::Result<()> {
        self.pins.lock().push((pin, high));
        Ok(())
    }

    fn get_input(&self, _input: Input) -> io::Result<bool> {
        Ok(false)
    }

    fn supply_enabled(&self, _supply: Supply) -> io::Result<bool> {
        Ok(false)
    }

    fn enable_supply(&self, _supply: Supply) -> io::Result<()> {
        Ok(())
    }

    fn disable_supply(&self, _supply: Supply) -> io::Result<()> {
        Ok(())
    }

    fn set_voltage(&self, _supply: Supply, _microvolts: u32) -> io::Result<()> {
        Ok(())
    }

    fn delay(&self, _duration: Duration) {}
}

pub struct Peer {
    pub modem: Arc<ModemCtl>,
    pub doorbell: Arc<RecordingDoorbell>,
    pub power: Arc<FakePower>,
}

impl Peer {
    pub fn new(config: ModemConfig) -> Self {
        init_tracing();
        let doorbell = Arc::new(RecordingDoorbell::default());
        let power = Arc::new(FakePower::default());
        let modem = ModemCtl::new(config, power.clone(), doorbell.clone()).unwrap();
        Self {
            modem,
            doorbell,
            power,
        }
    }

    /// Post `value` and raise the interrupt.
    pub fn post(&self, value: u32) {
        self.modem.smr().post_bp_mailbox(value);
        self.modem.handle_mailbox_irq();
    }

    /// Hand the semaphore to the AP along with `value`.
    pub fn grant(&self, value: u32) {
        self.modem.smr().set_sem(1);
        self.post(value);
    }

    /// Answer the next `REQ_SEM` the AP sends.
    pub fn grant_next_request(&self) {
        assert!(
            self.doorbell.wait_for(command(MBC_REQ_SEM)),
            "AP never asked for the semaphore"
        );
        self.grant(command(MBC_RES_SEM));
    }

    /// Ask for the semaphore back. Returns whether the AP let go.
    pub fn request_sem(&self) -> bool {
        self.post(command(MBC_REQ_SEM));
        !self.modem.smr().sem_held()
    }

    /// Everything the AP queued on `pipe`.
    pub fn read_tx(&self, pipe: PipeId) -> Vec<u8> {
        let fifo = self.modem.smr().tx_fifo(pipe);
        let (first, second) = fifo.peek();
        let mut bytes = first.to_vec();
        bytes.extend_from_slice(second);
        fifo.skip(bytes.len() as u32);
        bytes
    }

    /// Queue bytes for the AP on `pipe`.
    pub fn write_rx(&self, pipe: PipeId, bytes: &[u8]) {
        let written = self.modem.smr().rx_fifo(pipe).write(bytes);
        assert_eq!(written, bytes.len(), "rx fifo full");
    }

    /// Boot loader is up, has handed over the semaphore and waits for an
    /// image.
    pub fn sbl_ready(&self) {
        self.modem.smr().set_sem(1);
        self.modem.smr().post_bp_mailbox(MODEM_MSG_SBL_DONE);
    }

    /// Power on and boot to Running, leaving the semaphore with the modem.
    pub fn boot(&self) -> ControlSession {
        let session = self.modem.open_control().unwrap();
        session.reset().unwrap();
        self.sbl_ready();
        self.start(&session);
        self.doorbell.clear();
        session
    }

    /// Run `session.start()` and answer its binary load.
    pub fn start(&self, session: &ControlSession) {
        thread::scope(|s| {
            let start = s.spawn(|| session.start());
            assert!(self.doorbell.wait_for(MODEM_CMD_BINARY_LOAD));
            self.post(MODEM_MSG_BINARY_DONE);
            start.join().unwrap().unwrap();
        });
        assert_eq!(self.modem.state(), ModemState::Running);
    }
}

/// Spin until `cond` holds, for at most [`WAIT`].
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
