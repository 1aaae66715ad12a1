//! Administrative control of the modem: power, boot, firmware upload and
//! crash dumps.
//!
//! Only one [`ControlSession`] exists at a time. Its operations are
//! serialized among themselves but run concurrently with pipe traffic.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use crate::error::ModemError;
use crate::layout::*;
use crate::lifecycle::ModemState;
use crate::modem::ModemCtl;
use crate::power::{self, Pin};
use crate::wait::{Backoff, poll_until};

/// State private to the control path.
#[derive(Debug, Default)]
pub(crate) struct ControlState {
    /// Read position inside the current ramdump chunk.
    pub(crate) ramdump_pos: usize,
}

impl ModemCtl {
    /// Open the control surface. A second concurrent open fails with
    /// [`ModemError::Busy`].
    pub fn open_control(self: &Arc<Self>) -> Result<ControlSession, ModemError> {
        if self.control_open.swap(true, Ordering::AcqRel) {
            return Err(ModemError::Busy);
        }
        debug!("control session opened");
        Ok(ControlSession {
            modem: Arc::clone(self),
        })
    }
}

/// Exclusive handle on the control surface; closes on drop.
pub struct ControlSession {
    modem: Arc<ModemCtl>,
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.modem.control_open.store(false, Ordering::Release);
        debug!("control session closed");
    }
}

impl ControlSession {
    pub fn modem(&self) -> &Arc<ModemCtl> {
        &self.modem
    }

    pub fn state(&self) -> ModemState {
        self.modem.state()
    }

    fn require(&self, expected: ModemState) -> Result<(), ModemError> {
        let actual = self.modem.state();
        if actual == expected {
            Ok(())
        } else {
            Err(ModemError::InvalidState { expected, actual })
        }
    }

    /// Power the modem on (or cycle it) and wait for nothing: the boot
    /// loader announces itself through the mailbox.
    pub fn reset(&self) -> Result<(), ModemError> {
        let _ctl = self.modem.ctl_lock.lock();
        let modem = &*self.modem;
        info!(variant = modem.variant().name(), "modem reset");

        modem.smr.post_bp_mailbox(0);
        modem.mailbox(0);
        if let Err(err) = power::power_on(&*modem.power, modem.variant()) {
            error!(%err, "power on failed");
            return Err(err.into());
        }

        let mut st = modem.state.lock();
        st.crash_reason = None;
        st.logdump_done = false;
        st.ramdump_size = 0;
        modem.set_state(&mut st, ModemState::PoweredOn);
        Ok(())
    }

    /// Hand the loaded image to the boot loader and wait until the modem
    /// reports it running.
    pub fn start(&self) -> Result<(), ModemError> {
        let _ctl = self.modem.ctl_lock.lock();
        self.require(ModemState::PoweredOn)?;
        if self.modem.smr.bp_mailbox() != MODEM_MSG_SBL_DONE {
            return Err(ModemError::BootloaderNotReady);
        }
        info!("modem start");
        self.boot(ModemState::BootingNormal, MODEM_CMD_BINARY_LOAD, ModemState::Running)
    }

    /// [`start`](Self::start) without checking state or the boot loader.
    pub fn binary_load(&self) -> Result<(), ModemError> {
        let _ctl = self.modem.ctl_lock.lock();
        info!("modem binary load");
        self.boot(ModemState::BootingNormal, MODEM_CMD_BINARY_LOAD, ModemState::Running)
    }

    /// Ask the boot loader for a crash dump and wait for the first chunk.
    pub fn start_ramdump(&self) -> Result<(), ModemError> {
        let mut ctl = self.modem.ctl_lock.lock();
        self.require(ModemState::PoweredOn)?;
        if self.modem.smr.bp_mailbox() != MODEM_MSG_SBL_DONE {
            return Err(ModemError::BootloaderNotReady);
        }
        info!("modem ramdump start");
        ctl.ramdump_pos = 0;
        self.modem.state.lock().ramdump_size = 0;
        self.boot(ModemState::BootingRamdump, MODEM_CMD_RAMDUMP_START, ModemState::Dumping)
    }

    fn boot(&self, via: ModemState, cmd: u32, target: ModemState) -> Result<(), ModemError> {
        let modem = &*self.modem;
        let mut st = modem.state.lock();
        modem.smr.give_sem();
        modem.set_state(&mut st, via);
        modem.mailbox(cmd);

        modem.wait_until(&mut st, modem.config().boot_timeout, None, |s| {
            s.modem == target || s.modem.is_offline()
        })?;
        match st.modem {
            state if state == target => Ok(()),
            ModemState::Crashed => Err(ModemError::Crashed),
            actual => Err(ModemError::InvalidState {
                expected: target,
                actual,
            }),
        }
    }

    /// Power the modem off. Always succeeds.
    pub fn off(&self) {
        let _ctl = self.modem.ctl_lock.lock();
        info!("modem off");
        power::power_off(&*self.modem.power, self.modem.variant());
        let mut st = self.modem.state.lock();
        self.modem.set_state(&mut st, ModemState::Off);
    }

    /// Poll until the boot loader posted its marker and handed over the
    /// semaphore.
    pub fn wait_for_sbl(&self) -> Result<(), ModemError> {
        let _ctl = self.modem.ctl_lock.lock();
        let modem = &*self.modem;
        let backoff = Backoff::fixed(modem.config().sbl_poll_interval, modem.config().sbl_timeout);

        poll_until(backoff, thread::sleep, || {
            (modem.smr.bp_mailbox() == MODEM_MSG_SBL_DONE).then_some(())
        })
        .inspect_err(|timeout| warn!(%timeout, "boot loader marker not seen"))?;
        poll_until(backoff, thread::sleep, || modem.smr.sem_held().then_some(()))
            .inspect_err(|timeout| warn!(%timeout, "boot loader kept the semaphore"))?;
        debug!("boot loader ready");
        Ok(())
    }

    /// Copy the next part of the crash dump into `buf`.
    ///
    /// Returns 0 when nothing more is available. Finishing a large chunk
    /// asks the modem for the next one and waits for its announcement.
    pub fn read_ramdump(&self, buf: &mut [u8]) -> Result<usize, ModemError> {
        let mut ctl = self.modem.ctl_lock.lock();
        let modem = &*self.modem;

        let size = {
            let st = modem.state.lock();
            if st.modem != ModemState::Dumping {
                return Err(ModemError::InvalidState {
                    expected: ModemState::Dumping,
                    actual: st.modem,
                });
            }
            st.ramdump_size
        };
        let pos = ctl.ramdump_pos;
        if pos >= size {
            debug!(pos, size, "ramdump exhausted");
            return Ok(0);
        }

        let count = buf.len().min(size - pos);
        modem.smr.read(pos, &mut buf[..count]);
        let pos = pos + count;
        if pos < size {
            ctl.ramdump_pos = pos;
            return Ok(count);
        }

        ctl.ramdump_pos = 0;
        let mut st = modem.state.lock();
        st.ramdump_size = 0;
        if size == modem.smr.layout().ramdump_large() {
            debug!("ramdump chunk done, asking for more");
            modem.smr.give_sem();
            modem.mailbox(MODEM_CMD_RAMDUMP_MORE);
            let announced = modem.wait_until(&mut st, modem.config().ramdump_timeout, None, |s| {
                s.ramdump_size != 0 || s.modem != ModemState::Dumping
            });
            if announced.is_err() {
                warn!("modem announced no further ramdump chunk");
            }
        } else {
            info!("ramdump complete");
        }
        Ok(count)
    }

    /// Copy part of a firmware image into the window at `pos`.
    ///
    /// Returns how many bytes fit below the control area.
    pub fn write_image(&self, pos: usize, data: &[u8]) -> Result<usize, ModemError> {
        let _ctl = self.modem.ctl_lock.lock();
        let modem = &*self.modem;
        self.require(ModemState::PoweredOn)?;
        if !modem.smr.sem_held() {
            return Err(ModemError::NotOwner);
        }
        let visible = modem.smr.layout().visible_len();
        if pos >= visible {
            return Err(ModemError::OutOfRange {
                offset: pos,
                len: data.len(),
            });
        }
        let count = data.len().min(visible - pos);
        modem.smr.write(pos, &data[..count]);
        trace!(pos, count, "image bytes written");
        Ok(count)
    }

    pub fn suspend(&self) -> Result<(), ModemError> {
        debug!("pda inactive");
        self.modem.power.set_pin(Pin::PdaActive, false)?;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ModemError> {
        debug!("pda active");
        self.modem.power.set_pin(Pin::PdaActive, true)?;
        Ok(())
    }
}
