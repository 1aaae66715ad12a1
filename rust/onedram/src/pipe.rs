//! Pipes: one tx/rx FIFO pair per wire format.
//!
//! Sending takes a semaphore reference, copies the frame into the tx FIFO
//! and releases with the pipe's data bit so the modem hears about it.
//! Receiving happens on the mailbox interrupt path: whatever the modem left
//! in the rx FIFO is handed to the registered callback in at most two
//! slices.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use sipc::{CancelToken, Format, LinkCallback};
use smr_primitives::ByteFifo;

use crate::error::ModemError;
use crate::layout::{MBD_SEND_FMT, MBD_SEND_RAW, MBD_SEND_RFS};
use crate::modem::{CtlState, ModemCtl};
use crate::smr::Smr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeId {
    Fmt = 0,
    Raw = 1,
    Rfs = 2,
}

impl PipeId {
    pub const COUNT: usize = 3;
    pub const ALL: [PipeId; PipeId::COUNT] = [PipeId::Fmt, PipeId::Raw, PipeId::Rfs];
    /// Order in which inbound FIFOs are drained.
    pub const DRAIN_ORDER: [PipeId; PipeId::COUNT] = [PipeId::Fmt, PipeId::Rfs, PipeId::Raw];

    pub fn from_format(format: Format) -> Option<Self> {
        match format {
            Format::Fmt => Some(PipeId::Fmt),
            Format::Raw | Format::MultiRaw => Some(PipeId::Raw),
            Format::Rfs => Some(PipeId::Rfs),
            Format::Cmd | Format::Ramdump => None,
        }
    }

    /// Format the pipe is bound as.
    pub fn format(self) -> Format {
        match self {
            PipeId::Fmt => Format::Fmt,
            PipeId::Raw => Format::Raw,
            PipeId::Rfs => Format::Rfs,
        }
    }

    /// Format reported for inbound bytes. The RAW FIFO carries every PDP
    /// context, so it is demultiplexed by channel id.
    pub fn rx_format(self) -> Format {
        match self {
            PipeId::Raw => Format::MultiRaw,
            other => other.format(),
        }
    }

    /// Mailbox data bit announcing new tx bytes.
    pub fn signal_bit(self) -> u32 {
        match self {
            PipeId::Fmt => MBD_SEND_FMT,
            PipeId::Raw => MBD_SEND_RAW,
            PipeId::Rfs => MBD_SEND_RFS,
        }
    }
}

/// Space/count as last seen while holding the semaphore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeAvail {
    pub tx_space: u32,
    pub rx_count: u32,
}

pub struct Pipe {
    id: PipeId,
    pub(crate) tx: ByteFifo,
    pub(crate) rx: ByteFifo,
    tx_lock: Mutex<()>,
    callback: RwLock<Option<Arc<dyn LinkCallback>>>,
}

impl Pipe {
    pub(crate) fn new(smr: &Smr, id: PipeId) -> Self {
        Self {
            id,
            tx: smr.tx_fifo(id),
            rx: smr.rx_fifo(id),
            tx_lock: Mutex::new(()),
            callback: RwLock::new(None),
        }
    }

    pub fn id(&self) -> PipeId {
        self.id
    }

    /// Largest frame this pipe accepts.
    pub fn max_frame(&self) -> usize {
        self.tx.size() as usize - 2
    }

    pub fn set_callback(&self, callback: Option<Arc<dyn LinkCallback>>) {
        *self.callback.write() = callback;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.read().is_some()
    }

    fn callback(&self) -> Option<Arc<dyn LinkCallback>> {
        self.callback.read().clone()
    }

    fn avail(&self) -> PipeAvail {
        PipeAvail {
            tx_space: self.tx.space(),
            rx_count: self.rx.count(),
        }
    }

    fn lock_tx(&self, cancel: Option<&CancelToken>) -> Result<MutexGuard<'_, ()>, ModemError> {
        let Some(token) = cancel else {
            return Ok(self.tx_lock.lock());
        };
        loop {
            if token.is_cancelled() {
                return Err(ModemError::Interrupted);
            }
            if let Some(guard) = self.tx_lock.try_lock_for(sipc::gate::CANCEL_POLL_INTERVAL) {
                return Ok(guard);
            }
        }
    }
}

impl ModemCtl {
    /// Re-read one pipe's FIFO indices into the cache.
    pub(crate) fn refresh_pipe(&self, st: &mut CtlState, id: PipeId) {
        let avail = self.pipes[id as usize].avail();
        trace!(pipe = ?id, tx_space = avail.tx_space, rx_count = avail.rx_count, "fifo state");
        st.avail[id as usize] = avail;
    }

    /// Re-read every pipe and wake anyone waiting on space or data.
    pub(crate) fn refresh_all(&self, st: &mut CtlState) {
        for id in PipeId::ALL {
            self.refresh_pipe(st, id);
        }
        self.wq.notify_all();
    }

    /// Copy one framed message into `id`'s tx FIFO.
    ///
    /// Senders on the same pipe are serialized. When the FIFO is full the
    /// semaphore is given up and the sender waits for the modem to make
    /// room, for at most the acquire timeout.
    pub fn pipe_send(
        &self,
        id: PipeId,
        frame: &[u8],
        cancel: Option<&CancelToken>,
    ) -> Result<(), ModemError> {
        let pipe = &self.pipes[id as usize];
        let len = frame.len();
        if len > pipe.max_frame() {
            return Err(ModemError::TooLarge {
                len,
                max: pipe.max_frame(),
            });
        }

        if !self.state().is_running() {
            return Err(ModemError::NotRunning);
        }

        let _tx = pipe.lock_tx(cancel)?;
        loop {
            self.acquire_access(cancel)?;

            let mut st = self.state.lock();
            self.refresh_pipe(&mut st, id);
            if st.avail[id as usize].tx_space as usize >= len {
                let written = pipe.tx.write(frame);
                debug_assert_eq!(written, len);
                self.refresh_pipe(&mut st, id);
                st.arbiter.stats.pipe_tx += 1;
                trace!(pipe = ?id, len, "frame written");
                self.release_locked(&mut st, id.signal_bit());
                return Ok(());
            }

            debug!(
                pipe = ?id,
                len,
                space = st.avail[id as usize].tx_space,
                "fifo full, waiting for the modem"
            );
            st.arbiter.stats.pipe_tx_delayed += 1;
            self.release_locked(&mut st, 0);
            self.wait_until(&mut st, self.config().acquire_timeout, cancel, |s| {
                s.avail[id as usize].tx_space as usize >= len || s.modem.is_offline()
            })?;
        }
    }

    /// Hand everything in `id`'s rx FIFO to its callback.
    ///
    /// Never blocks on the semaphore: the caller has just seen it held.
    /// Returns how many bytes were consumed; a callback error purges the
    /// FIFO and counts as zero.
    pub(crate) fn pipe_recv(&self, id: PipeId) -> Result<usize, ModemError> {
        {
            let mut st = self.state.lock();
            if !self.request_locked(&mut st) {
                self.release_locked(&mut st, 0);
                return Err(ModemError::NotOwner);
            }
        }

        let pipe = &self.pipes[id as usize];
        let format = id.rx_format();
        let (first, second) = pipe.rx.peek();
        let total = first.len() + second.len();

        let result = match pipe.callback() {
            Some(cb) if total > 0 => cb.receive(first, format).and_then(|()| {
                if second.is_empty() {
                    Ok(())
                } else {
                    cb.receive(second, format)
                }
            }),
            Some(_) => Ok(()),
            None => {
                warn!(pipe = ?id, len = total, "no receiver bound, dropping inbound bytes");
                Ok(())
            }
        };

        let consumed = match result {
            Ok(()) => {
                pipe.rx.skip(total as u32);
                total
            }
            Err(err) => {
                warn!(pipe = ?id, %err, "inbound bytes rejected, purging fifo");
                pipe.rx.purge();
                0
            }
        };

        let mut st = self.state.lock();
        self.refresh_pipe(&mut st, id);
        self.release_locked(&mut st, 0);
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_pipe_reports_multi_raw_inbound() {
        assert_eq!(PipeId::Raw.format(), Format::Raw);
        assert_eq!(PipeId::Raw.rx_format(), Format::MultiRaw);
        assert_eq!(PipeId::Fmt.rx_format(), Format::Fmt);
        assert_eq!(PipeId::from_format(Format::MultiRaw), Some(PipeId::Raw));
        assert_eq!(PipeId::from_format(Format::Cmd), None);
    }

    #[test]
    fn signal_bits_match_mailbox_data_bits() {
        assert_eq!(PipeId::Fmt.signal_bit(), 0x0002);
        assert_eq!(PipeId::Raw.signal_bit(), 0x0001);
        assert_eq!(PipeId::Rfs.signal_bit(), 0x0100);
    }
}
