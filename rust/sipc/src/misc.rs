//! Byte-stream devices (`umts_ipc0`, `umts_rfs0`, ...).

use std::sync::Arc;
use std::time::Duration;

use crate::channel::IoChannel;
use crate::error::IpcError;
use crate::format::Format;
use crate::frame::encode;
use crate::gate::TxMode;
use crate::header::{Header, RFS_HEADER_LEN};
use crate::ipc::{SamsungIpc, TxQueue};

/// Readiness reported by [`MiscDevice::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollFlags {
    pub readable: bool,
    pub writable: bool,
}

/// A logical channel exposed as a message-oriented byte stream.
///
/// Every `write` is one message and every `read` returns one message.
pub struct MiscDevice {
    ipc: Arc<SamsungIpc>,
    chan: Arc<IoChannel>,
}

impl MiscDevice {
    pub(crate) fn new(ipc: Arc<SamsungIpc>, chan: Arc<IoChannel>) -> Self {
        Self { ipc, chan }
    }

    pub fn name(&self) -> &str {
        self.chan.name()
    }

    pub fn channel(&self) -> &Arc<IoChannel> {
        &self.chan
    }

    /// Fails with `NotReady` until a link serves this channel's format.
    pub fn open(&self) -> Result<(), IpcError> {
        let link = self
            .ipc
            .registry()
            .link(self.chan.format())
            .ok_or(IpcError::NotReady)?;
        link.open(self.chan.channel(), self.chan.format())?;
        let users = self.chan.open_ref();
        debug!(device = self.name(), users, "opened");
        Ok(())
    }

    /// Drop a user and discard anything still queued for reading.
    pub fn release(&self) {
        let users = self.chan.close_ref();
        let dropped = self.chan.purge();
        debug!(device = self.name(), users, dropped, "released");
    }

    /// Frame `bytes` as one message and queue it for transmission.
    ///
    /// RFS writes start with the caller's 6-byte RFS header; its length
    /// field is recomputed. RAMDUMP writes go out unframed and unqueued.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, IpcError> {
        let format = self.chan.format();
        self.ipc.live_link(format)?;

        let frame = match format {
            Format::Fmt => match Header::try_fmt(bytes.len(), 0) {
                Some(header) => encode(&header, bytes),
                None => return Err(IpcError::InvalidMessage),
            },
            Format::Raw | Format::MultiRaw => {
                encode(&Header::raw(bytes.len(), self.chan.channel()), bytes)
            }
            Format::Rfs => {
                if bytes.len() < RFS_HEADER_LEN {
                    return Err(IpcError::InvalidMessage);
                }
                let (cmd, id) = (bytes[4], bytes[5]);
                let payload = &bytes[RFS_HEADER_LEN..];
                encode(&Header::rfs(payload.len(), cmd, id), payload)
            }
            Format::Ramdump => {
                self.ipc
                    .transmit_now(format, bytes, TxMode::Blocking, None)?;
                return Ok(bytes.len());
            }
            Format::Cmd => return Err(IpcError::InvalidMessage),
        };

        let Some(queue) = TxQueue::for_format(format) else {
            return Err(IpcError::InvalidMessage);
        };
        self.ipc.queue_frame(queue, frame);
        Ok(bytes.len())
    }

    /// Move the next message into `buf`.
    ///
    /// Returns `Ok(0)` when nothing is queued. A message longer than `buf`
    /// is dropped and reported as `BufferTooSmall`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, IpcError> {
        self.ipc.live_link(self.chan.format())?;

        let Some(message) = self.chan.dequeue() else {
            return Ok(0);
        };
        if message.len() > buf.len() {
            warn!(
                device = self.name(),
                needed = message.len(),
                capacity = buf.len(),
                "read buffer too small, message dropped"
            );
            return Err(IpcError::BufferTooSmall {
                needed: message.len(),
                capacity: buf.len(),
            });
        }
        buf[..message.len()].copy_from_slice(&message);
        Ok(message.len())
    }

    pub fn poll(&self) -> PollFlags {
        PollFlags {
            readable: self.chan.is_readable(),
            writable: true,
        }
    }

    /// Block until a message is readable, `timeout` passes, or the link
    /// goes away.
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool, IpcError> {
        self.ipc.live_link(self.chan.format())?;
        let ready = self.chan.wait_readable(timeout);
        self.ipc.live_link(self.chan.format())?;
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IpcConfig;
    use crate::error::LinkError;
    use crate::link::{Link, LinkCallback, LinkRegistry, LinkState};
    use parking_lot::Mutex;

    struct FakeLink {
        state: Mutex<LinkState>,
        opened: Mutex<Vec<(u32, Format)>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeLink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(LinkState::Online),
                opened: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl Link for FakeLink {
        fn transmit(&self, frame: &[u8]) -> Result<(), LinkError> {
            self.sent.lock().push(frame.to_vec());
            Ok(())
        }

        fn open(&self, channel: u32, format: Format) -> Result<(), LinkError> {
            self.opened.lock().push((channel, format));
            Ok(())
        }

        fn set_callback(&self, _callback: Option<Arc<dyn LinkCallback>>) {}

        fn state(&self) -> LinkState {
            *self.state.lock()
        }
    }

    fn setup(format: Format) -> (Arc<SamsungIpc>, Arc<FakeLink>) {
        let ipc = SamsungIpc::probe(IpcConfig::default(), Arc::new(LinkRegistry::new()));
        let link = FakeLink::new();
        ipc.registry().set_link(format, link.clone()).unwrap();
        (ipc, link)
    }

    #[test]
    fn open_without_link_is_not_ready() {
        let ipc = SamsungIpc::probe(IpcConfig::default(), Arc::new(LinkRegistry::new()));
        let dev = ipc.misc_device("umts_ipc0").unwrap();
        assert_eq!(dev.open(), Err(IpcError::NotReady));
        assert_eq!(dev.channel().use_count(), 0);
    }

    #[test]
    fn open_asks_the_link_and_counts_users() {
        let (ipc, link) = setup(Format::Raw);
        let dev = ipc.misc_device("umts_csd").unwrap();
        dev.open().unwrap();
        assert_eq!(*link.opened.lock(), [(0x21, Format::Raw)]);
        assert_eq!(dev.channel().use_count(), 1);
    }

    #[test]
    fn write_frames_and_queues() {
        let (ipc, _link) = setup(Format::Raw);
        let dev = ipc.misc_device("umts_csd").unwrap();
        assert_eq!(dev.write(b"at"), Ok(2));
        assert_eq!(ipc.queued(TxQueue::Raw), 1);
    }

    #[test]
    fn rfs_write_uses_caller_header() {
        let (ipc, link) = setup(Format::Rfs);
        let dev = ipc.misc_device("umts_rfs0").unwrap();
        dev.write(&[0xff, 0xff, 0, 0, 0x21, 0x09, b'x']).unwrap();
        ipc.tx_pass();
        assert_eq!(
            link.sent.lock()[0],
            encode(&Header::rfs(1, 0x21, 0x09), b"x")
        );
    }

    #[test]
    fn short_rfs_write_is_rejected() {
        let (ipc, _link) = setup(Format::Rfs);
        let dev = ipc.misc_device("umts_rfs0").unwrap();
        assert_eq!(dev.write(&[1, 2, 3]), Err(IpcError::InvalidMessage));
    }

    #[test]
    fn fmt_write_past_the_length_field_is_rejected() {
        let (ipc, _link) = setup(Format::Fmt);
        let dev = ipc.misc_device("umts_ipc0").unwrap();
        let too_big = vec![0u8; u16::MAX as usize - 2];
        assert_eq!(dev.write(&too_big), Err(IpcError::InvalidMessage));
        assert_eq!(dev.write(&too_big[1..]), Ok(too_big.len() - 1));
        assert_eq!(ipc.queued(TxQueue::Fmt), 1);
    }

    #[test]
    fn write_while_offline_fails_fast() {
        let (ipc, link) = setup(Format::Fmt);
        let dev = ipc.misc_device("umts_ipc0").unwrap();
        *link.state.lock() = LinkState::Offline;
        assert_eq!(dev.write(b"x"), Err(IpcError::NotRunning));
        *link.state.lock() = LinkState::Crashed;
        assert_eq!(dev.write(b"x"), Err(IpcError::Crashed));
        assert_eq!(ipc.queued(TxQueue::Fmt), 0);
    }

    #[test]
    fn read_returns_zero_when_empty_and_drops_oversized() {
        let (ipc, _link) = setup(Format::Fmt);
        let dev = ipc.misc_device("umts_ipc0").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(dev.read(&mut buf), Ok(0));

        dev.channel().enqueue(b"toolong".to_vec());
        dev.channel().enqueue(b"ok".to_vec());
        assert_eq!(
            dev.read(&mut buf),
            Err(IpcError::BufferTooSmall {
                needed: 7,
                capacity: 4
            })
        );
        assert_eq!(dev.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ok");
    }

    #[test]
    fn read_after_crash_reports_crash() {
        let (ipc, link) = setup(Format::Fmt);
        let dev = ipc.misc_device("umts_ipc0").unwrap();
        ipc.receive(&encode(&Header::fmt(2, 0), b"hi"), Format::Fmt)
            .unwrap();
        assert!(dev.poll().readable);

        *link.state.lock() = LinkState::Crashed;
        let mut buf = [0u8; 8];
        assert_eq!(dev.read(&mut buf), Err(IpcError::Crashed));
    }

    #[test]
    fn release_discards_pending_messages() {
        let (ipc, _link) = setup(Format::Fmt);
        let dev = ipc.misc_device("umts_ipc0").unwrap();
        dev.open().unwrap();
        dev.channel().enqueue(vec![1, 2]);
        dev.release();
        assert!(!dev.poll().readable);
        assert_eq!(dev.channel().use_count(), 0);
    }
}
