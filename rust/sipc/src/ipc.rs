//! The multiplexer: inbound dispatch, transmit queues and flow control.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::channel::IoChannel;
use crate::codec::{Decoder, Segment};
use crate::config::IpcConfig;
use crate::error::{DecodeError, IpcError, LinkError};
use crate::format::{ChannelKind, Format, PerFormat, ProtocolVersion};
use crate::gate::{CancelToken, FlowGate, TxMode};
use crate::link::{Link, LinkCallback, LinkRegistry, LinkState};
use crate::misc::MiscDevice;
use crate::netdev::NetDevice;

/// Upper bound for one reassembled FMT message.
pub const MAX_MULTI_RX_SIZE: usize = 16 * 1024;

/// Delay before the transmit work runs again after a retryable failure.
pub const TX_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Link command: stop RAW transmission.
pub const LINK_CMD_STOP_RAW: u16 = 0x00ca;
/// Link command: resume RAW transmission.
pub const LINK_CMD_START_RAW: u16 = 0x00cb;

/// RAW channel ids in the channel table carry this bit on top of the
/// five-bit wire id.
pub const RAW_CHANNEL_BASE: u32 = 0x20;

const FMT_GROUPS: usize = 128;

/// Outbound queues, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxQueue {
    Rfs = 0,
    Fmt = 1,
    Raw = 2,
}

impl TxQueue {
    pub const PRIORITY: [TxQueue; 3] = [TxQueue::Rfs, TxQueue::Fmt, TxQueue::Raw];

    pub fn for_format(format: Format) -> Option<Self> {
        match format {
            Format::Rfs => Some(TxQueue::Rfs),
            Format::Fmt => Some(TxQueue::Fmt),
            Format::Raw | Format::MultiRaw => Some(TxQueue::Raw),
            Format::Cmd | Format::Ramdump => None,
        }
    }

    /// Format of the link that carries this queue.
    pub fn format(self) -> Format {
        match self {
            TxQueue::Rfs => Format::Rfs,
            TxQueue::Fmt => Format::Fmt,
            TxQueue::Raw => Format::Raw,
        }
    }
}

/// Result of one run of the transmit work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPass {
    /// Nothing sendable is left (RAW may be parked behind flow control).
    Drained,
    /// The link is gone; the offending frame was dropped.
    Aborted,
    /// A retryable failure; the frame is back at the head of its queue.
    Retry,
}

enum FmtGroup {
    Collecting(Vec<u8>),
    /// Overflowed; swallow the rest of the group.
    Discarding,
}

/// Samsung IPC multiplexer instance.
///
/// Built once from an [`IpcConfig`] and a shared [`LinkRegistry`]. The
/// instance installs itself as the registry's receive callback, so links
/// bound afterwards deliver straight into its decoders. Call
/// [`SamsungIpc::remove`] at shutdown to break that cycle.
pub struct SamsungIpc {
    version: ProtocolVersion,
    channels: Vec<Arc<IoChannel>>,
    registry: Arc<LinkRegistry>,
    tx_queues: [Mutex<VecDeque<Vec<u8>>>; 3],
    raw_gate: FlowGate,
    decoders: PerFormat<Option<Mutex<Decoder>>>,
    fmt_groups: Mutex<Box<[Option<FmtGroup>; FMT_GROUPS]>>,
    tx_kick: Arc<Notify>,
}

impl SamsungIpc {
    pub fn probe(config: IpcConfig, registry: Arc<LinkRegistry>) -> Arc<Self> {
        let config = config.validated();
        let version = config.version;
        let channels = config
            .channels
            .into_iter()
            .map(|c| Arc::new(IoChannel::new(c)))
            .collect::<Vec<_>>();

        let ipc = Arc::new(Self {
            version,
            channels,
            registry,
            tx_queues: Default::default(),
            raw_gate: FlowGate::new(true),
            decoders: PerFormat::from_fn(|format| {
                Decoder::new(format, version).ok().map(Mutex::new)
            }),
            fmt_groups: Mutex::new(Box::new(std::array::from_fn(|_| None))),
            tx_kick: Arc::new(Notify::new()),
        });
        ipc.registry.install_callback(ipc.clone());
        info!(
            version = version.as_u32(),
            channels = ipc.channels.len(),
            "samsung ipc ready"
        );
        ipc
    }

    /// Detach from every link and drop all queued traffic.
    pub fn remove(&self) {
        self.registry.teardown();
        for queue in &self.tx_queues {
            queue.lock().clear();
        }
        for chan in &self.channels {
            chan.purge();
            chan.wake_readers();
        }
        self.raw_gate.open();
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    pub fn channels(&self) -> &[Arc<IoChannel>] {
        &self.channels
    }

    /// First channel of `format`, or the one with id `channel` if given.
    pub fn find_channel(&self, format: Format, channel: Option<u32>) -> Option<&Arc<IoChannel>> {
        self.channels
            .iter()
            .find(|c| c.format() == format && channel.is_none_or(|id| c.channel() == id))
    }

    pub fn misc_device(self: &Arc<Self>, name: &str) -> Option<MiscDevice> {
        let chan = self
            .channels
            .iter()
            .find(|c| c.name() == name && c.kind() == ChannelKind::Misc)?;
        Some(MiscDevice::new(self.clone(), chan.clone()))
    }

    pub fn net_device(self: &Arc<Self>, name: &str) -> Option<NetDevice> {
        let chan = self
            .channels
            .iter()
            .find(|c| c.name() == name && c.kind() == ChannelKind::Netdev)?;
        Some(NetDevice::new(self.clone(), chan.clone()))
    }

    /// The link bound for `format`, checked for usability.
    pub(crate) fn live_link(&self, format: Format) -> Result<Arc<dyn Link>, IpcError> {
        let link = self.registry.link(format).ok_or(IpcError::NoTransport)?;
        match link.state() {
            LinkState::Online => Ok(link),
            LinkState::Offline => Err(IpcError::NotRunning),
            LinkState::Crashed => Err(IpcError::Crashed),
        }
    }

    // ── transmit ────────────────────────────────────────────────────────

    /// Handle the transmit work waits on.
    pub fn tx_kick(&self) -> Arc<Notify> {
        self.tx_kick.clone()
    }

    /// Queue a framed message and wake the transmit work.
    pub fn queue_frame(&self, queue: TxQueue, frame: Vec<u8>) {
        trace!(?queue, len = frame.len(), "tx enqueue");
        self.tx_queues[queue as usize].lock().push_back(frame);
        self.tx_kick.notify_one();
    }

    pub fn queued(&self, queue: TxQueue) -> usize {
        self.tx_queues[queue as usize].lock().len()
    }

    #[cfg(test)]
    pub(crate) fn pop_queued(&self, queue: TxQueue) -> Option<Vec<u8>> {
        self.tx_queues[queue as usize].lock().pop_front()
    }

    pub fn raw_flow_stopped(&self) -> bool {
        !self.raw_gate.is_open()
    }

    /// Send `frame` right away on the link for `format`.
    ///
    /// RAW traffic honors flow control: a blocking caller waits for the
    /// modem to resume it, a non-blocking caller gets `Busy`.
    pub fn transmit_now(
        &self,
        format: Format,
        frame: &[u8],
        mode: TxMode,
        cancel: Option<&CancelToken>,
    ) -> Result<(), IpcError> {
        if TxQueue::for_format(format) == Some(TxQueue::Raw) {
            self.raw_gate.pass(mode, cancel)?;
        }
        let link = self.registry.link(format).ok_or(IpcError::NoTransport)?;
        link.transmit(frame).map_err(IpcError::from)
    }

    fn send(&self, queue: TxQueue, frame: &[u8]) -> Result<(), LinkError> {
        let link = self
            .registry
            .link(queue.format())
            .ok_or(LinkError::NoDevice)?;
        link.transmit(frame)
    }

    /// One run of the transmit work.
    ///
    /// Takes one message from each queue per round, in priority order,
    /// until every queue is empty or parked.
    pub fn tx_pass(&self) -> TxPass {
        loop {
            let mut sent = false;
            for queue in TxQueue::PRIORITY {
                if queue == TxQueue::Raw && !self.raw_gate.is_open() {
                    continue;
                }
                let Some(frame) = self.tx_queues[queue as usize].lock().pop_front() else {
                    continue;
                };
                sent = true;
                match self.send(queue, &frame) {
                    Ok(()) => trace!(?queue, len = frame.len(), "tx sent"),
                    Err(err) if err.is_retryable() => {
                        debug!(?queue, %err, "tx deferred");
                        self.tx_queues[queue as usize].lock().push_front(frame);
                        return TxPass::Retry;
                    }
                    Err(err) => {
                        warn!(?queue, %err, len = frame.len(), "tx dropped");
                        return TxPass::Aborted;
                    }
                }
            }
            if !sent {
                return TxPass::Drained;
            }
        }
    }

    // ── receive ─────────────────────────────────────────────────────────

    fn dispatch(&self, format: Format, seg: Segment) {
        match format {
            Format::Fmt => self.dispatch_fmt(seg),
            Format::Rfs => self.dispatch_rfs(seg),
            Format::Raw => {
                let id = seg.header.raw_channel().unwrap_or(0) as u32;
                let chan = self
                    .find_channel(Format::Raw, Some(RAW_CHANNEL_BASE | id))
                    .or_else(|| self.find_channel(Format::Raw, None));
                self.deliver(chan, format, seg.data);
            }
            Format::MultiRaw => {
                let id = seg.header.raw_channel().unwrap_or(0) as u32;
                let chan = self.find_channel(Format::Raw, Some(RAW_CHANNEL_BASE | id));
                self.deliver(chan, format, seg.data);
            }
            Format::Cmd | Format::Ramdump => {}
        }
    }

    fn deliver(&self, chan: Option<&Arc<IoChannel>>, format: Format, data: Vec<u8>) {
        match chan {
            Some(chan) => chan.enqueue(data),
            None => warn!(?format, len = data.len(), "no channel for inbound frame"),
        }
    }

    fn dispatch_rfs(&self, seg: Segment) {
        let chan = self.find_channel(Format::Rfs, None);
        if seg.first {
            let (bytes, n) = seg.header.to_bytes();
            self.deliver(chan, Format::Rfs, bytes[..n].to_vec());
        }
        if !seg.data.is_empty() {
            self.deliver(chan, Format::Rfs, seg.data);
        }
    }

    fn dispatch_fmt(&self, seg: Segment) {
        let chan = self.find_channel(Format::Fmt, None);
        if self.version == ProtocolVersion::V42 {
            self.deliver(chan, Format::Fmt, seg.data);
            return;
        }

        let group = seg.header.group().unwrap_or(0) as usize;
        let continues = seg.header.more_frames() || !seg.last;
        let mut groups = self.fmt_groups.lock();
        let slot = &mut groups[group];

        let next = match slot.take() {
            None if !continues => {
                drop(groups);
                self.deliver(chan, Format::Fmt, seg.data);
                return;
            }
            None => append_group(Vec::new(), seg.data, group),
            Some(FmtGroup::Collecting(buf)) => append_group(buf, seg.data, group),
            Some(FmtGroup::Discarding) => FmtGroup::Discarding,
        };

        if continues {
            *slot = Some(next);
            return;
        }
        drop(groups);
        if let FmtGroup::Collecting(buf) = next {
            debug!(group, len = buf.len(), "fmt group reassembled");
            self.deliver(chan, Format::Fmt, buf);
        }
    }

    fn handle_link_commands(&self, data: &[u8]) {
        let mut words = data.chunks_exact(2);
        for word in &mut words {
            match u16::from_le_bytes([word[0], word[1]]) {
                LINK_CMD_STOP_RAW => {
                    debug!("modem stopped raw traffic");
                    self.raw_gate.close();
                    for chan in self.netdevs() {
                        chan.stop_queue();
                    }
                }
                LINK_CMD_START_RAW => {
                    debug!("modem resumed raw traffic");
                    for chan in self.netdevs() {
                        chan.wake_queue();
                    }
                    self.raw_gate.open();
                    self.tx_kick.notify_one();
                }
                other => warn!(cmd = other, "unknown link command"),
            }
        }
        if !words.remainder().is_empty() {
            warn!(len = data.len(), "trailing byte in link command stream");
        }
    }

    fn netdevs(&self) -> impl Iterator<Item = &Arc<IoChannel>> {
        self.channels
            .iter()
            .filter(|c| c.kind() == ChannelKind::Netdev)
    }
}

fn append_group(mut buf: Vec<u8>, data: Vec<u8>, group: usize) -> FmtGroup {
    if buf.len() + data.len() > MAX_MULTI_RX_SIZE || buf.try_reserve(data.len()).is_err() {
        warn!(
            group,
            len = buf.len() + data.len(),
            "fmt group exceeds reassembly limit, dropping"
        );
        return FmtGroup::Discarding;
    }
    buf.extend_from_slice(&data);
    FmtGroup::Collecting(buf)
}

impl LinkCallback for SamsungIpc {
    fn receive(&self, data: &[u8], format: Format) -> Result<(), DecodeError> {
        if format == Format::Cmd {
            self.handle_link_commands(data);
            return Ok(());
        }
        let Some(decoder) = &self.decoders[format] else {
            warn!(?format, len = data.len(), "inbound traffic for unframed format");
            return Err(DecodeError::Unframed(format));
        };

        let mut segments = Vec::new();
        let result = decoder.lock().decode(data, |seg| segments.push(seg));
        for seg in segments {
            self.dispatch(format, seg);
        }
        if let Err(err) = &result {
            warn!(?format, %err, "inbound stream corrupt, resynchronizing");
        }
        result
    }
}
