//! Network-device channels (`rmnet0`, ...).

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::channel::{IoChannel, StatsSnapshot};
use crate::frame::{FRAME_TAILROOM, FrameBuf, MAX_FRAME_HEADROOM};
use crate::header::Header;
use crate::ipc::{SamsungIpc, TxQueue};

pub const NETDEV_MTU: usize = 1500;
pub const NETDEV_TX_QUEUE_LEN: usize = 1000;

/// Outcome of [`NetDevice::xmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Queued for the link. Delivery failures are not reported back.
    Accepted,
    /// The modem stopped RAW traffic; offer the packet again later.
    Busy,
}

/// A RAW logical channel exposed as a point-to-point network interface.
pub struct NetDevice {
    ipc: Arc<SamsungIpc>,
    chan: Arc<IoChannel>,
}

impl NetDevice {
    pub(crate) fn new(ipc: Arc<SamsungIpc>, chan: Arc<IoChannel>) -> Self {
        Self { ipc, chan }
    }

    pub fn name(&self) -> &str {
        self.chan.name()
    }

    pub fn mtu(&self) -> usize {
        NETDEV_MTU
    }

    pub fn tx_queue_len(&self) -> usize {
        NETDEV_TX_QUEUE_LEN
    }

    /// Room to reserve around packets so framing never copies them.
    pub fn needed_room(&self) -> (usize, usize) {
        (MAX_FRAME_HEADROOM, FRAME_TAILROOM)
    }

    pub fn open(&self) {
        let users = self.chan.open_ref();
        if !self.ipc.raw_flow_stopped() {
            self.chan.wake_queue();
        }
        debug!(netdev = self.name(), users, "up");
    }

    pub fn stop(&self) {
        let users = self.chan.close_ref();
        self.chan.stop_queue();
        debug!(netdev = self.name(), users, "down");
    }

    pub fn is_queue_stopped(&self) -> bool {
        self.chan.queue_stopped()
    }

    /// Frame `packet` for this channel and hand it to the RAW queue.
    pub fn xmit(&self, mut packet: FrameBuf) -> TxStatus {
        if self.chan.queue_stopped() {
            return TxStatus::Busy;
        }
        let len = packet.len();
        if packet.ensure_room(MAX_FRAME_HEADROOM, FRAME_TAILROOM) {
            trace!(netdev = self.name(), len, "expanded packet for framing");
        }
        packet.frame_in_place(&Header::raw(len, self.chan.channel()));

        let stats = self.chan.stats();
        stats.tx_packets.fetch_add(1, Ordering::Relaxed);
        stats.tx_bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.ipc.queue_frame(TxQueue::Raw, packet.into_vec());
        TxStatus::Accepted
    }

    /// Next packet the modem sent to this interface.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.chan.dequeue()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.chan.stats().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IpcConfig;
    use crate::format::Format;
    use crate::frame::encode;
    use crate::ipc::LINK_CMD_STOP_RAW;
    use crate::link::{LinkCallback, LinkRegistry};

    fn ipc() -> Arc<SamsungIpc> {
        SamsungIpc::probe(IpcConfig::default(), Arc::new(LinkRegistry::new()))
    }

    #[test]
    fn xmit_frames_with_masked_channel_and_counts() {
        let ipc = ipc();
        let dev = ipc.net_device("rmnet1").unwrap();
        dev.open();

        let (head, tail) = dev.needed_room();
        let packet = FrameBuf::with_room(&[0x45, 0, 0, 20], head, tail);
        assert_eq!(dev.xmit(packet), TxStatus::Accepted);
        assert_eq!(ipc.queued(TxQueue::Raw), 1);

        let stats = dev.stats();
        assert_eq!(stats.tx_packets, 1);
        assert_eq!(stats.tx_bytes, 4);
    }

    #[test]
    fn xmit_expands_packets_without_room() {
        let ipc = ipc();
        let dev = ipc.net_device("rmnet0").unwrap();
        dev.open();
        assert_eq!(
            dev.xmit(FrameBuf::from_vec(b"ip".to_vec())),
            TxStatus::Accepted
        );
        assert_eq!(
            ipc.pop_queued(TxQueue::Raw).unwrap(),
            encode(&Header::raw(2, 0x0a), b"ip")
        );
        assert_eq!(dev.stats().tx_bytes, 2);
    }

    #[test]
    fn stopped_queue_reports_busy() {
        let ipc = ipc();
        let dev = ipc.net_device("rmnet0").unwrap();
        dev.open();
        ipc.receive(&LINK_CMD_STOP_RAW.to_le_bytes(), Format::Cmd)
            .unwrap();
        assert!(dev.is_queue_stopped());
        assert_eq!(dev.xmit(FrameBuf::from_vec(vec![1])), TxStatus::Busy);
        assert_eq!(ipc.queued(TxQueue::Raw), 0);
    }

    #[test]
    fn misc_channels_are_not_netdevs() {
        let ipc = ipc();
        assert!(ipc.net_device("umts_csd").is_none());
        assert_eq!(ipc.net_device("rmnet2").unwrap().mtu(), NETDEV_MTU);
    }
}
