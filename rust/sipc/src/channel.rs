//! Logical channels and their inbound queues.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::ChannelConfig;
use crate::format::{ChannelKind, Format};

/// Counters kept for network-device channels.
#[derive(Debug, Default)]
pub struct ChannelStats {
    pub tx_packets: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub rx_packets: AtomicU64,
    pub rx_bytes: AtomicU64,
}

/// Plain copy of [`ChannelStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
}

impl ChannelStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A consumer-facing endpoint with an unbounded inbound queue.
pub struct IoChannel {
    config: ChannelConfig,
    rx: Mutex<VecDeque<Vec<u8>>>,
    readable: Condvar,
    use_count: AtomicUsize,
    /// Network transmit queue stopped by flow control.
    queue_stopped: AtomicBool,
    stats: ChannelStats,
}

impl IoChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            rx: Mutex::new(VecDeque::new()),
            readable: Condvar::new(),
            use_count: AtomicUsize::new(0),
            queue_stopped: AtomicBool::new(false),
            stats: ChannelStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn format(&self) -> Format {
        self.config.format
    }

    pub fn kind(&self) -> ChannelKind {
        self.config.kind
    }

    pub fn channel(&self) -> u32 {
        self.config.channel
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Queue an inbound message and wake readers.
    pub fn enqueue(&self, message: Vec<u8>) {
        trace!(channel = %self.config.name, len = message.len(), "rx enqueue");
        self.stats.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.stats
            .rx_bytes
            .fetch_add(message.len() as u64, Ordering::Relaxed);
        self.rx.lock().push_back(message);
        self.readable.notify_all();
    }

    pub fn dequeue(&self) -> Option<Vec<u8>> {
        self.rx.lock().pop_front()
    }

    /// Length of the next queued message.
    pub fn peek_len(&self) -> Option<usize> {
        self.rx.lock().front().map(Vec::len)
    }

    pub fn queued(&self) -> usize {
        self.rx.lock().len()
    }

    pub fn is_readable(&self) -> bool {
        !self.rx.lock().is_empty()
    }

    /// Drop every queued message; returns how many were dropped.
    pub fn purge(&self) -> usize {
        let mut rx = self.rx.lock();
        let n = rx.len();
        rx.clear();
        n
    }

    /// Block until a message is queued or `timeout` passes.
    pub fn wait_readable(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut rx = self.rx.lock();
        while rx.is_empty() {
            if self.readable.wait_until(&mut rx, deadline).timed_out() {
                return !rx.is_empty();
            }
        }
        true
    }

    /// Wake blocked readers without queuing anything.
    pub fn wake_readers(&self) {
        self.readable.notify_all();
    }

    pub(crate) fn open_ref(&self) -> usize {
        self.use_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop a use; never goes below zero.
    pub(crate) fn close_ref(&self) -> usize {
        let prev = self
            .use_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Acquire)
    }

    pub fn stop_queue(&self) {
        self.queue_stopped.store(true, Ordering::Release);
    }

    pub fn wake_queue(&self) {
        self.queue_stopped.store(false, Ordering::Release);
    }

    pub fn queue_stopped(&self) -> bool {
        self.queue_stopped.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for IoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoChannel")
            .field("name", &self.config.name)
            .field("format", &self.config.format)
            .field("kind", &self.config.kind)
            .field("channel", &format_args!("{:#x}", self.config.channel))
            .finish_non_exhaustive()
    }
}
