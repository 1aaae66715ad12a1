//! Samsung IPC (SIPC) multiplexer.
//!
//! Logical channels for modem control (FMT), the remote filesystem (RFS)
//! and packet data (RAW) share a handful of physical links. This crate owns
//! everything above the link: HDLC framing and reassembly, the channel
//! table, per-format transmit queues with a background worker, RAW flow
//! control, and the byte-stream and network-device surfaces consumers use.
//!
//! Transports plug in through the [`Link`] trait and a [`LinkRegistry`]
//! shared between the multiplexer and whoever owns the hardware.

#[macro_use]
mod macros;

pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod gate;
pub mod header;
pub mod ipc;
pub mod link;
pub mod misc;
pub mod netdev;
pub mod worker;

pub use channel::{IoChannel, StatsSnapshot};
pub use codec::{Decoder, MAX_RX_SIZE, Segment};
pub use config::{ChannelConfig, IpcConfig};
pub use error::{DecodeError, IpcError, LinkError, RegistryError};
pub use format::{ChannelKind, Format, PerFormat, ProtocolVersion};
pub use frame::{FrameBuf, encode};
pub use gate::{CancelToken, FlowGate, TxMode};
pub use header::Header;
pub use ipc::{
    LINK_CMD_START_RAW, LINK_CMD_STOP_RAW, MAX_MULTI_RX_SIZE, SamsungIpc, TX_RETRY_DELAY, TxPass,
    TxQueue,
};
pub use link::{Link, LinkCallback, LinkRegistry, LinkState};
pub use misc::{MiscDevice, PollFlags};
pub use netdev::{NetDevice, TxStatus};
pub use worker::TxWorker;
