//! OneDRAM modem endpoint.
//!
//! The application processor and the modem share one 16 MiB window. A
//! single-bit hardware semaphore decides who may touch it, and two mailbox
//! registers carry commands and "data queued" bits between the two sides.
//! [`ModemCtl`] arbitrates the semaphore, tracks the modem's lifecycle,
//! handles the mailbox interrupt, and moves framed messages through the
//! per-format FIFOs. [`register_links`] plugs those FIFOs into an
//! [`sipc::LinkRegistry`].
//!
//! Pins and regulators stay with the platform behind [`PowerControl`]. The
//! modem's interrupt line is whatever calls
//! [`ModemCtl::handle_mailbox_irq`].

#[macro_use]
mod macros;

pub mod arbiter;
pub mod config;
pub mod control;
pub mod error;
pub mod layout;
pub mod lifecycle;
pub mod link;
pub mod modem;
pub mod pipe;
pub mod power;
pub mod smr;
pub mod wait;

pub use arbiter::{Arbiter, ArbiterStats, Handoff, PeerRequest, Request};
pub use config::ModemConfig;
pub use control::ControlSession;
pub use error::ModemError;
pub use layout::{LayoutError, PipeLayout, SmrLayout};
pub use lifecycle::{ModemState, ModemVariant, sanitize_error_message};
pub use link::{OneDramLink, register_links};
pub use modem::{Doorbell, ModemCtl, RegisterDoorbell};
pub use pipe::{Pipe, PipeAvail, PipeId};
pub use power::{Input, Pin, PowerControl, PowerStep, Supply};
pub use smr::Smr;
pub use wait::{Backoff, Timeout, poll_until};
