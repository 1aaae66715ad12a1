//! Error types for the IPC multiplexer.

use std::fmt;

use crate::format::Format;

/// Why an inbound byte stream could not be decoded.
///
/// Decode errors never reach consumers. The link purges its ring and the
/// decoder resynchronizes on the next start byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A delimiter byte was not where the framing requires one.
    Framing { expected: u8, found: u8 },
    /// The header declares a length shorter than the header itself.
    BadLength { declared: usize, header: usize },
    /// The receive buffer for the current frame could not be allocated.
    OutOfMemory,
    /// The format has no framed inbound representation.
    Unframed(Format),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Framing { expected, found } => {
                write!(f, "framing error: expected {expected:#04x}, found {found:#04x}")
            }
            DecodeError::BadLength { declared, header } => {
                write!(f, "declared length {declared} shorter than {header}-byte header")
            }
            DecodeError::OutOfMemory => write!(f, "out of memory for receive buffer"),
            DecodeError::Unframed(format) => write!(f, "{format:?} traffic is not framed"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Failure reported by a concrete link while moving a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The peer is not in a state that accepts traffic.
    NotRunning,
    /// The peer reported a crash; an administrative reset is needed.
    Crashed,
    /// Ownership of the transport could not be obtained in time.
    Timeout,
    /// The caller was cancelled while waiting.
    Interrupted,
    /// The transport is busy and the caller asked not to wait.
    Busy,
    /// The frame can never fit the transport.
    TooLarge { len: usize, max: usize },
    /// The transport is gone.
    NoDevice,
}

impl LinkError {
    /// True if the frame should be queued again and retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkError::Timeout | LinkError::Interrupted | LinkError::Busy
        )
    }

    /// True if the frame must be dropped.
    pub fn discards_message(&self) -> bool {
        !self.is_retryable()
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::NotRunning => write!(f, "modem not running"),
            LinkError::Crashed => write!(f, "modem crashed"),
            LinkError::Timeout => write!(f, "timed out waiting for the link"),
            LinkError::Interrupted => write!(f, "interrupted"),
            LinkError::Busy => write!(f, "link busy"),
            LinkError::TooLarge { len, max } => {
                write!(f, "frame of {len} bytes exceeds link limit of {max}")
            }
            LinkError::NoDevice => write!(f, "link device gone"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Failure to bind a link into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Another link already serves this format.
    AlreadyBound(Format),
    /// The multiplexer has not installed its receive callback yet. Retry.
    Deferred,
    /// The format cannot carry a link.
    InvalidFormat(u32),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyBound(format) => write!(f, "{format:?} link already bound"),
            RegistryError::Deferred => write!(f, "receive callback not installed yet"),
            RegistryError::InvalidFormat(raw) => write!(f, "invalid link format {raw}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors visible to consumers of logical channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// No transport is registered for the channel's format.
    NotReady,
    /// A frame was queued for a format nobody transports.
    NoTransport,
    /// The modem is not running.
    NotRunning,
    /// The modem crashed.
    Crashed,
    /// The next message does not fit the caller's buffer and was dropped.
    BufferTooSmall { needed: usize, capacity: usize },
    /// Flow control is engaged and the caller asked not to wait.
    Busy,
    /// The caller was cancelled while waiting.
    Interrupted,
    /// The write does not form a valid message for this channel.
    InvalidMessage,
    /// The link refused the operation.
    Link(LinkError),
}

impl From<LinkError> for IpcError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NotRunning => IpcError::NotRunning,
            LinkError::Crashed => IpcError::Crashed,
            LinkError::Busy => IpcError::Busy,
            LinkError::Interrupted => IpcError::Interrupted,
            other => IpcError::Link(other),
        }
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcError::NotReady => write!(f, "no link registered for this channel"),
            IpcError::NoTransport => write!(f, "no transport for this format"),
            IpcError::NotRunning => write!(f, "modem not running"),
            IpcError::Crashed => write!(f, "modem crashed"),
            IpcError::BufferTooSmall { needed, capacity } => {
                write!(f, "message of {needed} bytes does not fit {capacity}-byte buffer")
            }
            IpcError::Busy => write!(f, "raw traffic stopped by the modem"),
            IpcError::Interrupted => write!(f, "interrupted"),
            IpcError::InvalidMessage => write!(f, "malformed message for this channel"),
            IpcError::Link(err) => write!(f, "link error: {err}"),
        }
    }
}

impl std::error::Error for IpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IpcError::Link(err) => Some(err),
            _ => None,
        }
    }
}
