//! Per-format frame headers.
//!
//! Every framed message is `START | header | payload | END`. Headers are
//! little-endian with no padding, and the length field counts the header
//! plus the payload but not the delimiters:
//!
//! ```text
//! FMT  : len:u16  control:u8              (3 bytes)
//! RAW  : len:u32  channel:u8  control:u8  (6 bytes)
//! RFS  : len:u32  cmd:u8      id:u8       (6 bytes)
//! ```

use crate::format::{Format, ProtocolVersion};

pub const START_BYTE: u8 = 0x7f;
pub const END_BYTE: u8 = 0x7e;

pub const FMT_HEADER_LEN: usize = 3;
pub const RAW_HEADER_LEN: usize = 6;
pub const RFS_HEADER_LEN: usize = 6;
pub const MAX_HEADER_LEN: usize = 6;

/// FMT control bit: more frames of this group follow.
pub const FMT_MORE_FRAMES: u8 = 0x80;
/// FMT control bits naming the fragmentation group.
pub const FMT_GROUP_MASK: u8 = 0x7f;
/// RAW channel ids are five bits wide on the wire.
pub const RAW_CHANNEL_MASK: u8 = 0x1f;
/// Revision 42 keeps flags in the top two bits of the FMT length.
pub const V42_FMT_LEN_MASK: u16 = 0x3fff;

/// A decoded (or to-be-encoded) frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Fmt { len: u16, control: u8 },
    Raw { len: u32, channel: u8, control: u8 },
    Rfs { len: u32, cmd: u8, id: u8 },
}

impl Header {
    /// Header size on the wire for `format`, if it is framed.
    pub fn size_of(format: Format) -> Option<usize> {
        match format {
            Format::Fmt => Some(FMT_HEADER_LEN),
            Format::Raw | Format::MultiRaw => Some(RAW_HEADER_LEN),
            Format::Rfs => Some(RFS_HEADER_LEN),
            Format::Cmd | Format::Ramdump => None,
        }
    }

    /// FMT header for a payload of `payload_len` bytes, or `None` when the
    /// frame would overflow the 16-bit length field.
    pub fn try_fmt(payload_len: usize, control: u8) -> Option<Self> {
        let len = u16::try_from(payload_len.checked_add(FMT_HEADER_LEN)?).ok()?;
        Some(Header::Fmt { len, control })
    }

    /// FMT header for a payload of `payload_len` bytes.
    ///
    /// The frame length must fit in a `u16`; use [`try_fmt`](Self::try_fmt)
    /// when that is not already known.
    pub fn fmt(payload_len: usize, control: u8) -> Self {
        debug_assert!(
            payload_len + FMT_HEADER_LEN <= u16::MAX as usize,
            "fmt payload of {payload_len} bytes overflows the length field"
        );
        Header::Fmt {
            len: (payload_len + FMT_HEADER_LEN) as u16,
            control,
        }
    }

    /// RAW header for a payload of `payload_len` bytes on `channel`.
    pub fn raw(payload_len: usize, channel: u32) -> Self {
        Header::Raw {
            len: (payload_len + RAW_HEADER_LEN) as u32,
            channel: channel as u8 & RAW_CHANNEL_MASK,
            control: 0,
        }
    }

    /// RFS header for a payload of `payload_len` bytes.
    pub fn rfs(payload_len: usize, cmd: u8, id: u8) -> Self {
        Header::Rfs {
            len: (payload_len + RFS_HEADER_LEN) as u32,
            cmd,
            id,
        }
    }

    /// Bytes this header occupies on the wire.
    pub fn size(&self) -> usize {
        match self {
            Header::Fmt { .. } => FMT_HEADER_LEN,
            Header::Raw { .. } => RAW_HEADER_LEN,
            Header::Rfs { .. } => RFS_HEADER_LEN,
        }
    }

    /// Declared length: header plus payload.
    pub fn declared_len(&self) -> usize {
        match *self {
            Header::Fmt { len, .. } => len as usize,
            Header::Raw { len, .. } | Header::Rfs { len, .. } => len as usize,
        }
    }

    /// Payload length implied by the header, if the declared length is sane.
    pub fn payload_len(&self) -> Option<usize> {
        self.declared_len().checked_sub(self.size())
    }

    /// Serialize into the first `size()` bytes of the returned array.
    pub fn to_bytes(&self) -> ([u8; MAX_HEADER_LEN], usize) {
        let mut out = [0u8; MAX_HEADER_LEN];
        match *self {
            Header::Fmt { len, control } => {
                out[..2].copy_from_slice(&len.to_le_bytes());
                out[2] = control;
            }
            Header::Raw {
                len,
                channel,
                control,
            } => {
                out[..4].copy_from_slice(&len.to_le_bytes());
                out[4] = channel;
                out[5] = control;
            }
            Header::Rfs { len, cmd, id } => {
                out[..4].copy_from_slice(&len.to_le_bytes());
                out[4] = cmd;
                out[5] = id;
            }
        }
        (out, self.size())
    }

    /// Parse a complete header of `format` from `bytes`.
    ///
    /// Returns `None` if the format is not framed or `bytes` is short.
    pub fn parse(format: Format, bytes: &[u8], version: ProtocolVersion) -> Option<Self> {
        let size = Header::size_of(format)?;
        let bytes = bytes.get(..size)?;
        let header = match format {
            Format::Fmt => {
                let mut len = u16::from_le_bytes([bytes[0], bytes[1]]);
                if version == ProtocolVersion::V42 {
                    len &= V42_FMT_LEN_MASK;
                }
                Header::Fmt {
                    len,
                    control: bytes[2],
                }
            }
            Format::Raw | Format::MultiRaw => Header::Raw {
                len: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                channel: bytes[4],
                control: bytes[5],
            },
            Format::Rfs => Header::Rfs {
                len: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                cmd: bytes[4],
                id: bytes[5],
            },
            Format::Cmd | Format::Ramdump => return None,
        };
        Some(header)
    }

    /// True for FMT frames announcing that more of their group follows.
    pub fn more_frames(&self) -> bool {
        matches!(self, Header::Fmt { control, .. } if control & FMT_MORE_FRAMES != 0)
    }

    /// FMT fragmentation group id.
    pub fn group(&self) -> Option<u8> {
        match self {
            Header::Fmt { control, .. } => Some(control & FMT_GROUP_MASK),
            _ => None,
        }
    }

    /// RAW channel id (low five bits).
    pub fn raw_channel(&self) -> Option<u8> {
        match self {
            Header::Raw { channel, .. } => Some(channel & RAW_CHANNEL_MASK),
            _ => None,
        }
    }
}
