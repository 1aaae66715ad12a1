//! Wire formats, channel kinds and protocol revisions.

use std::ops::{Index, IndexMut};

/// Traffic class carried over a link.
///
/// The discriminants are the values the modem firmware and the channel
/// table use.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Control messages (call, SMS, network registration).
    Fmt = 0,
    /// Packet data for a single PDP context.
    Raw = 1,
    /// Remote filesystem requests from the modem.
    Rfs = 2,
    /// Packet data multiplexed over several PDP contexts.
    MultiRaw = 3,
    /// Link-layer commands (flow control).
    Cmd = 4,
    /// Memory image readout after a crash.
    Ramdump = 5,
}

impl Format {
    pub const COUNT: usize = 6;

    pub const ALL: [Format; Format::COUNT] = [
        Format::Fmt,
        Format::Raw,
        Format::Rfs,
        Format::MultiRaw,
        Format::Cmd,
        Format::Ramdump,
    ];

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// True if traffic of this format is HDLC framed.
    pub fn is_framed(self) -> bool {
        matches!(
            self,
            Format::Fmt | Format::Raw | Format::Rfs | Format::MultiRaw
        )
    }
}

/// How a logical channel is exposed to consumers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Byte-stream device with read/write/poll.
    Misc = 0,
    /// Network interface.
    Netdev = 1,
    /// Routing endpoint with no consumer surface.
    Dummy = 2,
}

impl ChannelKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ChannelKind::Misc),
            1 => Some(ChannelKind::Netdev),
            2 => Some(ChannelKind::Dummy),
            _ => None,
        }
    }
}

/// IPC protocol revision spoken by the modem firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    #[default]
    V40,
    V41,
    /// Reuses the top two bits of the FMT length field.
    V42,
}

impl ProtocolVersion {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            40 => Some(ProtocolVersion::V40),
            41 => Some(ProtocolVersion::V41),
            42 => Some(ProtocolVersion::V42),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            ProtocolVersion::V40 => 40,
            ProtocolVersion::V41 => 41,
            ProtocolVersion::V42 => 42,
        }
    }
}

/// One `T` per [`Format`], indexed by the format itself.
#[derive(Debug, Clone, Default)]
pub struct PerFormat<T>([T; Format::COUNT]);

impl<T> PerFormat<T> {
    pub fn from_fn(mut f: impl FnMut(Format) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Format::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Format, &T)> {
        Format::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Format> for PerFormat<T> {
    type Output = T;

    fn index(&self, format: Format) -> &T {
        &self.0[format.index()]
    }
}

impl<T> IndexMut<Format> for PerFormat<T> {
    fn index_mut(&mut self, format: Format) -> &mut T {
        &mut self.0[format.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trips_through_u32() {
        for format in Format::ALL {
            assert_eq!(Format::from_u32(format as u32), Some(format));
        }
        assert_eq!(Format::from_u32(6), None);
        assert_eq!(Format::from_u32(u32::MAX), None);
    }

    #[test]
    fn only_data_formats_are_framed() {
        assert!(Format::Fmt.is_framed());
        assert!(Format::MultiRaw.is_framed());
        assert!(!Format::Cmd.is_framed());
        assert!(!Format::Ramdump.is_framed());
    }

    #[test]
    fn per_format_indexes_by_enum() {
        let mut counts = PerFormat::from_fn(|f| f.index() * 10);
        counts[Format::Rfs] += 1;
        assert_eq!(counts[Format::Rfs], 21);
        assert_eq!(counts.iter().count(), Format::COUNT);
    }

    #[test]
    fn unknown_kinds_and_versions_are_rejected() {
        assert_eq!(ChannelKind::from_u32(1), Some(ChannelKind::Netdev));
        assert_eq!(ChannelKind::from_u32(3), None);
        assert_eq!(ProtocolVersion::from_u32(42), Some(ProtocolVersion::V42));
        assert_eq!(ProtocolVersion::from_u32(43), None);
        assert_eq!(ProtocolVersion::default().as_u32(), 40);
    }
}
