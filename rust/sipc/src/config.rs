//! Channel table and protocol settings.

use crate::format::{ChannelKind, Format, ProtocolVersion};

/// One logical channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Device or interface name, e.g. `umts_ipc0` or `rmnet0`.
    pub name: String,
    pub format: Format,
    pub kind: ChannelKind,
    /// Channel id. RAW ids are `0x20 | wire id`.
    pub channel: u32,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, format: Format, kind: ChannelKind, channel: u32) -> Self {
        Self {
            name: name.into(),
            format,
            kind,
            channel,
        }
    }
}

/// Multiplexer configuration.
///
/// ```
/// use sipc::{IpcConfig, ProtocolVersion};
///
/// let config = IpcConfig {
///     version: ProtocolVersion::V41,
///     ..IpcConfig::default()
/// };
/// assert!(!config.channels.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcConfig {
    pub version: ProtocolVersion,
    pub channels: Vec<ChannelConfig>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        use ChannelKind::*;
        use Format::*;
        Self {
            version: ProtocolVersion::V40,
            channels: vec![
                ChannelConfig::new("umts_ipc0", Fmt, Misc, 0x01),
                ChannelConfig::new("umts_rfs0", Rfs, Misc, 0x41),
                ChannelConfig::new("umts_csd", Raw, Misc, 0x21),
                ChannelConfig::new("umts_router", Raw, Misc, 0x39),
                ChannelConfig::new("umts_loopback0", Raw, Misc, 0x3f),
                ChannelConfig::new("rmnet0", Raw, Netdev, 0x2a),
                ChannelConfig::new("rmnet1", Raw, Netdev, 0x2b),
                ChannelConfig::new("rmnet2", Raw, Netdev, 0x2c),
                ChannelConfig::new("multipdp", MultiRaw, Dummy, 0x01),
            ],
        }
    }
}

impl IpcConfig {
    /// Drop entries that cannot be served, keeping the rest in order.
    ///
    /// An entry is dropped when its channel id is zero, its name is empty,
    /// or an earlier entry already claims its name or `(format, channel)`.
    pub fn validated(mut self) -> Self {
        let mut kept: Vec<ChannelConfig> = Vec::with_capacity(self.channels.len());
        for entry in self.channels.drain(..) {
            if entry.channel == 0 {
                warn!(name = %entry.name, "skipping channel with id 0");
                continue;
            }
            if entry.name.is_empty() {
                warn!(channel = entry.channel, format = ?entry.format, "skipping unnamed channel");
                continue;
            }
            if kept
                .iter()
                .any(|k| k.format == entry.format && k.channel == entry.channel)
            {
                warn!(
                    name = %entry.name,
                    channel = entry.channel,
                    format = ?entry.format,
                    "skipping duplicate channel"
                );
                continue;
            }
            if kept.iter().any(|k| k.name == entry.name) {
                warn!(name = %entry.name, "skipping duplicate channel name");
                continue;
            }
            kept.push(entry);
        }
        self.channels = kept;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_survives_validation() {
        let config = IpcConfig::default();
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn invalid_entries_are_dropped() {
        let config = IpcConfig {
            channels: vec![
                ChannelConfig::new("zero", Format::Raw, ChannelKind::Misc, 0),
                ChannelConfig::new("", Format::Raw, ChannelKind::Misc, 0x22),
                ChannelConfig::new("a", Format::Raw, ChannelKind::Misc, 0x23),
                ChannelConfig::new("b", Format::Raw, ChannelKind::Netdev, 0x23),
                ChannelConfig::new("a", Format::Fmt, ChannelKind::Misc, 0x01),
                ChannelConfig::new("c", Format::Fmt, ChannelKind::Misc, 0x01),
            ],
            ..IpcConfig::default()
        }
        .validated();

        let names: Vec<&str> = config.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }
}
