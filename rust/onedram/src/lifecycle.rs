//! Modem lifecycle states and variants.

use sipc::LinkState;

/// Where the modem is in its power/boot cycle.
///
/// The discriminants order the states: everything below `PoweredOn` is
/// offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ModemState {
    #[default]
    Off = 0,
    Crashed = 1,
    PoweredOn = 3,
    BootingNormal = 4,
    BootingRamdump = 5,
    Dumping = 6,
    Running = 7,
}

impl ModemState {
    pub fn is_running(self) -> bool {
        self == ModemState::Running
    }

    /// Off or crashed: nothing will ever hand us the semaphore.
    pub fn is_offline(self) -> bool {
        self < ModemState::PoweredOn
    }

    pub fn link_state(self) -> LinkState {
        match self {
            ModemState::Running => LinkState::Online,
            ModemState::Crashed => LinkState::Crashed,
            _ => LinkState::Offline,
        }
    }
}

/// Supported basebands. They differ in power sequencing and in two
/// mailbox quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModemVariant {
    #[default]
    Xmm6160,
    SteM5730,
}

impl ModemVariant {
    /// Short name as reported to userspace tooling.
    pub fn name(self) -> &'static str {
        match self {
            ModemVariant::Xmm6160 => "xmm",
            ModemVariant::SteM5730 => "ste",
        }
    }

    /// STE firmware wants init-end as soon as the binary is loaded.
    pub fn eager_init_end(self) -> bool {
        self == ModemVariant::SteM5730
    }

    /// STE firmware never hands the semaphore back on its own.
    pub fn requests_sem_on_data(self) -> bool {
        self == ModemVariant::SteM5730
    }
}

/// Turn the modem's error area into a printable line.
///
/// Bytes outside printable ASCII become spaces and trailing spaces go.
pub fn sanitize_error_message(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { ' ' })
        .collect();
    text.trim_end_matches(' ').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_means_below_powered_on() {
        assert!(ModemState::Off.is_offline());
        assert!(ModemState::Crashed.is_offline());
        assert!(!ModemState::PoweredOn.is_offline());
        assert!(!ModemState::Dumping.is_offline());
        assert!(ModemState::Running.is_running());
    }

    #[test]
    fn link_state_follows_lifecycle() {
        assert_eq!(ModemState::Running.link_state(), LinkState::Online);
        assert_eq!(ModemState::Crashed.link_state(), LinkState::Crashed);
        assert_eq!(ModemState::BootingNormal.link_state(), LinkState::Offline);
    }

    #[test]
    fn sanitizing_replaces_control_bytes_and_trims() {
        let mut raw = b"PDP\x01fault\x7f at\tcore 2".to_vec();
        raw.extend_from_slice(b"   \0\0\xff");
        assert_eq!(sanitize_error_message(&raw), "PDP fault  at core 2");
    }

    #[test]
    fn sanitizing_blank_area_is_empty() {
        assert_eq!(sanitize_error_message(&[0u8; 160]), "");
    }
}
