//! Endpoint settings.

use std::time::Duration;

use crate::layout::SmrLayout;
use crate::lifecycle::ModemVariant;

/// OneDRAM endpoint configuration.
///
/// ```
/// use std::time::Duration;
/// use onedram::{ModemConfig, ModemVariant};
///
/// let config = ModemConfig {
///     variant: ModemVariant::SteM5730,
///     boot_timeout: Duration::from_secs(40),
///     ..ModemConfig::default()
/// };
/// assert_eq!(config.acquire_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemConfig {
    pub variant: ModemVariant,
    pub layout: SmrLayout,
    /// Bound on waiting for the semaphore or for FIFO space.
    pub acquire_timeout: Duration,
    /// Bound on `start` and `start_ramdump` reaching their target state.
    pub boot_timeout: Duration,
    /// Bound on waiting for the next ramdump chunk.
    pub ramdump_timeout: Duration,
    pub sbl_poll_interval: Duration,
    pub sbl_timeout: Duration,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            variant: ModemVariant::default(),
            layout: SmrLayout::default(),
            acquire_timeout: Duration::from_secs(5),
            boot_timeout: Duration::from_secs(25),
            ramdump_timeout: Duration::from_secs(10),
            sbl_poll_interval: Duration::from_millis(5),
            sbl_timeout: Duration::from_secs(10),
        }
    }
}
