//! Bounded polling for conditions nobody signals.
//!
//! Bootloader markers and power-good lines are only observable by looking
//! at them again later. Every such loop goes through [`poll_until`] so none
//! can spin forever.

use std::fmt;
use std::time::Duration;

/// The condition did not hold within the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    pub waited: Duration,
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition not met after {:?}", self.waited)
    }
}

impl std::error::Error for Timeout {}

/// How often to look, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// First delay between checks.
    pub interval: Duration,
    /// Delays double up to this bound.
    pub max_interval: Duration,
    /// Total time slept before giving up.
    pub budget: Duration,
}

impl Backoff {
    /// A fixed `interval` for at most `budget`.
    pub const fn fixed(interval: Duration, budget: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            budget,
        }
    }
}

/// Run `check` until it yields a value, sleeping between attempts with `sleep`.
///
/// Time is accounted by what was asked of `sleep`, so a fake sleeper makes
/// the loop deterministic. `check` always runs once more after the last
/// sleep.
pub fn poll_until<T>(
    backoff: Backoff,
    mut sleep: impl FnMut(Duration),
    mut check: impl FnMut() -> Option<T>,
) -> Result<T, Timeout> {
    let mut waited = Duration::ZERO;
    let mut interval = backoff.interval;
    loop {
        if let Some(value) = check() {
            return Ok(value);
        }
        if waited >= backoff.budget {
            return Err(Timeout { waited });
        }
        let step = interval.min(backoff.budget - waited);
        trace!(?step, ?waited, "condition not met, sleeping");
        sleep(step);
        waited += step;
        interval = (interval * 2).min(backoff.max_interval);
    }
}
