//! Power sequencing through platform-provided pins and supplies.
//!
//! The endpoint never touches GPIOs or regulators itself. The platform
//! hands it a [`PowerControl`] and the sequences below drive it. Delays are
//! minimum settling times required by the hardware.

use std::io;
use std::time::Duration;

use crate::lifecycle::ModemVariant;
use crate::wait::{Backoff, poll_until};

/// Output lines to the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// Tells the modem the AP is awake.
    PdaActive,
    CpReset,
    /// STE only.
    PhoneOn,
}

/// Input lines from the modem (STE only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    IntResout,
    CpPwrRst,
}

/// Supplies the STE modem needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Supply {
    /// RTC rail, run at 1.8 V.
    CpRtc,
    /// 32 kHz sleep clock.
    Cp32khz,
}

pub const CP_RTC_MICROVOLTS: u32 = 1_800_000;

/// Platform glue for modem power.
pub trait PowerControl: Send + Sync {
    fn set_pin(&self, pin: Pin, high: bool) -> io::Result<()>;

    fn get_input(&self, input: Input) -> io::Result<bool>;

    fn supply_enabled(&self, supply: Supply) -> io::Result<bool>;

    fn enable_supply(&self, supply: Supply) -> io::Result<()>;

    fn disable_supply(&self, supply: Supply) -> io::Result<()>;

    fn set_voltage(&self, supply: Supply, microvolts: u32) -> io::Result<()>;

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// One step of a fixed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStep {
    Pin(Pin, bool),
    Delay(Duration),
    Voltage(Supply, u32),
    /// Enable unless already on.
    Enable(Supply),
}

const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

const XMM6160_RESET: &[PowerStep] = &[
    PowerStep::Pin(Pin::CpReset, false),
    PowerStep::Delay(ms(100)),
    PowerStep::Pin(Pin::CpReset, false),
    PowerStep::Delay(ms(100)),
    PowerStep::Pin(Pin::CpReset, true),
    // Reset timing, not power-on: CP_RST and PHONE_ON are already high.
    PowerStep::Delay(ms(100)),
    PowerStep::Pin(Pin::PdaActive, true),
];

const STE_M5730_RESET: &[PowerStep] = &[
    PowerStep::Pin(Pin::CpReset, false),
    PowerStep::Delay(ms(100)),
    PowerStep::Pin(Pin::PhoneOn, true),
    PowerStep::Delay(ms(18)),
    PowerStep::Voltage(Supply::CpRtc, CP_RTC_MICROVOLTS),
    PowerStep::Enable(Supply::CpRtc),
    PowerStep::Enable(Supply::Cp32khz),
    PowerStep::Pin(Pin::PdaActive, true),
    PowerStep::Delay(ms(150)),
];

/// Interval and bound for waiting on the STE power-reset line to drop.
pub const PWR_RST_POLL: Backoff = Backoff::fixed(Duration::from_secs(1), Duration::from_secs(10));

/// Steps that bring `variant` out of reset.
pub fn reset_sequence(variant: ModemVariant) -> &'static [PowerStep] {
    match variant {
        ModemVariant::Xmm6160 => XMM6160_RESET,
        ModemVariant::SteM5730 => STE_M5730_RESET,
    }
}

pub fn run_sequence(power: &dyn PowerControl, steps: &[PowerStep]) -> io::Result<()> {
    for step in steps {
        trace!(?step, "power step");
        match *step {
            PowerStep::Pin(pin, high) => power.set_pin(pin, high)?,
            PowerStep::Delay(d) => power.delay(d),
            PowerStep::Voltage(supply, uv) => power.set_voltage(supply, uv)?,
            PowerStep::Enable(supply) => {
                if !power.supply_enabled(supply)? {
                    power.enable_supply(supply)?;
                }
            }
        }
    }
    Ok(())
}

/// Bring the modem out of reset.
pub fn power_on(power: &dyn PowerControl, variant: ModemVariant) -> io::Result<()> {
    power.set_pin(Pin::PdaActive, false)?;
    run_sequence(power, reset_sequence(variant))
}

/// Cut power. Failures are logged and the remaining steps still run.
pub fn power_off(power: &dyn PowerControl, variant: ModemVariant) {
    if variant == ModemVariant::SteM5730 {
        log_failure("phone_on low", power.set_pin(Pin::PhoneOn, false));
        log_failure("cp_reset low", power.set_pin(Pin::CpReset, false));

        let resout = power.get_input(Input::IntResout).unwrap_or(true);
        let pwr_rst = power.get_input(Input::CpPwrRst).unwrap_or(true);
        if resout || pwr_rst {
            if pwr_rst {
                warn!("cp_pwr_rst high, waiting for the modem to settle");
                log_failure("cp_reset high", power.set_pin(Pin::CpReset, true));
                let settled = poll_until(
                    PWR_RST_POLL,
                    |d| power.delay(d),
                    || (!power.get_input(Input::CpPwrRst).unwrap_or(false)).then_some(()),
                );
                if let Err(timeout) = settled {
                    error!(%timeout, "cp_pwr_rst never dropped");
                }
            }
            log_failure("cp_reset low", power.set_pin(Pin::CpReset, false));
        }

        if power.supply_enabled(Supply::Cp32khz).unwrap_or(true) {
            log_failure("cp_32khz off", power.disable_supply(Supply::Cp32khz));
        }
    } else {
        log_failure("cp_reset low", power.set_pin(Pin::CpReset, false));
    }
}

fn log_failure(step: &str, result: io::Result<()>) {
    if let Err(err) = result {
        error!(step, %err, "power step failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Pin(Pin, bool),
        Delay(u128),
        Voltage(Supply, u32),
        Enable(Supply),
        Disable(Supply),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        inputs: Mutex<HashMap<Input, Vec<bool>>>,
        enabled: Mutex<Vec<Supply>>,
    }

    impl PowerControl for Recorder {
        fn set_pin(&self, pin: Pin, high: bool) -> io::Result<()> {
            self.events.lock().push(Event::Pin(pin, high));
            Ok(())
        }

        fn get_input(&self, input: Input) -> io::Result<bool> {
            let mut inputs = self.inputs.lock();
            let values = inputs.entry(input).or_default();
            Ok(if values.len() > 1 {
                values.remove(0)
            } else {
                values.first().copied().unwrap_or(false)
            })
        }

        fn supply_enabled(&self, supply: Supply) -> io::Result<bool> {
            Ok(self.enabled.lock().contains(&supply))
        }

        fn enable_supply(&self, supply: Supply) -> io::Result<()> {
            self.enabled.lock().push(supply);
            self.events.lock().push(Event::Enable(supply));
            Ok(())
        }

        fn disable_supply(&self, supply: Supply) -> io::Result<()> {
            self.enabled.lock().retain(|s| *s != supply);
            self.events.lock().push(Event::Disable(supply));
            Ok(())
        }

        fn set_voltage(&self, supply: Supply, microvolts: u32) -> io::Result<()> {
            self.events.lock().push(Event::Voltage(supply, microvolts));
            Ok(())
        }

        fn delay(&self, duration: Duration) {
            self.events.lock().push(Event::Delay(duration.as_millis()));
        }
    }

    #[test]
    fn xmm_reset_pulses_cp_reset_then_raises_pda_active() {
        let rec = Recorder::default();
        power_on(&rec, ModemVariant::Xmm6160).unwrap();
        assert_eq!(
            *rec.events.lock(),
            [
                Event::Pin(Pin::PdaActive, false),
                Event::Pin(Pin::CpReset, false),
                Event::Delay(100),
                Event::Pin(Pin::CpReset, false),
                Event::Delay(100),
                Event::Pin(Pin::CpReset, true),
                Event::Delay(100),
                Event::Pin(Pin::PdaActive, true),
            ]
        );
    }

    #[test]
    fn ste_reset_skips_supplies_already_on() {
        let rec = Recorder::default();
        rec.enabled.lock().push(Supply::Cp32khz);
        power_on(&rec, ModemVariant::SteM5730).unwrap();
        let events = rec.events.lock();
        assert!(events.contains(&Event::Voltage(Supply::CpRtc, CP_RTC_MICROVOLTS)));
        assert!(events.contains(&Event::Enable(Supply::CpRtc)));
        assert!(!events.contains(&Event::Enable(Supply::Cp32khz)));
        assert_eq!(events.last(), Some(&Event::Delay(150)));
    }

    #[test]
    fn ste_off_waits_for_power_reset_line() {
        let rec = Recorder::default();
        rec.enabled.lock().push(Supply::Cp32khz);
        rec.inputs
            .lock()
            .insert(Input::CpPwrRst, vec![true, true, true, false]);
        power_off(&rec, ModemVariant::SteM5730);

        let events = rec.events.lock();
        let waits = events.iter().filter(|e| **e == Event::Delay(1000)).count();
        assert_eq!(waits, 2);
        assert_eq!(events.last(), Some(&Event::Disable(Supply::Cp32khz)));
    }

    #[test]
    fn xmm_off_only_drops_reset() {
        let rec = Recorder::default();
        power_off(&rec, ModemVariant::Xmm6160);
        assert_eq!(*rec.events.lock(), [Event::Pin(Pin::CpReset, false)]);
    }
}
