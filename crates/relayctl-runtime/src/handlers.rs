//! Pin-level handlers for the three local methods.
//!
//! Handlers never return an error: read failures degrade to an unknown
//! level and write failures surface as `success: false`, so every admitted
//! command produces a [`MethodResult`] for the ledger.

use std::time::Duration;

use relayctl_hal::{Clock, PinAccess};
use relayctl_types::{MethodResult, Pin, SwitchCommand};
use tracing::warn;

/// Read `pin`, logging and swallowing any failure.
fn read_level(bank: &dyn PinAccess, relay: &str, pin: Pin) -> Option<bool> {
    bank.read(pin)
        .inspect_err(|e| warn!(relay, %pin, error = %e, "failed to read pin"))
        .ok()
}

/// Write `pin`, logging any failure. Returns whether the write landed.
fn write_level(bank: &dyn PinAccess, relay: &str, pin: Pin, level: bool) -> bool {
    bank.write(pin, level)
        .inspect_err(|e| warn!(relay, %pin, level, error = %e, "failed to write pin"))
        .is_ok()
}

pub(crate) fn status(bank: &dyn PinAccess, relay: &str, pin: Pin) -> MethodResult {
    MethodResult::Status {
        status: read_level(bank, relay, pin),
    }
}

/// Drive `pin` according to `command`.
///
/// `toggle` reads the current level first; an unreadable pin is treated as
/// *on*, so the toggle drives it off.
pub(crate) fn switch(
    bank: &dyn PinAccess,
    relay: &str,
    pin: Pin,
    command: SwitchCommand,
) -> MethodResult {
    let target = match command {
        SwitchCommand::On => true,
        SwitchCommand::Off => false,
        SwitchCommand::Toggle => match read_level(bank, relay, pin) {
            Some(current) => !current,
            None => false,
        },
    };

    MethodResult::Switch {
        success: write_level(bank, relay, pin, target),
        target,
    }
}

/// Holds a pin active; dropping it without [`release`][Self::release]
/// still drives the pin inactive.
struct ActivePin<'a> {
    bank: &'a dyn PinAccess,
    relay: &'a str,
    pin: Pin,
    released: bool,
}

impl<'a> ActivePin<'a> {
    fn new(bank: &'a dyn PinAccess, relay: &'a str, pin: Pin) -> Self {
        Self {
            bank,
            relay,
            pin,
            released: false,
        }
    }

    fn release(mut self) -> bool {
        self.released = true;
        write_level(self.bank, self.relay, self.pin, false)
    }
}

impl Drop for ActivePin<'_> {
    fn drop(&mut self) {
        if !self.released {
            write_level(self.bank, self.relay, self.pin, false);
        }
    }
}

/// Activate `pin`, block for `duration` seconds on `clock`, deactivate.
///
/// Deactivation is attempted on every exit path, including a failed
/// activation (the wait is then skipped) and an unwinding panic. The
/// result reports `success: true` only if both writes landed.
pub(crate) fn run(
    bank: &dyn PinAccess,
    clock: &dyn Clock,
    relay: &str,
    pin: Pin,
    duration: u32,
) -> MethodResult {
    let guard = ActivePin::new(bank, relay, pin);
    let activated = write_level(bank, relay, pin, true);
    if activated {
        clock.sleep(Duration::from_secs(u64::from(duration)));
    }
    let deactivated = guard.release();

    MethodResult::Run {
        success: activated && deactivated,
        duration,
    }
}
