//! Generic `PinAccess` trait for a bank of digital pins (GPIO expander,
//! SoC GPIO block, …).
//!
//! The controller never talks to the expander's bus directly; it reads and
//! writes single logical pins through this trait, so the chip backend can be
//! swapped without touching dispatch logic.

use relayctl_types::{Pin, RelayError};

/// Read/write/configure access to individual digital pins.
///
/// Methods take `&self` because a pin bank is a shared hardware resource:
/// the controller and any sub-drivers built on auxiliary pins all hold the
/// same handle. Implementations provide their own interior mutability.
pub trait PinAccess: Send + Sync {
    /// Read the current level of `pin`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HardwareFault`] if the level cannot be read.
    fn read(&self, pin: Pin) -> Result<bool, RelayError>;

    /// Drive `pin` to `value` (`true` = active).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HardwareFault`] if the write is not applied.
    fn write(&self, pin: Pin, value: bool) -> Result<(), RelayError>;

    /// Switch `pin` between input and output mode. Pins configured as
    /// outputs start cleared (`false`).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HardwareFault`] if the pin cannot be configured.
    fn configure(&self, pin: Pin, as_output: bool) -> Result<(), RelayError>;
}
