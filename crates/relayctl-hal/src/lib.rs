//! `relayctl-hal` – Hardware Abstraction Layer
//!
//! Everything the controller needs from the outside world, expressed as
//! traits so the dispatch logic never depends on a particular chip.
//!
//! # Modules
//!
//! - [`pin`] – [`PinAccess`]: read/write/configure a single logical pin on
//!   the GPIO expander.
//! - [`sub_driver`] – [`SubDriver`] and [`SubDriverFactory`]: relays backed
//!   by an independently clocked chip (e.g. an ADC) that receive commands
//!   by delegation.
//! - [`clock`] – [`Clock`]: injected wall clock and blocking sleep, with a
//!   [`ManualClock`] for deterministic tests.
//! - [`registry`] – [`RelayRegistry`]: the immutable relay table built from
//!   relay definitions at startup.
//! - [`sim`] – in-process simulation drivers for CI and bench runs.

pub mod clock;
pub mod pin;
pub mod registry;
pub mod sim;
pub mod sub_driver;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pin::PinAccess;
pub use registry::{LocalRelay, Relay, RelayKind, RelayRegistry};
pub use sim::{SimPinBank, SimSubDriver, SimSubDriverFactory, SimSubDriverProbe};
pub use sub_driver::{AuxPins, NoSubDrivers, SubDriver, SubDriverFactory};
