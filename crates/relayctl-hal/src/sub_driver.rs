//! Sub-driver seam for relays backed by a different chip.
//!
//! Some relays are not a single expander pin but an independently clocked
//! device (e.g. an MCP3008 ADC bit-banged over four expander pins). The
//! controller wraps such a device in a [`SubDriver`] and forwards commands
//! to it verbatim; validation and rate limiting are the sub-driver's own
//! business.
//!
//! Sub-drivers are constructed at registry build time by a
//! [`SubDriverFactory`], which receives the relay's declaration and the
//! auxiliary pins it needs as an [`AuxPins`] bundle.

use std::collections::BTreeMap;
use std::sync::Arc;

use relayctl_types::{Payload, Pin, RelayDefinition, RelayError, SubDriverSpec};

use crate::pin::PinAccess;

/// An independently implemented actuator/sensor driver composed into the
/// controller by delegation.
pub trait SubDriver: Send {
    /// Execute `method` with `payload` and return the driver's own result.
    ///
    /// # Errors
    ///
    /// Whatever the driver decides; the controller propagates it unchanged.
    fn invoke(&mut self, method: &str, payload: Payload) -> Result<serde_json::Value, RelayError>;

    /// Release the device and leave it inactive. Returns `true` on success.
    fn disconnect(&mut self) -> bool;

    /// Structured self-description for status reports.
    fn describe(&self) -> serde_json::Value;

    /// Whether the driver considers itself operational.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Auxiliary pin handles passed to a sub-driver at construction.
#[derive(Clone)]
pub struct AuxPins {
    bank: Arc<dyn PinAccess>,
    pins: BTreeMap<String, Pin>,
}

impl AuxPins {
    pub fn new(bank: Arc<dyn PinAccess>, pins: BTreeMap<String, Pin>) -> Self {
        Self { bank, pins }
    }

    /// The pin registered under `role` (e.g. `"cs"`).
    pub fn get(&self, role: &str) -> Option<Pin> {
        self.pins.get(role).copied()
    }

    /// Shared handle to the pin bank the auxiliary pins live on.
    pub fn bank(&self) -> &Arc<dyn PinAccess> {
        &self.bank
    }

    pub fn roles(&self) -> impl Iterator<Item = (&str, Pin)> {
        self.pins.iter().map(|(role, pin)| (role.as_str(), *pin))
    }
}

/// Builds [`SubDriver`]s for delegated relays.
pub trait SubDriverFactory {
    /// Construct the sub-driver declared by `spec` for `relay`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the kind is not supported or a
    /// required auxiliary pin is missing.
    fn build(
        &self,
        relay: &RelayDefinition,
        spec: &SubDriverSpec,
        pins: AuxPins,
    ) -> Result<Box<dyn SubDriver>, RelayError>;
}

/// Factory for deployments without any sub-driver backend; every delegated
/// relay is rejected at setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSubDrivers;

impl SubDriverFactory for NoSubDrivers {
    fn build(
        &self,
        relay: &RelayDefinition,
        spec: &SubDriverSpec,
        _pins: AuxPins,
    ) -> Result<Box<dyn SubDriver>, RelayError> {
        Err(RelayError::Config(format!(
            "relay {:?}: no backend available for sub-driver kind {}",
            relay.id, spec.kind
        )))
    }
}
