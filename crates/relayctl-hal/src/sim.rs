//! In-process simulation drivers for tests and bench runs without hardware.
//!
//! - [`SimPinBank`] – a [`PinAccess`] implementation that keeps pin levels
//!   in memory, records every write, and can be told to fail reads or
//!   writes on specific pins.
//! - [`SimSubDriver`] / [`SimSubDriverFactory`] – a [`SubDriver`] that
//!   records every forwarded call and answers with a fixed reading. A
//!   [`SimSubDriverProbe`] lets a test inspect the driver after the
//!   registry has taken ownership of it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relayctl_hal::pin::PinAccess;
//! use relayctl_hal::sim::SimPinBank;
//! use relayctl_types::Pin;
//!
//! let bank = Arc::new(SimPinBank::new());
//! bank.configure(Pin(3), true).unwrap();
//! bank.write(Pin(3), true).unwrap();
//!
//! assert!(bank.level(Pin(3)));
//! assert_eq!(bank.writes(Pin(3)), vec![true]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relayctl_types::{Payload, Pin, RelayDefinition, RelayError, SubDriverKind, SubDriverSpec};
use serde_json::json;

use crate::pin::PinAccess;
use crate::sub_driver::{AuxPins, SubDriver, SubDriverFactory};

// ────────────────────────────────────────────────────────────────────────────
// Simulated pin bank
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
struct SimPin {
    level: bool,
    output: bool,
    writes: Vec<bool>,
}

#[derive(Debug, Default)]
struct BankState {
    pins: BTreeMap<Pin, SimPin>,
    failing_reads: BTreeSet<Pin>,
    failing_writes: BTreeSet<Pin>,
}

/// Simulated GPIO expander. Unknown pins read as `false`.
#[derive(Debug, Default)]
pub struct SimPinBank {
    state: Mutex<BankState>,
}

impl SimPinBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BankState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force the level of `pin` as if driven from outside; not recorded as
    /// a write.
    pub fn set_level(&self, pin: Pin, level: bool) {
        self.lock().pins.entry(pin).or_default().level = level;
    }

    pub fn level(&self, pin: Pin) -> bool {
        self.lock().pins.get(&pin).is_some_and(|p| p.level)
    }

    pub fn is_output(&self, pin: Pin) -> bool {
        self.lock().pins.get(&pin).is_some_and(|p| p.output)
    }

    /// Every value successfully written to `pin`, oldest first.
    pub fn writes(&self, pin: Pin) -> Vec<bool> {
        self.lock()
            .pins
            .get(&pin)
            .map(|p| p.writes.clone())
            .unwrap_or_default()
    }

    /// Make every subsequent read of `pin` fail.
    pub fn fail_reads(&self, pin: Pin) {
        self.lock().failing_reads.insert(pin);
    }

    /// Make every subsequent write to `pin` fail.
    pub fn fail_writes(&self, pin: Pin) {
        self.lock().failing_writes.insert(pin);
    }

    /// Clear any injected faults on `pin`.
    pub fn heal(&self, pin: Pin) {
        let mut state = self.lock();
        state.failing_reads.remove(&pin);
        state.failing_writes.remove(&pin);
    }
}

impl PinAccess for SimPinBank {
    fn read(&self, pin: Pin) -> Result<bool, RelayError> {
        let state = self.lock();
        if state.failing_reads.contains(&pin) {
            return Err(RelayError::hardware(pin, "simulated read failure"));
        }
        Ok(state.pins.get(&pin).is_some_and(|p| p.level))
    }

    fn write(&self, pin: Pin, value: bool) -> Result<(), RelayError> {
        let mut state = self.lock();
        if state.failing_writes.contains(&pin) {
            return Err(RelayError::hardware(pin, "simulated write failure"));
        }
        let entry = state.pins.entry(pin).or_default();
        entry.level = value;
        entry.writes.push(value);
        Ok(())
    }

    fn configure(&self, pin: Pin, as_output: bool) -> Result<(), RelayError> {
        let mut state = self.lock();
        if state.failing_writes.contains(&pin) {
            return Err(RelayError::hardware(pin, "simulated configure failure"));
        }
        let entry = state.pins.entry(pin).or_default();
        entry.output = as_output;
        if as_output {
            entry.level = false;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated sub-driver
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SubDriverState {
    calls: Vec<(String, Payload)>,
    connected: bool,
    disconnects: usize,
}

/// Read-only view into a [`SimSubDriver`] that outlives the box the
/// registry holds.
#[derive(Debug, Clone)]
pub struct SimSubDriverProbe(Arc<Mutex<SubDriverState>>);

impl SimSubDriverProbe {
    fn lock(&self) -> MutexGuard<'_, SubDriverState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every `(method, payload)` pair the driver received, oldest first.
    pub fn calls(&self) -> Vec<(String, Payload)> {
        self.lock().calls.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnects
    }
}

/// Simulated sub-driver answering `status` and `read` with a fixed reading.
pub struct SimSubDriver {
    relay_id: String,
    kind: SubDriverKind,
    reading: u64,
    fail_disconnect: bool,
    aux: Option<AuxPins>,
    state: Arc<Mutex<SubDriverState>>,
}

impl SimSubDriver {
    pub fn new(relay_id: impl Into<String>, kind: SubDriverKind) -> Self {
        Self {
            relay_id: relay_id.into(),
            kind,
            reading: 0,
            fail_disconnect: false,
            aux: None,
            state: Arc::new(Mutex::new(SubDriverState {
                calls: Vec::new(),
                connected: true,
                disconnects: 0,
            })),
        }
    }

    pub fn with_reading(mut self, reading: u64) -> Self {
        self.reading = reading;
        self
    }

    /// Make `disconnect` report failure.
    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    /// Wire the driver to its auxiliary pins. A `cs` role is driven high
    /// (chip deselected) on disconnect.
    pub fn with_aux_pins(mut self, aux: AuxPins) -> Self {
        self.aux = Some(aux);
        self
    }

    pub fn probe(&self) -> SimSubDriverProbe {
        SimSubDriverProbe(Arc::clone(&self.state))
    }

    fn release_chip_select(&self) -> bool {
        let Some(aux) = &self.aux else {
            return true;
        };
        match aux.get("cs") {
            Some(cs) => aux.bank().write(cs, true).is_ok(),
            None => true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SubDriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SubDriver for SimSubDriver {
    fn invoke(&mut self, method: &str, payload: Payload) -> Result<serde_json::Value, RelayError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(RelayError::hardware(&self.relay_id, "sub-driver disconnected"));
        }
        state.calls.push((method.to_string(), payload));
        match method {
            "status" | "read" => Ok(json!({ "value": self.reading })),
            other => Err(RelayError::NotImplemented(format!("{} {other}", self.kind))),
        }
    }

    fn disconnect(&mut self) -> bool {
        let ok = self.release_chip_select() && !self.fail_disconnect;
        let mut state = self.lock();
        state.disconnects += 1;
        if ok {
            state.connected = false;
        }
        ok
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "name": self.kind.to_string().to_uppercase(),
            "relay": self.relay_id,
            "connected": self.lock().connected,
            "pins": self
                .aux
                .iter()
                .flat_map(|aux| aux.roles())
                .map(|(role, pin)| (role.to_string(), pin.0))
                .collect::<BTreeMap<_, _>>(),
        })
    }

    fn is_healthy(&self) -> bool {
        self.lock().connected
    }
}

/// Factory producing a [`SimSubDriver`] for every delegated relay.
///
/// The reading is taken from the relay's `settings.reading` when present.
#[derive(Debug, Default)]
pub struct SimSubDriverFactory {
    failing_disconnect: BTreeSet<String>,
    probes: Mutex<BTreeMap<String, SimSubDriverProbe>>,
}

impl SimSubDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drivers built for `relay_id` will fail to disconnect.
    pub fn with_failing_disconnect(mut self, relay_id: impl Into<String>) -> Self {
        self.failing_disconnect.insert(relay_id.into());
        self
    }

    /// Relay ids a driver has been built for.
    pub fn built(&self) -> Vec<String> {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn probe(&self, relay_id: &str) -> Option<SimSubDriverProbe> {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(relay_id)
            .cloned()
    }
}

impl SubDriverFactory for SimSubDriverFactory {
    fn build(
        &self,
        relay: &RelayDefinition,
        spec: &SubDriverSpec,
        pins: AuxPins,
    ) -> Result<Box<dyn SubDriver>, RelayError> {
        let reading = match spec.settings.get("reading") {
            None => 0,
            Some(value) => value.as_u64().ok_or_else(|| {
                RelayError::Config(format!(
                    "relay {:?}: settings.reading must be a non-negative integer",
                    relay.id
                ))
            })?,
        };

        let mut driver = SimSubDriver::new(relay.id.clone(), spec.kind)
            .with_reading(reading)
            .with_aux_pins(pins);
        if self.failing_disconnect.contains(&relay.id) {
            driver = driver.failing_disconnect();
        }

        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(relay.id.clone(), driver.probe());
        Ok(Box::new(driver))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_bank_records_writes() {
        let bank = SimPinBank::new();
        bank.write(Pin(1), true).unwrap();
        bank.write(Pin(1), false).unwrap();
        assert_eq!(bank.writes(Pin(1)), vec![true, false]);
        assert!(!bank.level(Pin(1)));
    }

    #[test]
    fn configure_as_output_clears_level() {
        let bank = SimPinBank::new();
        bank.set_level(Pin(2), true);
        bank.configure(Pin(2), true).unwrap();
        assert!(!bank.level(Pin(2)));
        assert!(bank.is_output(Pin(2)));
        assert!(bank.writes(Pin(2)).is_empty());
    }

    #[test]
    fn injected_faults_fail_and_heal() {
        let bank = SimPinBank::new();
        bank.fail_reads(Pin(4));
        bank.fail_writes(Pin(4));
        assert!(matches!(bank.read(Pin(4)), Err(RelayError::HardwareFault { .. })));
        assert!(matches!(bank.write(Pin(4), true), Err(RelayError::HardwareFault { .. })));
        assert!(bank.writes(Pin(4)).is_empty());

        bank.heal(Pin(4));
        bank.write(Pin(4), true).unwrap();
        assert!(bank.read(Pin(4)).unwrap());
    }

    #[test]
    fn sim_sub_driver_records_calls_and_answers_status() {
        let mut driver = SimSubDriver::new("adc", SubDriverKind::Mcp3008).with_reading(512);
        let probe = driver.probe();

        let result = driver.invoke("status", Payload::new()).unwrap();
        assert_eq!(result, json!({ "value": 512 }));
        assert_eq!(probe.calls().len(), 1);
        assert_eq!(probe.calls()[0].0, "status");
    }

    #[test]
    fn sim_sub_driver_rejects_unsupported_methods() {
        let mut driver = SimSubDriver::new("adc", SubDriverKind::Mcp3008);
        let result = driver.invoke("run", Payload::new());
        assert!(matches!(result, Err(RelayError::NotImplemented(_))));
    }

    #[test]
    fn disconnected_sub_driver_refuses_calls() {
        let mut driver = SimSubDriver::new("adc", SubDriverKind::Mcp3008);
        let probe = driver.probe();
        assert!(driver.disconnect());
        assert!(!probe.is_connected());
        assert!(!driver.is_healthy());
        assert!(driver.invoke("status", Payload::new()).is_err());
    }

    #[test]
    fn failing_disconnect_reports_false_and_stays_connected() {
        let mut driver = SimSubDriver::new("adc", SubDriverKind::Mcp3008).failing_disconnect();
        let probe = driver.probe();
        assert!(!driver.disconnect());
        assert!(probe.is_connected());
        assert_eq!(probe.disconnect_count(), 1);
    }

    #[test]
    fn factory_reads_reading_from_settings() {
        let bank: Arc<dyn PinAccess> = Arc::new(SimPinBank::new());
        let mut spec = SubDriverSpec::new(SubDriverKind::Mcp3008);
        spec.settings.insert("reading".into(), json!(300));
        let def = RelayDefinition::delegated("adc", "Moisture", spec.clone());

        let factory = SimSubDriverFactory::new();
        let pins = AuxPins::new(bank, BTreeMap::from([("cs".to_string(), Pin(8))]));
        let mut driver = factory.build(&def, &spec, pins).unwrap();

        assert_eq!(driver.invoke("read", Payload::new()).unwrap(), json!({ "value": 300 }));
        assert_eq!(driver.describe()["pins"], json!({ "cs": 8 }));
        assert!(factory.probe("adc").is_some());
    }

    #[test]
    fn disconnect_deselects_chip() {
        let bank = Arc::new(SimPinBank::new());
        let pins = AuxPins::new(bank.clone(), BTreeMap::from([("cs".to_string(), Pin(8))]));
        let mut driver = SimSubDriver::new("adc", SubDriverKind::Mcp3008).with_aux_pins(pins);

        assert!(driver.disconnect());
        assert_eq!(bank.writes(Pin(8)), vec![true]);
    }

    #[test]
    fn disconnect_fails_when_chip_select_cannot_be_driven() {
        let bank = Arc::new(SimPinBank::new());
        bank.fail_writes(Pin(8));
        let pins = AuxPins::new(bank.clone(), BTreeMap::from([("cs".to_string(), Pin(8))]));
        let mut driver = SimSubDriver::new("adc", SubDriverKind::Mcp3008).with_aux_pins(pins);
        let probe = driver.probe();

        assert!(!driver.disconnect());
        assert!(probe.is_connected());
    }

    #[test]
    fn factory_rejects_non_integer_reading() {
        let bank: Arc<dyn PinAccess> = Arc::new(SimPinBank::new());
        let mut spec = SubDriverSpec::new(SubDriverKind::Mcp3008);
        spec.settings.insert("reading".into(), json!("high"));
        let def = RelayDefinition::delegated("adc", "Moisture", spec.clone());

        let result = SimSubDriverFactory::new().build(&def, &spec, AuxPins::new(bank, BTreeMap::new()));
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
