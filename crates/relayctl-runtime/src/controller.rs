//! [`RelayController`] – the dispatch engine.
//!
//! One controller owns one [`RelayRegistry`], one [`CommandGate`] and one
//! [`Clock`]. Every caller-facing operation goes through it:
//!
//! ```text
//! invoke(relay, method, payload)
//!   │  strip routing fields
//!   ├─ delegated relay ──► SubDriver::invoke ──► { relay: <verbatim> }
//!   └─ local relay
//!        CommandGate::admit  (validate, rate-check, stamp)
//!        handler             (status | switch | run)
//!        CommandGate::record ──► { relay: <result> }
//! ```
//!
//! The controller is a single actor: `invoke` and `shutdown` take
//! `&mut self`, so concurrent callers must serialise access themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use relayctl_hal::{
    Clock, LocalRelay, PinAccess, RelayKind, RelayRegistry, SubDriverFactory,
};
use relayctl_kernel::{CallLedger, Command, CommandGate};
use relayctl_types::{InvokeResponse, Method, MethodResult, Payload, RelayDefinition, RelayError};
use tracing::{debug, info, instrument, warn};

use crate::handlers;
use crate::report::{ControllerReport, RelayDetail, RelaySummary};

/// Payload keys used only to address a relay; never passed to handlers or
/// sub-drivers.
pub const ROUTING_FIELDS: [&str; 2] = ["relay", "id"];

pub struct RelayController {
    name: String,
    registry: RelayRegistry,
    gate: CommandGate,
    clock: Arc<dyn Clock>,
    shut_down: bool,
}

impl RelayController {
    pub fn new(name: impl Into<String>, registry: RelayRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            registry,
            gate: CommandGate::default(),
            clock,
            shut_down: false,
        }
    }

    /// Build the registry from `definitions` and wrap it in a controller.
    ///
    /// # Errors
    ///
    /// Whatever [`RelayRegistry::build`] rejects.
    pub fn from_definitions(
        name: impl Into<String>,
        definitions: &[RelayDefinition],
        bank: Arc<dyn PinAccess>,
        factory: &dyn SubDriverFactory,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RelayError> {
        let registry = RelayRegistry::build(definitions, bank, factory)?;
        Ok(Self::new(name, registry, clock))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &RelayRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &CallLedger {
        self.gate.ledger()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Execute `method` on `relay_id`.
    ///
    /// Delegated relays forward straight to their sub-driver and bypass
    /// validation and the ledger. Local relays are admitted by the
    /// [`CommandGate`] first, so a rejected call never touches a pin.
    ///
    /// # Errors
    ///
    /// - [`RelayError::RelayNotFound`] – `relay_id` is empty or unknown.
    /// - Any admission error from [`CommandGate::admit`].
    /// - Any error returned by a sub-driver, unchanged.
    #[instrument(skip(self, payload), fields(controller = %self.name))]
    pub fn invoke(
        &mut self,
        relay_id: &str,
        method: &str,
        mut payload: Payload,
    ) -> Result<InvokeResponse, RelayError> {
        for field in ROUTING_FIELDS {
            payload.remove(field);
        }

        let relay = self
            .registry
            .get_mut(relay_id)
            .filter(|_| !relay_id.is_empty())
            .ok_or_else(|| RelayError::RelayNotFound(relay_id.to_string()))?;

        if let RelayKind::Delegated(driver) = relay.kind_mut() {
            debug!(relay = relay_id, method, "forwarding to sub-driver");
            let result = driver.invoke(method, payload)?;
            return Ok(InvokeResponse::delegated(relay_id, result));
        }

        let now = self.clock.now();
        let command = self
            .gate
            .admit(&self.registry, relay_id, method, &payload, now)?;

        let local = self
            .registry
            .get(relay_id)
            .and_then(|relay| relay.as_local())
            .ok_or_else(|| RelayError::NotImplemented(method.to_string()))?;
        let result = self.execute(relay_id, local, command);

        info!(relay = relay_id, method, ?result, "command executed");
        self.gate.record(relay_id, command, result.clone());
        Ok(InvokeResponse::local(relay_id, result))
    }

    fn execute(&self, relay_id: &str, local: &LocalRelay, command: Command) -> MethodResult {
        let bank = self.registry.bank().as_ref();
        let pin = local.pin();
        match command {
            Command::Status => handlers::status(bank, relay_id, pin),
            Command::Switch(switch) => handlers::switch(bank, relay_id, pin, switch),
            Command::Run { duration } => {
                handlers::run(bank, self.clock.as_ref(), relay_id, pin, duration)
            }
        }
    }

    /// Deactivate every relay: local pins are driven low, sub-drivers are
    /// disconnected.
    ///
    /// Every relay is attempted even after a failure. Returns `true` only
    /// if all of them succeeded.
    #[instrument(skip(self), fields(controller = %self.name))]
    pub fn shutdown(&mut self) -> bool {
        let bank = Arc::clone(self.registry.bank());
        let mut all_ok = true;

        for relay in self.registry.iter_mut() {
            let id = relay.id().to_string();
            let ok = match relay.kind_mut() {
                RelayKind::Local(local) => bank
                    .write(local.pin(), false)
                    .inspect_err(|e| warn!(relay = %id, error = %e, "failed to deactivate pin"))
                    .is_ok(),
                RelayKind::Delegated(driver) => {
                    let ok = driver.disconnect();
                    if !ok {
                        warn!(relay = %id, "sub-driver failed to disconnect");
                    }
                    ok
                }
            };
            all_ok &= ok;
        }

        self.shut_down = true;
        info!(success = all_ok, "controller shut down");
        all_ok
    }

    /// `true` while the controller has not been shut down and every
    /// sub-driver reports itself healthy.
    pub fn is_healthy(&self) -> bool {
        !self.shut_down
            && self.registry.iter().all(|relay| match relay.kind() {
                RelayKind::Local(_) => true,
                RelayKind::Delegated(driver) => driver.is_healthy(),
            })
    }

    /// Build a monitoring snapshot: method schemas and ledger entries for
    /// local relays, the sub-driver's own description for delegated ones.
    pub fn describe(&self) -> ControllerReport {
        let relays = self
            .registry
            .iter()
            .map(|relay| {
                let detail = match relay.kind() {
                    RelayKind::Local(local) => RelayDetail::Local {
                        methods: local.methods().clone(),
                        last_method_calls: self
                            .gate
                            .ledger()
                            .entries_for(relay.id())
                            .cloned()
                            .unwrap_or_default(),
                    },
                    RelayKind::Delegated(driver) => RelayDetail::Delegated {
                        driver: driver.describe(),
                    },
                };
                let summary = RelaySummary {
                    id: relay.id().to_string(),
                    name: relay.name().to_string(),
                    detail,
                };
                (relay.id().to_string(), summary)
            })
            .collect::<BTreeMap<_, _>>();

        ControllerReport {
            name: self.name.clone(),
            supported_methods: Method::ALL.to_vec(),
            healthy: self.is_healthy(),
            relays,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use relayctl_hal::{ManualClock, NoSubDrivers, SimPinBank, SimSubDriverFactory};
    use relayctl_types::{
        AuxPin, FieldConstraint, MethodOverride, Pin, SelectOption, SubDriverKind, SubDriverSpec,
        Timestamp,
    };
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn definitions() -> Vec<RelayDefinition> {
        vec![
            RelayDefinition::local("R1", "Lamp", 1)
                .as_output()
                .with_method(MethodOverride::new(Method::Status))
                .with_method(MethodOverride::new(Method::Switch)),
            RelayDefinition::local("R2", "Pump", 2)
                .as_output()
                .with_method(MethodOverride::new(Method::Run)),
            RelayDefinition::delegated(
                "R3",
                "Soil",
                SubDriverSpec::new(SubDriverKind::Mcp3008)
                    .with_pin("cs", AuxPin::Configured { pin: 10, output: true })
                    .with_pin("miso", AuxPin::Index(11)),
            ),
        ]
    }

    struct Fixture {
        bank: Arc<SimPinBank>,
        clock: ManualClock,
        factory: SimSubDriverFactory,
        controller: RelayController,
    }

    fn fixture_with(factory: SimSubDriverFactory) -> Fixture {
        let bank = Arc::new(SimPinBank::new());
        let clock = ManualClock::default();
        let controller = RelayController::from_definitions(
            "mcp23017",
            &definitions(),
            bank.clone(),
            &factory,
            Arc::new(clock.clone()),
        )
        .unwrap();
        Fixture { bank, clock, factory, controller }
    }

    fn fixture() -> Fixture {
        fixture_with(SimSubDriverFactory::new())
    }

    #[test]
    fn switch_is_rate_limited_until_min_pause_elapses() {
        let mut f = fixture();

        let resp = f.controller.invoke("R1", "switch", payload(json!({ "status": "on" }))).unwrap();
        assert_eq!(resp.to_value(), json!({ "R1": { "success": true, "target": true } }));
        assert!(f.bank.level(Pin(1)));

        let again = f.controller.invoke("R1", "switch", payload(json!({ "status": "off" })));
        assert!(matches!(again, Err(RelayError::RateLimited { .. })));
        assert!(f.bank.level(Pin(1)));

        f.clock.advance(Duration::from_secs(1));
        let resp = f.controller.invoke("R1", "switch", payload(json!({ "status": "off" }))).unwrap();
        assert_eq!(resp.to_value(), json!({ "R1": { "success": true, "target": false } }));
        assert!(!f.bank.level(Pin(1)));
    }

    #[test]
    fn run_below_minimum_is_rejected_without_touching_pin() {
        let mut f = fixture();
        let result = f.controller.invoke("R2", "run", payload(json!({ "duration": 0 })));
        assert!(matches!(result, Err(RelayError::InvalidPayload { .. })));
        assert!(f.bank.writes(Pin(2)).is_empty());
        assert!(f.controller.ledger().entry("R2", Method::Run).is_none());
    }

    /// Records the pin level at the moment the handler starts waiting.
    struct ObservingClock {
        inner: ManualClock,
        bank: Arc<SimPinBank>,
        seen: Mutex<Vec<(bool, Duration)>>,
    }

    impl Clock for ObservingClock {
        fn now(&self) -> Timestamp {
            self.inner.now()
        }

        fn sleep(&self, duration: Duration) {
            self.seen.lock().unwrap().push((self.bank.level(Pin(2)), duration));
            self.inner.sleep(duration);
        }
    }

    #[test]
    fn run_holds_pin_active_for_duration_then_releases() {
        let bank = Arc::new(SimPinBank::new());
        let clock = Arc::new(ObservingClock {
            inner: ManualClock::default(),
            bank: bank.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut controller = RelayController::from_definitions(
            "mcp23017",
            &definitions(),
            bank.clone(),
            &SimSubDriverFactory::new(),
            clock.clone(),
        )
        .unwrap();

        let resp = controller.invoke("R2", "run", payload(json!({ "duration": 5 }))).unwrap();
        assert_eq!(resp.to_value(), json!({ "R2": { "success": true, "duration": 5 } }));
        assert_eq!(*clock.seen.lock().unwrap(), vec![(true, Duration::from_secs(5))]);
        assert!(!bank.level(Pin(2)));
    }

    #[test]
    fn run_with_failing_pin_reports_failure_and_attempts_release() {
        let mut f = fixture();
        f.bank.fail_writes(Pin(2));
        let resp = f.controller.invoke("R2", "run", payload(json!({ "duration": 5 }))).unwrap();
        assert_eq!(
            resp.local_result(),
            Some(&MethodResult::Run { success: false, duration: 5 })
        );
        assert!(!f.bank.level(Pin(2)));
    }

    #[test]
    fn delegated_status_passes_through_without_ledger_entry() {
        let factory = SimSubDriverFactory::new();
        let mut f = fixture_with(factory);
        let probe = f.factory.probe("R3").unwrap();

        let resp = f
            .controller
            .invoke("R3", "status", payload(json!({ "relay": "R3", "id": "R3", "channel": 0 })))
            .unwrap();
        assert_eq!(resp.to_value(), json!({ "R3": { "value": 0 } }));
        assert!(f.controller.ledger().entries_for("R3").is_none());

        // Routing fields are stripped before forwarding.
        let calls = probe.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "status");
        assert_eq!(calls[0].1, payload(json!({ "channel": 0 })));
    }

    #[test]
    fn delegated_errors_propagate_unchanged() {
        let mut f = fixture();
        let result = f.controller.invoke("R3", "calibrate", Payload::new());
        assert!(matches!(result, Err(RelayError::NotImplemented(_))));
    }

    #[test]
    fn unknown_or_empty_relay_is_not_found() {
        let mut f = fixture();
        for id in ["", "R9"] {
            let result = f.controller.invoke(id, "status", Payload::new());
            assert!(matches!(result, Err(RelayError::RelayNotFound(_))));
        }
    }

    #[test]
    fn method_checks_happen_in_order() {
        let mut f = fixture();
        assert!(matches!(
            f.controller.invoke("R1", "blink", Payload::new()),
            Err(RelayError::UnknownMethod(_))
        ));
        assert!(matches!(
            f.controller.invoke("R1", "run", payload(json!({ "duration": 5 }))),
            Err(RelayError::MethodNotAllowed { .. })
        ));
    }

    #[test]
    fn toggle_twice_restores_original_level() {
        let mut f = fixture();
        f.bank.set_level(Pin(1), true);
        let toggle = || payload(json!({ "status": "toggle" }));

        f.controller.invoke("R1", "switch", toggle()).unwrap();
        assert!(!f.bank.level(Pin(1)));
        f.clock.advance(Duration::from_secs(1));
        f.controller.invoke("R1", "switch", toggle()).unwrap();
        assert!(f.bank.level(Pin(1)));
    }

    #[test]
    fn status_read_failure_yields_null() {
        let mut f = fixture();
        f.bank.fail_reads(Pin(1));
        let resp = f.controller.invoke("R1", "status", Payload::new()).unwrap();
        assert_eq!(resp.to_value(), json!({ "R1": { "status": null } }));
    }

    #[test]
    fn ledger_records_start_time_and_result() {
        let mut f = fixture();
        let started = f.clock.now();
        f.controller.invoke("R2", "run", payload(json!({ "duration": 3 }))).unwrap();

        let entry = f.controller.ledger().entry("R2", Method::Run).unwrap();
        assert_eq!(entry.timestamp, Some(started));
        assert_eq!(entry.value, Some(MethodResult::Run { success: true, duration: 3 }));
    }

    #[test]
    fn shutdown_continues_past_failures() {
        let mut f = fixture_with(SimSubDriverFactory::new().with_failing_disconnect("R3"));
        f.bank.set_level(Pin(2), true);
        f.bank.fail_writes(Pin(1));
        let probe = f.factory.probe("R3").unwrap();

        assert!(!f.controller.shutdown());
        assert!(!f.bank.level(Pin(2)));
        assert_eq!(probe.disconnect_count(), 1);
        assert!(f.controller.is_shut_down());
    }

    #[test]
    fn clean_shutdown_reports_success_and_unhealthy() {
        let mut f = fixture();
        assert!(f.controller.is_healthy());
        assert!(f.controller.shutdown());
        assert!(!f.controller.is_healthy());
        assert!(!f.factory.probe("R3").unwrap().is_connected());
        // The ADC's chip select (pin 10) is left deselected.
        assert!(f.bank.level(Pin(10)));
    }

    #[test]
    fn describe_reports_methods_ledger_and_driver() {
        let mut f = fixture();
        f.controller.invoke("R1", "switch", payload(json!({ "status": "on" }))).unwrap();

        let report = f.controller.describe().to_value();
        assert_eq!(report["name"], json!("mcp23017"));
        assert_eq!(report["supported_methods"], json!(["status", "switch", "run"]));
        assert_eq!(report["healthy"], json!(true));

        let r1 = &report["relays"]["R1"];
        assert_eq!(r1["name"], json!("Lamp"));
        assert_eq!(r1["methods"]["switch"]["min_pause"], json!(1));
        assert_eq!(
            r1["last_method_calls"]["switch"]["value"],
            json!({ "success": true, "target": true })
        );
        assert!(r1["last_method_calls"].get("status").is_none());

        let r3 = &report["relays"]["R3"];
        assert_eq!(r3["driver"]["name"], json!("MCP3008"));
        assert_eq!(r3["driver"]["pins"], json!({ "cs": 10, "miso": 11 }));
        assert!(r3.get("methods").is_none());
    }

    #[test]
    fn narrowed_switch_options_are_enforced() {
        let defs = vec![RelayDefinition::local("R1", "Valve", 1).with_method(
            MethodOverride::new(Method::Switch).with_payload(
                "status",
                FieldConstraint::Select {
                    options: vec![SelectOption::new("on", "On"), SelectOption::new("off", "Off")],
                },
            ),
        )];
        let mut controller = RelayController::from_definitions(
            "mcp23017",
            &defs,
            Arc::new(SimPinBank::new()),
            &NoSubDrivers,
            Arc::new(ManualClock::default()),
        )
        .unwrap();

        let result = controller.invoke("R1", "switch", payload(json!({ "status": "toggle" })));
        assert!(matches!(result, Err(RelayError::InvalidPayload { .. })));
    }
}
