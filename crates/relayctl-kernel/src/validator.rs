//! [`CommandValidator`] – method and payload checks for local relays.
//!
//! Before a command reaches a pin, pass it through
//! [`CommandValidator::validate`]. The checks run in a fixed order and the
//! first failure is returned:
//!
//! 1. the relay id is non-empty and registered ([`RelayError::RelayNotFound`]);
//! 2. the method is one of `status`, `switch`, `run` ([`RelayError::UnknownMethod`]);
//! 3. the relay declares that method ([`RelayError::MethodNotAllowed`]);
//! 4. the payload satisfies the method's constraints ([`RelayError::InvalidPayload`]).
//!
//! On success the payload is returned in typed form as a [`Command`], so
//! handlers never re-parse it. Validation has no side effects.

use relayctl_hal::RelayRegistry;
use relayctl_types::method::{DURATION_FIELD, STATUS_FIELD};
use relayctl_types::{Method, MethodConfig, Payload, RelayError, SwitchCommand};
use serde_json::Value;

/// A validated invocation of a local relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Switch(SwitchCommand),
    /// Pulse length in seconds, already checked against the relay's bounds.
    Run { duration: u32 },
}

impl Command {
    pub fn method(self) -> Method {
        match self {
            Command::Status => Method::Status,
            Command::Switch(_) => Method::Switch,
            Command::Run { .. } => Method::Run,
        }
    }
}

/// Stateless checker for `invoke` requests aimed at local relays.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use relayctl_hal::{NoSubDrivers, RelayRegistry, SimPinBank};
/// use relayctl_kernel::validator::{Command, CommandValidator};
/// use relayctl_types::{Method, MethodOverride, Payload, RelayDefinition};
/// use serde_json::json;
///
/// let defs = vec![RelayDefinition::local("pump", "Pump", 2)
///     .with_method(MethodOverride::new(Method::Run))];
/// let registry = RelayRegistry::build(&defs, Arc::new(SimPinBank::new()), &NoSubDrivers).unwrap();
///
/// let payload: Payload = json!({ "duration": 5 }).as_object().unwrap().clone();
/// let cmd = CommandValidator.validate(&registry, "pump", "run", &payload).unwrap();
/// assert_eq!(cmd, Command::Run { duration: 5 });
///
/// let too_long: Payload = json!({ "duration": 61 }).as_object().unwrap().clone();
/// assert!(CommandValidator.validate(&registry, "pump", "run", &too_long).is_err());
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandValidator;

impl CommandValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `method` with `payload` against relay `relay_id`.
    ///
    /// Delegated relays have no local methods, so every method is reported
    /// as not allowed for them.
    pub fn validate(
        &self,
        registry: &RelayRegistry,
        relay_id: &str,
        method: &str,
        payload: &Payload,
    ) -> Result<Command, RelayError> {
        let relay = registry
            .get(relay_id)
            .filter(|_| !relay_id.is_empty())
            .ok_or_else(|| RelayError::RelayNotFound(relay_id.to_string()))?;

        let method: Method = method.parse()?;

        let config = relay
            .as_local()
            .and_then(|local| local.method(method))
            .ok_or_else(|| RelayError::MethodNotAllowed {
                relay: relay_id.to_string(),
                method,
            })?;

        match method {
            Method::Status => Ok(Command::Status),
            Method::Switch => check_switch(relay_id, config, payload).map(Command::Switch),
            Method::Run => check_run(relay_id, config, payload).map(|duration| Command::Run { duration }),
        }
    }
}

fn check_switch(
    relay: &str,
    config: &MethodConfig,
    payload: &Payload,
) -> Result<SwitchCommand, RelayError> {
    let raw = match payload.get(STATUS_FIELD) {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(RelayError::invalid_payload(
                relay,
                format!("status must be a string (given: {other})"),
            ));
        }
        None => return Err(RelayError::invalid_payload(relay, "status is required")),
    };

    let command = SwitchCommand::from_name(raw).ok_or_else(|| {
        RelayError::invalid_payload(
            relay,
            format!("status {raw:?} not allowed. Must be on, off or toggle"),
        )
    })?;

    // The relay may narrow the option list further.
    match config.constraint(STATUS_FIELD) {
        Some(constraint) if !constraint.allows_option(raw) => Err(RelayError::invalid_payload(
            relay,
            format!("status {raw:?} is not enabled for this relay"),
        )),
        _ => Ok(command),
    }
}

fn check_run(relay: &str, config: &MethodConfig, payload: &Payload) -> Result<u32, RelayError> {
    let raw = payload
        .get(DURATION_FIELD)
        .ok_or_else(|| RelayError::invalid_payload(relay, "duration is required"))?;

    let (min, max) = config.integer_bounds(DURATION_FIELD).ok_or_else(|| {
        RelayError::invalid_payload(relay, "run has no duration bounds configured")
    })?;

    let duration = match raw.as_i64() {
        Some(duration) => duration,
        // An integer past i64::MAX is still an integer, just too long.
        None if raw.is_u64() => {
            return Err(RelayError::invalid_payload(
                relay,
                format!("duration must be at most {max} (given: {raw})"),
            ));
        }
        None => {
            return Err(RelayError::invalid_payload(
                relay,
                format!("duration must be integer (given: {raw})"),
            ));
        }
    };
    if duration > max {
        return Err(RelayError::invalid_payload(
            relay,
            format!("duration must be at most {max} (given: {duration})"),
        ));
    }
    if duration < min {
        return Err(RelayError::invalid_payload(
            relay,
            format!("duration must be at least {min} (given: {duration})"),
        ));
    }

    u32::try_from(duration)
        .map_err(|_| RelayError::invalid_payload(relay, format!("duration {duration} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use relayctl_hal::{NoSubDrivers, SimPinBank, SimSubDriverFactory};
    use relayctl_types::{
        FieldConstraint, MethodOverride, RelayDefinition, SelectOption, SubDriverKind,
        SubDriverSpec,
    };
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn registry() -> RelayRegistry {
        let defs = vec![
            RelayDefinition::local("R1", "Lamp", 1)
                .as_output()
                .with_method(MethodOverride::new(Method::Switch))
                .with_method(MethodOverride::new(Method::Status)),
            RelayDefinition::local("R2", "Pump", 2)
                .as_output()
                .with_method(MethodOverride::new(Method::Run)),
            RelayDefinition::local("R4", "Fan", 4).as_output().with_method(
                MethodOverride::new(Method::Switch).with_payload(
                    STATUS_FIELD,
                    FieldConstraint::Select {
                        options: vec![SelectOption::new("on", "On"), SelectOption::new("off", "Off")],
                    },
                ),
            ),
        ];
        RelayRegistry::build(&defs, Arc::new(SimPinBank::new()), &NoSubDrivers).unwrap()
    }

    fn validate(relay: &str, method: &str, body: Value) -> Result<Command, RelayError> {
        CommandValidator::new().validate(&registry(), relay, method, &payload(body))
    }

    #[test]
    fn empty_or_unknown_relay_is_not_found() {
        assert_eq!(
            validate("", "status", json!({})),
            Err(RelayError::RelayNotFound(String::new()))
        );
        assert_eq!(
            validate("R9", "status", json!({})),
            Err(RelayError::RelayNotFound("R9".into()))
        );
    }

    #[test]
    fn relay_is_resolved_before_method() {
        // Unknown relay wins over unknown method.
        assert!(matches!(
            validate("R9", "explode", json!({})),
            Err(RelayError::RelayNotFound(_))
        ));
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert_eq!(
            validate("R1", "read", json!({})),
            Err(RelayError::UnknownMethod("read".into()))
        );
    }

    #[test]
    fn undeclared_method_is_not_allowed() {
        assert_eq!(
            validate("R1", "run", json!({ "duration": 5 })),
            Err(RelayError::MethodNotAllowed {
                relay: "R1".into(),
                method: Method::Run,
            })
        );
    }

    #[test]
    fn status_has_no_payload_constraints() {
        assert_eq!(validate("R1", "status", json!({ "junk": 1 })), Ok(Command::Status));
    }

    #[test]
    fn switch_accepts_on_off_toggle() {
        assert_eq!(
            validate("R1", "switch", json!({ "status": "on" })),
            Ok(Command::Switch(SwitchCommand::On))
        );
        assert_eq!(
            validate("R1", "switch", json!({ "status": "off" })),
            Ok(Command::Switch(SwitchCommand::Off))
        );
        assert_eq!(
            validate("R1", "switch", json!({ "status": "toggle" })),
            Ok(Command::Switch(SwitchCommand::Toggle))
        );
    }

    #[test]
    fn switch_rejects_bad_status() {
        for body in [
            json!({ "status": "blink" }),
            json!({ "status": 1 }),
            json!({}),
        ] {
            assert!(matches!(
                validate("R1", "switch", body),
                Err(RelayError::InvalidPayload { .. })
            ));
        }
    }

    #[test]
    fn switch_respects_narrowed_options() {
        assert!(validate("R4", "switch", json!({ "status": "on" })).is_ok());
        assert!(matches!(
            validate("R4", "switch", json!({ "status": "toggle" })),
            Err(RelayError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn run_duration_boundaries() {
        // Default bounds are [1, 60].
        assert!(matches!(
            validate("R2", "run", json!({ "duration": 0 })),
            Err(RelayError::InvalidPayload { .. })
        ));
        assert_eq!(
            validate("R2", "run", json!({ "duration": 1 })),
            Ok(Command::Run { duration: 1 })
        );
        assert_eq!(
            validate("R2", "run", json!({ "duration": 60 })),
            Ok(Command::Run { duration: 60 })
        );
        assert!(matches!(
            validate("R2", "run", json!({ "duration": 61 })),
            Err(RelayError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn run_rejects_non_integer_durations() {
        for body in [
            json!({ "duration": 5.0 }),
            json!({ "duration": 2.5 }),
            json!({ "duration": "5" }),
            json!({ "duration": true }),
            json!({ "duration": null }),
            json!({}),
        ] {
            assert!(matches!(
                validate("R2", "run", body),
                Err(RelayError::InvalidPayload { .. })
            ));
        }
    }

    #[test]
    fn run_error_messages_distinguish_causes() {
        let msg = |body| match validate("R2", "run", body) {
            Err(RelayError::InvalidPayload { reason, .. }) => reason,
            other => panic!("unexpected {other:?}"),
        };
        assert!(msg(json!({ "duration": "x" })).contains("integer"));
        assert!(msg(json!({ "duration": 99 })).contains("at most 60"));
        assert!(msg(json!({ "duration": 0 })).contains("at least 1"));
    }

    #[test]
    fn run_duration_beyond_i64_is_too_long() {
        let reason = match validate("R2", "run", json!({ "duration": u64::MAX })) {
            Err(RelayError::InvalidPayload { reason, .. }) => reason,
            other => panic!("unexpected {other:?}"),
        };
        assert!(reason.contains("at most 60"));
        assert!(!reason.contains("integer"));
    }

    #[test]
    fn delegated_relay_has_no_local_methods() {
        let defs = vec![RelayDefinition::delegated(
            "adc",
            "Moisture",
            SubDriverSpec::new(SubDriverKind::Mcp3008),
        )];
        let registry =
            RelayRegistry::build(&defs, Arc::new(SimPinBank::new()), &SimSubDriverFactory::new())
                .unwrap();
        let result = CommandValidator.validate(&registry, "adc", "status", &Payload::new());
        assert!(matches!(result, Err(RelayError::MethodNotAllowed { .. })));
    }
}
