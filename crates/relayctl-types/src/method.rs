//! The command surface and per-method configuration schema.
//!
//! A [`MethodConfig`] is materialised once per (relay, method) at setup time
//! by starting from [`MethodConfig::defaults_for`] and overlaying the relay's
//! declared [`MethodOverride`][crate::MethodOverride].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{MethodOverride, RelayError};

/// Payload field read by `run`.
pub const DURATION_FIELD: &str = "duration";
/// Payload field read by `switch`.
pub const STATUS_FIELD: &str = "status";

/// The closed set of commands a relay can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Read the relay's pin.
    Status,
    /// Drive the pin on, off, or to the opposite of its current level.
    Switch,
    /// Pulse the pin on for a bounded number of seconds, then off.
    Run,
}

impl Method {
    /// Every supported method, in reporting order.
    pub const ALL: [Method; 3] = [Method::Status, Method::Switch, Method::Run];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Status => "status",
            Method::Switch => "switch",
            Method::Run => "run",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Method::Status),
            "switch" => Ok(Method::Switch),
            "run" => Ok(Method::Run),
            other => Err(RelayError::UnknownMethod(other.to_string())),
        }
    }
}

/// Requested level change for `switch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchCommand {
    On,
    Off,
    Toggle,
}

impl SwitchCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchCommand::On => "on",
            SwitchCommand::Off => "off",
            SwitchCommand::Toggle => "toggle",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "on" => Some(SwitchCommand::On),
            "off" => Some(SwitchCommand::Off),
            "toggle" => Some(SwitchCommand::Toggle),
            _ => None,
        }
    }
}

/// Informational descriptor of one field in a method's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseField {
    pub name: String,
    pub unit: String,
}

impl ResponseField {
    fn new(name: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// One entry of a `select` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// Constraint on a single payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldConstraint {
    /// Integer within `[min, max]`, both inclusive.
    Integer { min: i64, max: i64 },
    /// String drawn from a fixed list of options.
    Select { options: Vec<SelectOption> },
}

impl FieldConstraint {
    /// `true` when this is a select constraint listing `value`.
    pub fn allows_option(&self, value: &str) -> bool {
        match self {
            FieldConstraint::Select { options } => options.iter().any(|o| o.value == value),
            FieldConstraint::Integer { .. } => false,
        }
    }
}

/// Effective configuration of one method on one relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodConfig {
    /// Minimum pause between accepted calls, in seconds.
    pub min_pause: u64,
    #[serde(default)]
    pub response: BTreeMap<String, ResponseField>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, FieldConstraint>,
}

impl MethodConfig {
    /// The built-in defaults record for `method`.
    pub fn defaults_for(method: Method) -> Self {
        let success = ("success".to_string(), ResponseField::new("Success", "boolean"));
        match method {
            Method::Run => Self {
                min_pause: 60,
                response: BTreeMap::from([
                    success,
                    (
                        DURATION_FIELD.to_string(),
                        ResponseField::new("Duration", "seconds"),
                    ),
                ]),
                payload: BTreeMap::from([(
                    DURATION_FIELD.to_string(),
                    FieldConstraint::Integer { min: 1, max: 60 },
                )]),
            },
            Method::Switch => Self {
                min_pause: 1,
                response: BTreeMap::from([
                    success,
                    (
                        "target".to_string(),
                        ResponseField::new("Current status", "onoff"),
                    ),
                ]),
                payload: BTreeMap::from([(
                    STATUS_FIELD.to_string(),
                    FieldConstraint::Select {
                        options: vec![
                            SelectOption::new("on", "On"),
                            SelectOption::new("off", "Off"),
                            SelectOption::new("toggle", "Toggle"),
                        ],
                    },
                )]),
            },
            Method::Status => Self {
                min_pause: 1,
                response: BTreeMap::from([(
                    STATUS_FIELD.to_string(),
                    ResponseField::new("Status", "onoff"),
                )]),
                payload: BTreeMap::new(),
            },
        }
    }

    /// Apply `declared` on top of `self`; declared entries win key by key.
    pub fn overlay(mut self, declared: &MethodOverride) -> Self {
        if let Some(min_pause) = declared.min_pause {
            self.min_pause = min_pause;
        }
        self.response.extend(
            declared
                .response
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.payload.extend(
            declared
                .payload
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self
    }

    pub fn min_pause(&self) -> Duration {
        Duration::from_secs(self.min_pause)
    }

    /// Inclusive bounds of an integer payload field.
    pub fn integer_bounds(&self, field: &str) -> Option<(i64, i64)> {
        match self.payload.get(field)? {
            FieldConstraint::Integer { min, max } => Some((*min, *max)),
            FieldConstraint::Select { .. } => None,
        }
    }

    pub fn constraint(&self, field: &str) -> Option<&FieldConstraint> {
        self.payload.get(field)
    }
}
