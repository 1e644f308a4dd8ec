//! Serialisable relay definitions.
//!
//! A controller is built from a list of [`RelayDefinition`]s, typically
//! loaded from the `[[relays]]` tables of the TOML config. A definition is
//! either *local* (it names a `pin` and a list of methods) or *delegated*
//! (it names a sub-`driver`); the registry rejects anything else.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{FieldConstraint, Method, Pin, ResponseField};

/// Per-relay override of a method's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodOverride {
    pub id: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pause: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response: BTreeMap<String, ResponseField>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, FieldConstraint>,
}

impl MethodOverride {
    /// Declare `id` with no overrides; every field comes from the defaults.
    pub fn new(id: Method) -> Self {
        Self {
            id,
            min_pause: None,
            response: BTreeMap::new(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with_min_pause(mut self, secs: u64) -> Self {
        self.min_pause = Some(secs);
        self
    }

    pub fn with_payload(mut self, field: &str, constraint: FieldConstraint) -> Self {
        self.payload.insert(field.to_string(), constraint);
        self
    }
}

/// Kinds of sub-driver a relay can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubDriverKind {
    /// SPI analog-to-digital converter bit-banged over expander pins.
    Mcp3008,
}

impl fmt::Display for SubDriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubDriverKind::Mcp3008 => write!(f, "mcp3008"),
        }
    }
}

/// An auxiliary pin handed to a sub-driver: either a bare index or an
/// index that must first be configured as a cleared output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuxPin {
    Index(u8),
    Configured {
        pin: u8,
        #[serde(default)]
        output: bool,
    },
}

impl AuxPin {
    pub fn pin(self) -> Pin {
        match self {
            AuxPin::Index(pin) | AuxPin::Configured { pin, .. } => Pin(pin),
        }
    }

    pub fn is_output(self) -> bool {
        matches!(self, AuxPin::Configured { output: true, .. })
    }
}

/// Sub-driver declaration of a delegated relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubDriverSpec {
    pub kind: SubDriverKind,
    /// Auxiliary pins by role (e.g. `cs`, `miso`, `mosi`, `clk`).
    #[serde(default)]
    pub pins: BTreeMap<String, AuxPin>,
    /// Driver-specific settings, passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl SubDriverSpec {
    pub fn new(kind: SubDriverKind) -> Self {
        Self {
            kind,
            pins: BTreeMap::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_pin(mut self, role: &str, pin: AuxPin) -> Self {
        self.pins.insert(role.to_string(), pin);
        self
    }
}

/// Static definition of one relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<Pin>,
    /// Configure `pin` as a cleared output at setup.
    #[serde(default)]
    pub output: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<SubDriverSpec>,
}

impl RelayDefinition {
    /// A pin-controlled relay with no methods yet.
    pub fn local(id: impl Into<String>, name: impl Into<String>, pin: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pin: Some(Pin(pin)),
            output: false,
            methods: Vec::new(),
            driver: None,
        }
    }

    /// A relay whose commands are forwarded to a sub-driver.
    pub fn delegated(id: impl Into<String>, name: impl Into<String>, driver: SubDriverSpec) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pin: None,
            output: false,
            methods: Vec::new(),
            driver: Some(driver),
        }
    }

    pub fn as_output(mut self) -> Self {
        self.output = true;
        self
    }

    pub fn with_method(mut self, method: MethodOverride) -> Self {
        self.methods.push(method);
        self
    }
}
