//! `relayctl-types` – shared vocabulary for the relay controller.
//!
//! Every crate in the workspace speaks in these types: the [`Method`]
//! command surface, the [`Payload`] a caller hands to `invoke`, the typed
//! [`MethodResult`] bodies, the [`InvokeResponse`] envelope, and the single
//! [`RelayError`] enum that crosses crate boundaries.
//!
//! # Modules
//!
//! - [`method`] – the command surface and per-method configuration schema
//!   (minimum pause, response descriptors, payload constraints).
//! - [`definition`] – the serialisable relay definitions a controller is
//!   built from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub mod definition;
pub mod method;

pub use definition::{AuxPin, MethodOverride, RelayDefinition, SubDriverKind, SubDriverSpec};
pub use method::{
    FieldConstraint, Method, MethodConfig, ResponseField, SelectOption, SwitchCommand,
};

/// Free-form key/value payload attached to an invocation.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Wall-clock instant used by the call ledger and status reports.
pub type Timestamp = DateTime<Utc>;

/// A logical pin index on the GPIO expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pin(pub u8);

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin {}", self.0)
    }
}

/// Body produced by a locally handled method.
///
/// Serialises to the flat JSON objects callers see, e.g.
/// `{"success": true, "target": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MethodResult {
    /// `status`: the pin reading, `None` when the read failed.
    Status { status: Option<bool> },
    /// `switch`: whether the write succeeded and the level that was targeted.
    Switch { success: bool, target: bool },
    /// `run`: whether the pulse completed cleanly and its requested length.
    Run { success: bool, duration: u32 },
}

/// What a relay produced for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// Result of a local pin handler.
    Local(MethodResult),
    /// Sub-driver result, passed through verbatim.
    Delegated(serde_json::Value),
}

/// Uniform result envelope: `{ <relay_id>: <result> }`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeResponse {
    pub relay_id: String,
    pub outcome: Outcome,
}

impl InvokeResponse {
    pub fn local(relay_id: impl Into<String>, result: MethodResult) -> Self {
        Self {
            relay_id: relay_id.into(),
            outcome: Outcome::Local(result),
        }
    }

    pub fn delegated(relay_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            relay_id: relay_id.into(),
            outcome: Outcome::Delegated(result),
        }
    }

    /// The local handler result, if this response came from a local relay.
    pub fn local_result(&self) -> Option<&MethodResult> {
        match &self.outcome {
            Outcome::Local(result) => Some(result),
            Outcome::Delegated(_) => None,
        }
    }

    /// Render the envelope as a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for InvokeResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.relay_id, &self.outcome)?;
        map.end()
    }
}

/// Every failure the controller can surface to a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayError {
    #[error("Relay {0:?} not found")]
    RelayNotFound(String),

    #[error("Method {0:?} not found")]
    UnknownMethod(String),

    #[error("Method {method} not allowed for {relay}")]
    MethodNotAllowed { relay: String, method: Method },

    #[error("Invalid payload for {relay}: {reason}")]
    InvalidPayload { relay: String, reason: String },

    #[error("Not enough time elapsed since last {method} on {relay} (retry in {retry_after_ms} ms)")]
    RateLimited {
        relay: String,
        method: Method,
        retry_after_ms: u64,
    },

    /// A validated method reached a dispatcher with no handler for it.
    #[error("No handler for method {0:?}")]
    NotImplemented(String),

    #[error("Hardware fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn invalid_payload(relay: &str, reason: impl Into<String>) -> Self {
        RelayError::InvalidPayload {
            relay: relay.to_string(),
            reason: reason.into(),
        }
    }

    pub fn hardware(component: impl fmt::Display, details: impl Into<String>) -> Self {
        RelayError::HardwareFault {
            component: component.to_string(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_envelope_is_keyed_by_relay_id() {
        let resp = InvokeResponse::local(
            "R1",
            MethodResult::Switch {
                success: true,
                target: true,
            },
        );
        assert_eq!(
            resp.to_value(),
            json!({ "R1": { "success": true, "target": true } })
        );
    }

    #[test]
    fn status_with_failed_read_serialises_null() {
        let resp = InvokeResponse::local("lamp", MethodResult::Status { status: None });
        assert_eq!(resp.to_value(), json!({ "lamp": { "status": null } }));
    }

    #[test]
    fn delegated_envelope_passes_value_through() {
        let inner = json!({ "value": 512, "channel": 0 });
        let resp = InvokeResponse::delegated("R3", inner.clone());
        assert_eq!(resp.to_value(), json!({ "R3": inner }));
        assert!(resp.local_result().is_none());
    }

    #[test]
    fn relay_error_display() {
        let err = RelayError::RateLimited {
            relay: "pump".into(),
            method: Method::Run,
            retry_after_ms: 1500,
        };
        let msg = err.to_string();
        assert!(msg.contains("pump"));
        assert!(msg.contains("run"));

        let err = RelayError::hardware(Pin(4), "i2c nack");
        assert_eq!(err.to_string(), "Hardware fault on pin 4: i2c nack");
    }

    #[test]
    fn relay_error_serialization_roundtrip() {
        let err = RelayError::MethodNotAllowed {
            relay: "R1".into(),
            method: Method::Run,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: RelayError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
