//! Serialisable status report produced by
//! [`RelayController::describe`][crate::controller::RelayController::describe].

use std::collections::BTreeMap;

use relayctl_kernel::LedgerEntry;
use relayctl_types::{Method, MethodConfig};
use serde::Serialize;

/// Snapshot of a controller for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerReport {
    pub name: String,
    pub supported_methods: Vec<Method>,
    pub healthy: bool,
    pub relays: BTreeMap<String, RelaySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaySummary {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub detail: RelayDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelayDetail {
    Local {
        methods: BTreeMap<Method, MethodConfig>,
        last_method_calls: BTreeMap<Method, LedgerEntry>,
    },
    Delegated {
        driver: serde_json::Value,
    },
}

impl ControllerReport {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
