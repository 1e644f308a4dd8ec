//! [`CommandGate`] – single admission point before a local relay is actuated.
//!
//! [`CommandGate::admit`] runs two independent checks in order:
//!
//! 1. **Validation** ([`CommandValidator`]): relay, method and payload must
//!    be acceptable. Failure returns the validator's error untouched.
//! 2. **Rate limiting** ([`CallLedger`]): the method's minimum pause must
//!    have elapsed. On success the ledger is stamped with `now` before the
//!    caller runs the handler.
//!
//! A rejected command leaves the ledger untouched. Once the handler has
//! finished, the caller hands its result back via [`CommandGate::record`].

use relayctl_hal::RelayRegistry;
use relayctl_types::{MethodResult, Payload, RelayError, Timestamp};
use tracing::warn;

use crate::call_ledger::CallLedger;
use crate::validator::{Command, CommandValidator};

/// Validation plus rate limiting, owning the controller's call ledger.
#[derive(Debug, Default)]
pub struct CommandGate {
    validator: CommandValidator,
    ledger: CallLedger,
}

impl CommandGate {
    /// Admit `method` on `relay_id` at `now`, or explain why not.
    ///
    /// # Errors
    ///
    /// - Any validation error (see [`CommandValidator::validate`]).
    /// - [`RelayError::RateLimited`] – the minimum pause has not elapsed.
    pub fn admit(
        &mut self,
        registry: &RelayRegistry,
        relay_id: &str,
        method: &str,
        payload: &Payload,
        now: Timestamp,
    ) -> Result<Command, RelayError> {
        let command = self
            .validator
            .validate(registry, relay_id, method, payload)
            .inspect_err(|e| warn!(relay = relay_id, method, error = %e, "command rejected"))?;

        let min_pause = registry
            .get(relay_id)
            .and_then(|relay| relay.as_local())
            .and_then(|local| local.method(command.method()))
            .map(|config| config.min_pause())
            .ok_or_else(|| RelayError::NotImplemented(command.method().to_string()))?;

        self.ledger
            .check_and_prepare(relay_id, command.method(), min_pause, now)
            .inspect_err(|e| warn!(relay = relay_id, method, error = %e, "command rate limited"))?;

        Ok(command)
    }

    /// Store the result of an admitted command.
    pub fn record(&mut self, relay_id: &str, command: Command, result: MethodResult) {
        self.ledger.record(relay_id, command.method(), result);
    }

    pub fn ledger(&self) -> &CallLedger {
        &self.ledger
    }
}
