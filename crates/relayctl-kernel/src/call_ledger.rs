//! [`CallLedger`] – per-(relay, method) record of the last invocation.
//!
//! Every accepted local invocation stamps the ledger with its *start* time
//! before the handler runs, then records the handler's result once it
//! completes. The next call to the same (relay, method) pair is rejected
//! until the method's minimum pause has elapsed since that stamp, so a slow
//! `run` also blocks a second call that arrives while it is still in
//! flight.
//!
//! Entries are created lazily and overwritten in place; they are never
//! removed.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use relayctl_types::{Method, MethodResult, RelayError, Timestamp};
use serde::Serialize;

/// Last call to one method of one relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Start of the last accepted invocation.
    pub timestamp: Option<Timestamp>,
    /// Result of the last invocation, once it has completed.
    pub value: Option<MethodResult>,
}

/// Tracks the last call to every (relay, method) pair.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use chrono::Utc;
/// use relayctl_kernel::call_ledger::CallLedger;
/// use relayctl_types::Method;
///
/// let mut ledger = CallLedger::new();
/// let t0 = Utc::now();
/// let pause = Duration::from_secs(1);
///
/// // First call is always accepted.
/// assert!(ledger.check_and_prepare("lamp", Method::Switch, pause, t0).is_ok());
/// // Immediately again: rejected.
/// assert!(ledger.check_and_prepare("lamp", Method::Switch, pause, t0).is_err());
/// ```
#[derive(Debug, Default)]
pub struct CallLedger {
    entries: HashMap<String, BTreeMap<Method, LedgerEntry>>,
}

impl CallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `Ok(())` when at least `min_pause` has passed since the last
    /// stamped call to (`relay`, `method`), or when there is none.
    ///
    /// A clock that moved backwards counts as zero elapsed time.
    ///
    /// # Errors
    ///
    /// [`RelayError::RateLimited`] with the remaining wait.
    pub fn check(
        &self,
        relay: &str,
        method: Method,
        min_pause: Duration,
        now: Timestamp,
    ) -> Result<(), RelayError> {
        let Some(last) = self.entry(relay, method).and_then(|e| e.timestamp) else {
            return Ok(());
        };

        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= min_pause {
            return Ok(());
        }

        let remaining = min_pause - elapsed;
        Err(RelayError::RateLimited {
            relay: relay.to_string(),
            method,
            retry_after_ms: remaining
                .as_nanos()
                .div_ceil(1_000_000)
                .try_into()
                .unwrap_or(u64::MAX),
        })
    }

    /// [`check`][Self::check], then [`stamp`][Self::stamp] on success.
    pub fn check_and_prepare(
        &mut self,
        relay: &str,
        method: Method,
        min_pause: Duration,
        now: Timestamp,
    ) -> Result<(), RelayError> {
        self.check(relay, method, min_pause, now)?;
        self.stamp(relay, method, now);
        Ok(())
    }

    /// Start a fresh entry for (`relay`, `method`) at `now`, discarding the
    /// previous result.
    pub fn stamp(&mut self, relay: &str, method: Method, now: Timestamp) {
        self.entries.entry(relay.to_string()).or_default().insert(
            method,
            LedgerEntry {
                timestamp: Some(now),
                value: None,
            },
        );
    }

    /// Attach the completed result to the current entry.
    pub fn record(&mut self, relay: &str, method: Method, value: MethodResult) {
        self.entries
            .entry(relay.to_string())
            .or_default()
            .entry(method)
            .or_insert(LedgerEntry {
                timestamp: None,
                value: None,
            })
            .value = Some(value);
    }

    pub fn entry(&self, relay: &str, method: Method) -> Option<&LedgerEntry> {
        self.entries.get(relay)?.get(&method)
    }

    /// Every recorded method of `relay`, in method order.
    pub fn entries_for(&self, relay: &str) -> Option<&BTreeMap<Method, LedgerEntry>> {
        self.entries.get(relay)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
