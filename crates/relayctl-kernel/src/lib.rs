//! `relayctl-kernel` – Safety rules
//!
//! Decides whether a command may touch hardware. It does not actuate
//! anything itself.
//!
//! # Modules
//!
//! - [`validator`] – [`CommandValidator`][validator::CommandValidator]:
//!   method-existence and payload-shape checks for local relays, producing
//!   a typed [`Command`][validator::Command].
//! - [`call_ledger`] – [`CallLedger`][call_ledger::CallLedger]: last call
//!   time and result per (relay, method), enforcing minimum pauses.
//! - [`command_gate`] – [`CommandGate`][command_gate::CommandGate]: the
//!   single admission point combining validation and rate limiting.

pub mod call_ledger;
pub mod command_gate;
pub mod validator;

pub use call_ledger::{CallLedger, LedgerEntry};
pub use command_gate::CommandGate;
pub use validator::{Command, CommandValidator};
