//! `relayctl-runtime` – Dispatch engine
//!
//! Turns admitted commands into pin activity and owns the controller's
//! lifecycle.
//!
//! # Modules
//!
//! - [`controller`] – [`RelayController`]: `invoke`, `shutdown`,
//!   `describe` and health for one expander.
//! - [`report`] – [`ControllerReport`]: the serialisable snapshot returned by
//!   `describe`.
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with
//!   optional OTLP span export.
//!
//! The pin handlers for `status`, `switch` and `run` are private to the
//! crate; callers only reach them through [`RelayController::invoke`].

pub mod controller;
mod handlers;
pub mod report;
pub mod telemetry;

pub use controller::{ROUTING_FIELDS, RelayController};
pub use report::{ControllerReport, RelayDetail, RelaySummary};
pub use telemetry::{LogFormat, TelemetryGuard, init_tracing};
