//! Logging and trace export setup.
//!
//! Call [`init_tracing`] once at process start and keep the returned
//! [`TelemetryGuard`] alive until exit.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter, default `info`. |
//! | `RELAYCTL_LOG_FORMAT` | `json` for newline-delimited JSON, anything else for compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | When set, spans are also exported over OTLP/HTTP. |
//!
//! ```rust,no_run
//! let _telemetry = relayctl_runtime::telemetry::init_tracing("relayctl");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_ENV: &str = "RELAYCTL_LOG_FORMAT";
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Console log rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber.
///
/// A second call in the same process leaves the first subscriber in place
/// and prints a note to stderr.
pub fn init_tracing(service_name: &str) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = otlp_provider(service_name);
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("relayctl")));

    let (json, compact) = match LogFormat::from_env() {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Compact => (None, Some(fmt::layer().compact())),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json)
        .with(compact)
        .try_init()
    {
        eprintln!("[relayctl] tracing already initialised: {e}");
    }

    TelemetryGuard(provider)
}

/// Flushes and shuts down the span exporter on drop.
pub struct TelemetryGuard(Option<SdkTracerProvider>);

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[relayctl] trace exporter shutdown failed: {e}");
            }
        }
    }
}

fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var(OTLP_ENDPOINT_ENV).ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .inspect_err(|e| eprintln!("[relayctl] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Synchronous export: the controller runs without an async runtime.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
    }

    #[test]
    fn no_provider_without_endpoint() {
        // SAFETY: no other test in this crate reads this variable.
        unsafe { std::env::remove_var(OTLP_ENDPOINT_ENV) };
        assert!(otlp_provider("test").is_none());
    }

    #[test]
    fn empty_guard_drops_cleanly() {
        let guard = TelemetryGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
