//! Logging and trace export setup for Mnemos binaries.
//!
//! Call [`init_tracing`] once at process startup. Library crates only emit
//! `tracing` events; this module decides where they go.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL (e.g. `http://localhost:4318`). Spans are exported only when set. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `MNEMOS_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = mnemos_runtime::telemetry::init_tracing("mnemos");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: env filter, stderr output and, when an
/// endpoint is configured, an OTLP span exporter.
///
/// Hold the returned guard until exit. A second call in the same process
/// leaves the first subscriber in place and reports the failure on stderr.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = wants_json(std::env::var("MNEMOS_LOG_FORMAT").ok().as_deref());
    let provider = build_provider(service_name, std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok());

    // `Option<Layer>` is itself a layer, so absent pieces simply do nothing.
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(service_name.to_string())));
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let compact_layer = (!json).then(|| fmt::layer().compact().with_writer(std::io::stderr));

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
    {
        eprintln!("[mnemos] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[mnemos] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}

/// `None` without an endpoint or when the exporter fails to build; the
/// failure goes to stderr since no subscriber exists yet.
fn build_provider(service_name: &str, endpoint: Option<String>) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint?)
        .build()
        .map_err(|e| eprintln!("[mnemos] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: there is no async runtime to drive a batch processor.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
