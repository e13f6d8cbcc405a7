//! Tracing setup: console logging plus optional OpenTelemetry export
//!
//! Log lines always go to stdout, as text or JSON. Spans are additionally
//! batched to a collector when an OTLP endpoint is configured:
//!
//! ```text
//! medshare → OTLP (gRPC) → OTel Collector → Tempo (traces)
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::TelemetryConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(json: bool) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if json {
        layer.json().with_current_span(true).boxed()
    } else {
        layer.boxed()
    }
}

fn otel_layer(
    config: &TelemetryConfig,
    endpoint: &str,
) -> Result<BoxedLayer, Box<dyn std::error::Error + Send + Sync>> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(runtime::Tokio)?;

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Initialize the tracing subsystem
///
/// `RUST_LOG` wins over `config.log_filter` when set.
///
/// # Example
/// ```ignore
/// init_tracing(&TelemetryConfig::default())?;
/// ```
pub fn init_tracing(
    config: &TelemetryConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let mut layers = vec![console_layer(config.json_logs)];
    if let Some(endpoint) = config.otlp_endpoint.as_deref() {
        layers.push(otel_layer(config, endpoint)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .init();

    match config.otlp_endpoint.as_deref() {
        Some(endpoint) => tracing::info!(
            service = %config.service_name,
            endpoint,
            "OpenTelemetry tracing initialized"
        ),
        None => tracing::debug!(json = config.json_logs, "Console tracing initialized"),
    }
    Ok(())
}

/// Flush pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
