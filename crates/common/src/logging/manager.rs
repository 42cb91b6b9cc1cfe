//! Installs and tears down the global tracing subscriber.

use std::sync::OnceLock;

use opentelemetry::{
    global::{self, set_text_map_propagator},
    trace::{TraceError, TracerProvider as _},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime::Tokio,
    trace::{Config, TracerProvider},
};
use thiserror::Error;
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    filter::ParseError, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    Layer,
};

use super::types::LoggerConfig;

/// Kept so [`finalize`] can flush buffered spans on shutdown.
static TRACER_PROVIDER: OnceLock<TracerProvider> = OnceLock::new();

/// Chain client crates that are chatty at INFO.
const QUIET_TARGETS: &[&str] = &["alloy_transport_http=warn", "hyper=warn", "h2=warn"];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter directive: {0}")]
    Directive(#[from] ParseError),

    #[error("otlp pipeline: {0}")]
    Otlp(#[from] TraceError),

    #[error("subscriber already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

pub(super) fn build_filter(config: &LoggerConfig) -> Result<EnvFilter, LoggingError> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS
        .iter()
        .copied()
        .chain(config.directives.iter().map(String::as_str))
    {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Installs the global subscriber. Must run inside a tokio runtime when OTLP is enabled.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    set_text_map_propagator(TraceContextPropagator::new());

    let filter = build_filter(&config)?;

    let stdout_layer = if config.stdout.json_format {
        layer()
            .json()
            .with_span_events(config.stdout.fmt_span.clone())
            .with_filter(filter.clone())
            .boxed()
    } else {
        layer()
            .compact()
            .with_span_events(config.stdout.fmt_span.clone())
            .with_filter(filter.clone())
            .boxed()
    };

    let file_layer = config.file.as_ref().map(|file| {
        let appender =
            RollingFileAppender::new(file.rotation.clone(), &file.directory, &file.file_name_prefix);
        let base = layer().with_writer(appender).with_ansi(false);
        if file.json_format {
            base.json().with_filter(filter.clone()).boxed()
        } else {
            base.compact().with_filter(filter.clone()).boxed()
        }
    });

    let otel_layer = match &config.otlp {
        Some(otlp) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(otlp.endpoint.clone())
                .with_timeout(otlp.timeout);
            let provider = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(Config::default().with_resource(config.resource.build_resource()))
                .install_batch(Tokio)?;

            let tracer = provider.tracer("ovm-fraud-prover");
            // A second init in the same process keeps the first provider.
            let _ = TRACER_PROVIDER.set(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(otel_layer)
        .try_init()?;

    info!(
        service_name = %config.resource.service_name,
        service_version = ?config.resource.service_version,
        otlp = config.otlp.is_some(),
        file = ?config.file.as_ref().map(|f| f.directory.display().to_string()),
        "logging initialized"
    );
    Ok(())
}

/// Flushes and shuts down the OTLP exporter, if one was installed.
pub fn finalize() {
    match TRACER_PROVIDER.get() {
        Some(provider) => {
            if let Err(err) = provider.shutdown() {
                error!(%err, "failed to shut down tracer provider");
            }
        }
        None => debug!("no tracer provider to shut down"),
    }
    global::shutdown_tracer_provider();
}
