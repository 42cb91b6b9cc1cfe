//! Logging subsystem: stdout, rolling files and optional OTLP trace export.

mod manager;
mod types;


pub use manager::{finalize, init, LoggingError};
pub use tracing_appender::rolling::Rotation;
pub use types::{FileLoggingConfig, LoggerConfig, OtlpExportConfig, ResourceConfig, StdoutConfig};

/// Appends an optional deployment label to a service name, e.g. `ovm-fraud-prover%mainnet`.
pub fn format_service_name(base: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
