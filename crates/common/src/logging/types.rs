//! Logger configuration records.

use std::{path::PathBuf, time::Duration};

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::format::FmtSpan;

/// Stdout layer settings.
#[derive(Debug, Clone)]
pub struct StdoutConfig {
    pub json_format: bool,
    pub fmt_span: FmtSpan,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            // Dispute steps run inside spans; CLOSE records how long each took.
            fmt_span: FmtSpan::CLOSE,
        }
    }
}

/// Rolling file output. Files never carry ANSI colours.
#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub directory: PathBuf,
    pub file_name_prefix: String,
    pub rotation: Rotation,
    pub json_format: bool,
}

impl FileLoggingConfig {
    pub fn new(directory: PathBuf, file_name_prefix: impl Into<String>) -> Self {
        Self {
            directory,
            file_name_prefix: file_name_prefix.into(),
            rotation: Rotation::DAILY,
            json_format: false,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_json_format(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }
}

/// Where and how spans are exported over OTLP/gRPC.
#[derive(Debug, Clone)]
pub struct OtlpExportConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl OtlpExportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// OpenTelemetry resource attributes identifying this prover instance.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub service_name: String,
    pub service_version: Option<String>,
    pub attributes: Vec<KeyValue>,
}

impl ResourceConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            attributes: Vec::new(),
        }
    }

    pub fn build_resource(&self) -> Resource {
        let mut kvs = vec![KeyValue::new("service.name", self.service_name.clone())];
        if let Some(version) = &self.service_version {
            kvs.push(KeyValue::new("service.version", version.clone()));
        }
        kvs.extend(self.attributes.iter().cloned());
        Resource::new(kvs)
    }
}

/// Everything [`super::init`] needs.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub resource: ResourceConfig,
    pub stdout: StdoutConfig,
    pub file: Option<FileLoggingConfig>,
    pub otlp: Option<OtlpExportConfig>,
    /// Extra `EnvFilter` directives applied on top of `RUST_LOG`.
    pub directives: Vec<String>,
}

impl LoggerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            resource: ResourceConfig::new(service_name),
            stdout: StdoutConfig::default(),
            file: None,
            otlp: None,
            directives: Vec::new(),
        }
    }

    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.resource.service_version = Some(version.into());
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.stdout.json_format = enabled;
        self
    }

    pub fn with_file_logging(mut self, file: FileLoggingConfig) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_otlp(mut self, otlp: OtlpExportConfig) -> Self {
        self.otlp = Some(otlp);
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn add_resource_attribute(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.resource
            .attributes
            .push(KeyValue::new(key, value.into()));
        self
    }
}
