use std::fmt;

use crate::telemetry::config::Mode;

/// OTLP/gRPC collector listening on the local machine
pub const LOCAL_COLLECTOR_ENDPOINT: &str = "http://localhost:4317";

/// Shared collector for development deployments
pub const DEVELOPMENT_COLLECTOR_ENDPOINT: &str = "http://otel-collector.dev.internal:4317";

/// Production collector host; the port comes from the configuration
pub const PRODUCTION_COLLECTOR_HOST: &str = "otel-collector.internal";

/// Port on which the production collector is reached over TLS
pub const TLS_PORT: &str = "443";

/// One of the three telemetry types handled by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pillar {
    Logging,
    Tracing,
    Metrics,
}

impl Pillar {
    pub const ALL: [Pillar; 3] = [Pillar::Logging, Pillar::Tracing, Pillar::Metrics];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logging => "logging",
            Self::Tracing => "tracing",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output layout for stdout targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutFormat {
    /// One JSON object per line
    Structured,
    /// Human-readable multi-line dump
    Pretty,
}

/// Collector reachable over OTLP/gRPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorEndpoint {
    pub url: String,
    pub tls: bool,
}

impl CollectorEndpoint {
    fn plain(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tls: false,
        }
    }

    fn production(port: &str) -> Self {
        let tls = port == TLS_PORT;
        let scheme = if tls { "https" } else { "http" };
        Self {
            url: format!("{}://{}:{}", scheme, PRODUCTION_COLLECTOR_HOST, port),
            tls,
        }
    }
}

/// Where a pillar sends its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    /// Everything is dropped before reaching an exporter
    Null,
    /// Written to the process's standard output
    Stdout(StdoutFormat),
    /// Batched by the SDK, then discarded by the exporter
    NoopExporter,
    /// Exported to an OpenTelemetry collector
    Collector(CollectorEndpoint),
}

/// Resolve the transport for `pillar` in `mode`.
///
/// `port` is only consulted for the production collector.
pub fn target_for(pillar: Pillar, mode: Mode, port: &str) -> TransportTarget {
    match (mode, pillar) {
        (Mode::Discard, _) => TransportTarget::Null,
        (Mode::Local, Pillar::Logging) => TransportTarget::Stdout(StdoutFormat::Structured),
        (Mode::Local, Pillar::Metrics) => TransportTarget::Stdout(StdoutFormat::Pretty),
        (Mode::Local, Pillar::Tracing) => TransportTarget::NoopExporter,
        (Mode::DebugCollector, _) => {
            TransportTarget::Collector(CollectorEndpoint::plain(LOCAL_COLLECTOR_ENDPOINT))
        }
        (Mode::DevelopmentCollector, _) => {
            TransportTarget::Collector(CollectorEndpoint::plain(DEVELOPMENT_COLLECTOR_ENDPOINT))
        }
        (Mode::ProductionCollector, _) => {
            TransportTarget::Collector(CollectorEndpoint::production(port))
        }
    }
}
