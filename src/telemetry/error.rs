use thiserror::Error;

use crate::telemetry::router::Pillar;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid mode: {0:?}")]
    InvalidMode(String),

    #[error("Hostname resolution failed: {0}")]
    HostnameResolution(String),

    #[error("Exporter error ({pillar}): {message}")]
    ExporterInit { pillar: Pillar, message: String },

    #[error("Failed to record metric {name:?}: {reason}")]
    MetricRecord { name: String, reason: String },

    #[error("Shutdown error ({pillar}): {message}")]
    Shutdown { pillar: Pillar, message: String },

    #[error("Subscriber error: {0}")]
    Subscriber(String),
}

impl TelemetryError {
    pub(crate) fn exporter(pillar: Pillar, err: impl std::fmt::Display) -> Self {
        Self::ExporterInit {
            pillar,
            message: err.to_string(),
        }
    }

    pub(crate) fn shutdown(pillar: Pillar, err: impl std::fmt::Display) -> Self {
        Self::Shutdown {
            pillar,
            message: err.to_string(),
        }
    }

    pub(crate) fn metric(name: &str, reason: impl Into<String>) -> Self {
        Self::MetricRecord {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
