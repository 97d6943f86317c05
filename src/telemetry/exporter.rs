use std::time::Duration;

use opentelemetry_otlp::{
    LogExporter, MetricExporter, SpanExporter, WithExportConfig, WithTonicConfig,
};
use tonic::transport::ClientTlsConfig;
use tracing::info;

use crate::telemetry::error::TelemetryError;
use crate::telemetry::router::{CollectorEndpoint, Pillar};

fn tls_config() -> ClientTlsConfig {
    ClientTlsConfig::new().with_native_roots()
}

/// tonic channels spawn onto the current Tokio runtime and panic without one
fn require_runtime(pillar: Pillar) -> Result<(), TelemetryError> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|e| {
            TelemetryError::exporter(pillar, format!("collector export needs a Tokio runtime: {e}"))
        })
}

/// Build an OTLP/gRPC span exporter for `endpoint`
pub fn build_span_exporter(
    endpoint: &CollectorEndpoint,
    timeout: Duration,
) -> Result<SpanExporter, TelemetryError> {
    require_runtime(Pillar::Tracing)?;

    let mut builder = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.url.as_str())
        .with_timeout(timeout);

    if endpoint.tls {
        builder = builder.with_tls_config(tls_config());
    }

    let exporter = builder
        .build()
        .map_err(|e| TelemetryError::exporter(Pillar::Tracing, e))?;

    info!(endpoint = %endpoint.url, tls = endpoint.tls, "Span exporter built");
    Ok(exporter)
}

/// Build an OTLP/gRPC metric exporter for `endpoint`
pub fn build_metric_exporter(
    endpoint: &CollectorEndpoint,
    timeout: Duration,
) -> Result<MetricExporter, TelemetryError> {
    require_runtime(Pillar::Metrics)?;

    let mut builder = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.url.as_str())
        .with_timeout(timeout);

    if endpoint.tls {
        builder = builder.with_tls_config(tls_config());
    }

    let exporter = builder
        .build()
        .map_err(|e| TelemetryError::exporter(Pillar::Metrics, e))?;

    info!(endpoint = %endpoint.url, tls = endpoint.tls, "Metric exporter built");
    Ok(exporter)
}

/// Build an OTLP/gRPC log exporter for `endpoint`
pub fn build_log_exporter(
    endpoint: &CollectorEndpoint,
    timeout: Duration,
) -> Result<LogExporter, TelemetryError> {
    require_runtime(Pillar::Logging)?;

    let mut builder = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.url.as_str())
        .with_timeout(timeout);

    if endpoint.tls {
        builder = builder.with_tls_config(tls_config());
    }

    let exporter = builder
        .build()
        .map_err(|e| TelemetryError::exporter(Pillar::Logging, e))?;

    info!(endpoint = %endpoint.url, tls = endpoint.tls, "Log exporter built");
    Ok(exporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::router::LOCAL_COLLECTOR_ENDPOINT;

    fn local() -> CollectorEndpoint {
        CollectorEndpoint {
            url: LOCAL_COLLECTOR_ENDPOINT.to_string(),
            tls: false,
        }
    }

    #[tokio::test]
    async fn span_exporter_builds_for_local_collector() {
        let result = build_span_exporter(&local(), Duration::from_secs(1));

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn metric_exporter_builds_for_local_collector() {
        let result = build_metric_exporter(&local(), Duration::from_secs(1));

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn log_exporter_builds_for_local_collector() {
        let result = build_log_exporter(&local(), Duration::from_secs(1));

        assert!(result.is_ok());
    }

    #[test]
    fn exporters_outside_a_runtime_fail_instead_of_panicking() {
        let span = build_span_exporter(&local(), Duration::from_secs(1));
        let metric = build_metric_exporter(&local(), Duration::from_secs(1));
        let log = build_log_exporter(&local(), Duration::from_secs(1));

        assert!(matches!(
            span,
            Err(TelemetryError::ExporterInit {
                pillar: Pillar::Tracing,
                ..
            })
        ));
        assert!(matches!(
            metric,
            Err(TelemetryError::ExporterInit {
                pillar: Pillar::Metrics,
                ..
            })
        ));
        assert!(matches!(
            log,
            Err(TelemetryError::ExporterInit {
                pillar: Pillar::Logging,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_still_builds() {
        // Connection is lazy; an unreachable collector only fails at export time
        let endpoint = CollectorEndpoint {
            url: "http://otel-collector.invalid:4317".to_string(),
            tls: false,
        };

        let result = build_span_exporter(&endpoint, Duration::from_secs(1));

        assert!(result.is_ok());
    }
}
