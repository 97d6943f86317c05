use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tracing::debug;

use crate::telemetry::api::MetricPillar;
use crate::telemetry::config::ResolvedConfig;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::exporter::build_metric_exporter;
use crate::telemetry::fields::FieldSet;
use crate::telemetry::resource::build_metric_resource;
use crate::telemetry::router::{Pillar, TransportTarget};
use crate::telemetry::INSTRUMENTATION_NAME;

const MAX_INSTRUMENT_NAME_LEN: usize = 255;

/// Check `name` against the OpenTelemetry instrument name syntax:
/// a letter followed by up to 254 letters, digits, `_`, `.`, `-` or `/`.
pub fn validate_instrument_name(name: &str) -> Result<(), TelemetryError> {
    match name.chars().next() {
        None => return Err(TelemetryError::metric(name, "instrument name is empty")),
        Some(first) if !first.is_ascii_alphabetic() => {
            return Err(TelemetryError::metric(
                name,
                "instrument name must start with a letter",
            ))
        }
        Some(_) => {}
    }

    if name.len() > MAX_INSTRUMENT_NAME_LEN {
        return Err(TelemetryError::metric(
            name,
            format!("instrument name exceeds {} characters", MAX_INSTRUMENT_NAME_LEN),
        ));
    }

    if let Some(invalid) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')))
    {
        return Err(TelemetryError::metric(
            name,
            format!("invalid character {:?} in instrument name", invalid),
        ));
    }

    Ok(())
}

/// Metrics delegate backed by an SDK meter provider
pub struct OtelMeter {
    provider: SdkMeterProvider,
    meter: Meter,
    exporting: bool,
}

impl OtelMeter {
    fn new(provider: SdkMeterProvider, exporting: bool) -> Self {
        let meter = provider.meter(INSTRUMENTATION_NAME);
        Self {
            provider,
            meter,
            exporting,
        }
    }

    /// Build the provider for `target`.
    ///
    /// Stdout and collector targets are read every flush interval; other
    /// targets have no reader, so recorded points are never exported.
    pub fn for_target(
        config: &ResolvedConfig,
        target: &TransportTarget,
    ) -> Result<Self, TelemetryError> {
        let builder = SdkMeterProvider::builder().with_resource(build_metric_resource(config));
        let interval = config.flush_interval();

        let meter = match target {
            TransportTarget::Null | TransportTarget::NoopExporter => {
                Self::new(builder.build(), false)
            }
            TransportTarget::Stdout(_) => {
                let reader =
                    PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                        .with_interval(interval)
                        .build();
                Self::new(builder.with_reader(reader).build(), true)
            }
            TransportTarget::Collector(endpoint) => {
                let exporter = build_metric_exporter(endpoint, config.timeout())?;
                let reader = PeriodicReader::builder(exporter)
                    .with_interval(interval)
                    .build();
                Self::new(builder.with_reader(reader).build(), true)
            }
        };

        debug!(target = ?target, "Meter provider built");
        Ok(meter)
    }
}

impl MetricPillar for OtelMeter {
    fn histogram(
        &self,
        name: &str,
        value: f64,
        attributes: &FieldSet,
    ) -> Result<(), TelemetryError> {
        validate_instrument_name(name)?;
        if !value.is_finite() {
            return Err(TelemetryError::metric(name, "histogram value must be finite"));
        }

        let histogram = self.meter.f64_histogram(name.to_string()).build();
        histogram.record(value, &attributes.to_key_values());
        Ok(())
    }

    fn counter(&self, name: &str, value: i64, attributes: &FieldSet) -> Result<(), TelemetryError> {
        validate_instrument_name(name)?;
        let increment = u64::try_from(value)
            .map_err(|_| TelemetryError::metric(name, "counter increment must be non-negative"))?;

        let counter = self.meter.u64_counter(name.to_string()).build();
        counter.add(increment, &attributes.to_key_values());
        Ok(())
    }

    fn gauge(&self, name: &str, value: i64, attributes: &FieldSet) -> Result<(), TelemetryError> {
        validate_instrument_name(name)?;

        let gauge = self.meter.i64_gauge(name.to_string()).build();
        gauge.record(value, &attributes.to_key_values());
        Ok(())
    }

    fn close(&self) -> Result<(), TelemetryError> {
        if !self.exporting {
            return Ok(());
        }
        self.provider
            .force_flush()
            .map_err(|e| TelemetryError::shutdown(Pillar::Metrics, e))?;
        self.provider
            .shutdown()
            .map_err(|e| TelemetryError::shutdown(Pillar::Metrics, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::config::{Mode, TelemetryConfig};
    use std::time::Duration;

    fn discard_meter() -> OtelMeter {
        let config = TelemetryConfig::new("svc", "1.0.0", Mode::Discard)
            .with_hostname("host")
            .resolve()
            .unwrap();
        OtelMeter::for_target(&config, &TransportTarget::Null).unwrap()
    }

    fn attrs() -> FieldSet {
        let mut set = FieldSet::new();
        set.insert("region", "eu");
        set
    }

    #[test]
    fn valid_names_are_accepted() {
        for name in ["requests", "http.server.duration", "queue_depth", "a/b-c", "x"] {
            assert!(validate_instrument_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn invalid_names_are_rejected() {
        let too_long = "a".repeat(MAX_INSTRUMENT_NAME_LEN + 1);
        for name in ["", "9lives", "_private", "has space", "semi;colon", too_long.as_str()] {
            assert!(
                matches!(
                    validate_instrument_name(name),
                    Err(TelemetryError::MetricRecord { .. })
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn records_on_a_discarding_meter() {
        let meter = discard_meter();

        assert!(meter.histogram("latency_ms", 12.5, &attrs()).is_ok());
        assert!(meter.counter("requests", 1, &attrs()).is_ok());
        assert!(meter.gauge("queue_depth", -3, &attrs()).is_ok());
        assert!(meter.close().is_ok());
    }

    #[test]
    fn negative_counter_is_rejected() {
        let meter = discard_meter();

        let err = meter.counter("requests", -1, &attrs()).unwrap_err();

        assert!(matches!(err, TelemetryError::MetricRecord { .. }));
    }

    #[test]
    fn non_finite_histogram_is_rejected() {
        let meter = discard_meter();

        assert!(meter.histogram("latency_ms", f64::NAN, &attrs()).is_err());
        assert!(meter.histogram("latency_ms", f64::INFINITY, &attrs()).is_err());
    }

    #[test]
    fn invalid_name_is_reported_by_every_instrument() {
        let meter = discard_meter();

        assert!(meter.histogram("1st", 1.0, &attrs()).is_err());
        assert!(meter.counter("1st", 1, &attrs()).is_err());
        assert!(meter.gauge("1st", 1, &attrs()).is_err());
    }

    #[test]
    fn stdout_meter_records_and_closes() {
        let config = TelemetryConfig::new("svc", "1.0.0", Mode::Local)
            .with_hostname("host")
            .with_flush_interval(Duration::from_secs(60))
            .resolve()
            .unwrap();
        let target = TransportTarget::Stdout(crate::telemetry::router::StdoutFormat::Pretty);
        let meter = OtelMeter::for_target(&config, &target).unwrap();

        assert!(meter.counter("orders.processed", 5, &attrs()).is_ok());
        assert!(meter.close().is_ok());
    }
}
