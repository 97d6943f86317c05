use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::telemetry::config::Fields;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::fields::FieldSet;
use crate::telemetry::log::LogRecord;
use crate::telemetry::trace::{key_values, SpanHandle};

/// Logging capability: accepts merged records, fire-and-forget.
pub trait LogPillar: Send + Sync {
    /// Submit a record. Never blocks and never reports failure.
    fn log(&self, record: LogRecord);

    /// Flush pending records and release the sink
    fn close(&self) -> Result<(), TelemetryError>;
}

/// Tracing capability. Span operations never fail.
pub trait TracePillar: Send + Sync {
    /// Start a child of the span carried by `parent`
    fn start_span(&self, parent: &Context, name: &str) -> (Context, SpanHandle);

    /// Record an event on the span carried by `cx`
    fn add_event(&self, cx: &Context, name: &str, attributes: &Fields) {
        cx.span().add_event(name.to_string(), key_values(attributes));
    }

    /// Set attributes on the span carried by `cx`
    fn set_attributes(&self, cx: &Context, attributes: &Fields) {
        cx.span().set_attributes(key_values(attributes));
    }

    /// Flush finished spans and shut the provider down
    fn close(&self) -> Result<(), TelemetryError>;

    /// SDK provider backing this tracer, for bridging `tracing` spans
    fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        None
    }
}

/// Metrics capability. Attributes arrive already merged.
pub trait MetricPillar: Send + Sync {
    fn histogram(&self, name: &str, value: f64, attributes: &FieldSet)
        -> Result<(), TelemetryError>;

    fn counter(&self, name: &str, value: i64, attributes: &FieldSet) -> Result<(), TelemetryError>;

    fn gauge(&self, name: &str, value: i64, attributes: &FieldSet) -> Result<(), TelemetryError>;

    /// Export pending points and shut the provider down
    fn close(&self) -> Result<(), TelemetryError> {
        Ok(())
    }
}
