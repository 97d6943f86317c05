use std::fmt::{self, Write as _};
use std::str::FromStr;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::telemetry::client::Observability;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::INSTRUMENTATION_NAME;

/// Filter level used when `RUST_LOG` is unset
pub const DEFAULT_FILTER_LEVEL: &str = "info";

/// Output format of the application's own `tracing` diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable with colors
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::InvalidConfiguration(format!(
                "unknown log format: {other}"
            ))),
        }
    }
}

/// Bridge `tracing` spans into the facade's tracer provider
pub fn build_otel_layer<S>(
    provider: &SdkTracerProvider,
) -> OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let tracer = provider.tracer(INSTRUMENTATION_NAME);
    tracing_opentelemetry::layer().with_tracer(tracer)
}

/// JSON event format with `level` and `timestamp` at the root
struct RootLevelJsonFormat;

impl<S, N> FormatEvent<S, N> for RootLevelJsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "error",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG | tracing::Level::TRACE => "debug",
        };

        let mut object = Map::new();
        object.insert("level".to_string(), Value::from(level));
        object.insert(
            "timestamp".to_string(),
            Value::from(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        );
        object.insert(
            "target".to_string(),
            Value::from(event.metadata().target()),
        );

        if let Some(span) = ctx.lookup_current() {
            let mut span_object = Map::new();
            span_object.insert("name".to_string(), Value::from(span.name()));
            let ext = span.extensions();
            if let Some(fields) = ext.get::<FormattedFields<N>>() {
                if !fields.is_empty() {
                    span_object.insert("fields".to_string(), Value::from(fields.as_str()));
                }
            }
            object.insert("span".to_string(), Value::Object(span_object));
        }

        event.record(&mut JsonVisitor(&mut object));

        let line = serde_json::to_string(&object).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

/// Collects event fields into a JSON map
struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.0.insert(field.name().to_string(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::Bool(value));
    }
}

/// JSON fmt layer for collector-side ingestion
pub fn build_json_layer<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(RootLevelJsonFormat)
        .with_ansi(false)
        .with_writer(make_writer)
}

/// Pretty fmt layer for local development
pub fn build_pretty_layer<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .pretty()
        .with_ansi(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(make_writer)
}

/// `RUST_LOG` when set, `default_level` otherwise
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install a global `tracing` subscriber for the application's diagnostics.
///
/// Spans are bridged into the facade's tracer provider, which stays owned by
/// `obs`; no OpenTelemetry global is set. Without `RUST_LOG` the filter is
/// [`DEFAULT_FILTER_LEVEL`] whatever the mode. Fails if a global subscriber
/// already exists.
pub fn init_subscriber(obs: &Observability, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = build_filter(DEFAULT_FILTER_LEVEL);
    let otel_layer = obs.tracer_provider().map(|provider| build_otel_layer(provider));

    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);
    let result = match format {
        LogFormat::Pretty => registry.with(build_pretty_layer(std::io::stdout)).try_init(),
        LogFormat::Json => registry.with(build_json_layer(std::io::stdout)).try_init(),
    };

    result.map_err(|e| TelemetryError::Subscriber(e.to_string()))
}
