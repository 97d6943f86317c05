use std::io::{self, Write};

use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, LoggerProvider as _};
use opentelemetry_sdk::logs::{BatchConfigBuilder, BatchLogProcessor, SdkLoggerProvider};
use serde_json::{Map, Value};
use tracing_subscriber::fmt::MakeWriter;

use crate::telemetry::config::ResolvedConfig;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::exporter::build_log_exporter;
use crate::telemetry::log::LogRecord;
use crate::telemetry::resource::build_resource;
use crate::telemetry::router::{CollectorEndpoint, Pillar};
use crate::telemetry::INSTRUMENTATION_NAME;

/// Destination for merged log records, driven by the writer thread.
pub trait RecordSink: Send + 'static {
    fn write(&mut self, record: &LogRecord) -> io::Result<()>;

    /// Flush and release the sink. Called once, after the last write.
    fn close(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Drops every record
pub struct NullSink;

impl RecordSink for NullSink {
    fn write(&mut self, _record: &LogRecord) -> io::Result<()> {
        Ok(())
    }
}

/// Writes each record as one JSON line
pub struct JsonSink<W> {
    make_writer: W,
}

impl<W> JsonSink<W>
where
    W: for<'a> MakeWriter<'a> + Send + 'static,
{
    pub fn new(make_writer: W) -> Self {
        Self { make_writer }
    }
}

/// One JSON object holding the merged fields plus `level` and `message`.
///
/// The record's own `level` and `message` win over merged fields of the same
/// name. Keys are written in sorted order.
pub fn to_json_line(record: &LogRecord) -> io::Result<Vec<u8>> {
    let mut object = Map::new();
    for (key, value) in record.fields.iter() {
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
    object.insert(
        "level".to_string(),
        Value::String(record.level.as_str().to_string()),
    );
    object.insert("message".to_string(), Value::String(record.message.clone()));

    let mut line = serde_json::to_vec(&object).map_err(io::Error::other)?;
    line.push(b'\n');
    Ok(line)
}

impl<W> RecordSink for JsonSink<W>
where
    W: for<'a> MakeWriter<'a> + Send + 'static,
{
    fn write(&mut self, record: &LogRecord) -> io::Result<()> {
        let line = to_json_line(record)?;
        let mut writer = self.make_writer.make_writer();
        writer.write_all(&line)?;
        writer.flush()
    }
}

/// Emits records through an OpenTelemetry logger provider
pub struct OtlpLogSink {
    provider: SdkLoggerProvider,
}

impl OtlpLogSink {
    pub fn new(provider: SdkLoggerProvider) -> Self {
        Self { provider }
    }

    /// Build a sink exporting to `endpoint` in batches
    pub fn connect(
        config: &ResolvedConfig,
        endpoint: &CollectorEndpoint,
    ) -> Result<Self, TelemetryError> {
        let exporter = build_log_exporter(endpoint, config.timeout())?;

        let batch_config = BatchConfigBuilder::default()
            .with_scheduled_delay(config.flush_interval())
            .build();
        let processor = BatchLogProcessor::builder(exporter)
            .with_batch_config(batch_config)
            .build();

        let provider = SdkLoggerProvider::builder()
            .with_log_processor(processor)
            .with_resource(build_resource(config))
            .build();

        Ok(Self::new(provider))
    }
}

impl RecordSink for OtlpLogSink {
    fn write(&mut self, record: &LogRecord) -> io::Result<()> {
        let logger = self.provider.logger(INSTRUMENTATION_NAME);
        let mut log_record = logger.create_log_record();

        log_record.set_timestamp(record.timestamp.into());
        log_record.set_severity_number(record.level.severity());
        log_record.set_severity_text(record.level.as_str());
        log_record.set_body(AnyValue::from(record.message.clone()));
        for (key, value) in record.fields.iter() {
            log_record.add_attribute(key.to_string(), value.to_string());
        }

        logger.emit(log_record);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TelemetryError> {
        self.provider
            .force_flush()
            .map_err(|e| TelemetryError::shutdown(Pillar::Logging, e))?;
        self.provider
            .shutdown()
            .map_err(|e| TelemetryError::shutdown(Pillar::Logging, e))
    }
}
