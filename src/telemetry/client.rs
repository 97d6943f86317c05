use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::Context;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::{debug, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

use crate::telemetry::api::{LogPillar, MetricPillar, TracePillar};
use crate::telemetry::config::{Fields, ResolvedConfig, TelemetryConfig};
use crate::telemetry::error::TelemetryError;
use crate::telemetry::fields::merge_metric_fields;
use crate::telemetry::log::{Level, LogEntry, LogRecord, QueuedLogger};
use crate::telemetry::metrics::OtelMeter;
use crate::telemetry::router::{target_for, Pillar};
use crate::telemetry::trace::{OtelTracer, SpanHandle};

/// Single entry point for logs, spans and metrics of one service.
///
/// Owns one delegate per pillar, chosen by the configured mode. Nothing is
/// registered globally: pass the facade to the code that needs it.
pub struct Observability {
    config: Arc<ResolvedConfig>,
    threshold: Level,
    logger: Box<dyn LogPillar>,
    tracer: Box<dyn TracePillar>,
    meter: Box<dyn MetricPillar>,
    closed: AtomicBool,
}

impl Observability {
    /// Resolve `config` and build every pillar, logging JSON lines to stdout
    /// in `Local` mode.
    ///
    /// Collector modes build tonic exporters; outside a Tokio runtime they fail
    /// with [`TelemetryError::ExporterInit`].
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        Self::builder(config).build()
    }

    pub fn builder(config: TelemetryConfig) -> ObservabilityBuilder {
        ObservabilityBuilder {
            config,
            log_writer: None,
        }
    }

    /// Assemble a facade from already built delegates
    pub fn from_parts(
        config: ResolvedConfig,
        logger: Box<dyn LogPillar>,
        tracer: Box<dyn TracePillar>,
        meter: Box<dyn MetricPillar>,
    ) -> Self {
        Self {
            threshold: Level::threshold(config.mode()),
            config: Arc::new(config),
            logger,
            tracer,
            meter,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// SDK tracer provider behind the tracing pillar, if any
    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.tracer.tracer_provider()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn submit(&self, level: Level, entry: LogEntry) {
        if level < self.threshold {
            return;
        }
        self.logger
            .log(LogRecord::from_entry(level, entry, &self.config));
    }

    pub fn debug(&self, component: &str, operation: &str, message: &str, fields: Fields) {
        self.submit(
            Level::Debug,
            LogEntry::new(component, operation, message, fields),
        );
    }

    pub fn info(&self, component: &str, operation: &str, message: &str, fields: Fields) {
        self.submit(
            Level::Info,
            LogEntry::new(component, operation, message, fields),
        );
    }

    /// Log at warn severity with `err` and the caller's stack trace attached
    pub fn warn<E>(&self, component: &str, operation: &str, message: &str, err: &E, fields: Fields)
    where
        E: Error + ?Sized,
    {
        self.submit(
            Level::Warn,
            LogEntry::new(component, operation, message, fields).with_error(err),
        );
    }

    pub fn error<E>(&self, component: &str, operation: &str, message: &str, err: &E, fields: Fields)
    where
        E: Error + ?Sized,
    {
        self.submit(
            Level::Error,
            LogEntry::new(component, operation, message, fields).with_error(err),
        );
    }

    /// Log at fatal severity. The process keeps running.
    pub fn fatal<E>(&self, component: &str, operation: &str, message: &str, err: &E, fields: Fields)
    where
        E: Error + ?Sized,
    {
        self.submit(
            Level::Fatal,
            LogEntry::new(component, operation, message, fields).with_error(err),
        );
    }

    /// Start a span named `name` as a child of the span carried by `parent`.
    ///
    /// Returns the context carrying the new span, for starting children, and
    /// the handle that ends it.
    pub fn start_span(&self, parent: &Context, name: &str) -> (Context, SpanHandle) {
        self.tracer.start_span(parent, name)
    }

    pub fn add_event(&self, cx: &Context, name: &str, attributes: &Fields) {
        self.tracer.add_event(cx, name, attributes);
    }

    pub fn set_attributes(&self, cx: &Context, attributes: &Fields) {
        self.tracer.set_attributes(cx, attributes);
    }

    pub fn histogram(&self, name: &str, value: f64, fields: &Fields) -> Result<(), TelemetryError> {
        self.meter
            .histogram(name, value, &merge_metric_fields(fields, &self.config))
    }

    pub fn counter(&self, name: &str, value: i64, fields: &Fields) -> Result<(), TelemetryError> {
        self.meter
            .counter(name, value, &merge_metric_fields(fields, &self.config))
    }

    pub fn gauge(&self, name: &str, value: i64, fields: &Fields) -> Result<(), TelemetryError> {
        self.meter
            .gauge(name, value, &merge_metric_fields(fields, &self.config))
    }

    /// Close logging, then tracing, then metrics.
    ///
    /// Stops at the first failure; delegates not reached are released when the
    /// facade is dropped. Only the first call does any work.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.logger.close()?;
        self.tracer.close()?;
        self.meter.close()?;

        info!(service = %self.config.service_name(), "Telemetry shut down");
        Ok(())
    }
}

impl Drop for Observability {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!(error = %e, "Error shutting telemetry down on drop");
        }
    }
}

/// Builder for [`Observability`]
pub struct ObservabilityBuilder {
    config: TelemetryConfig,
    log_writer: Option<BoxMakeWriter>,
}

impl ObservabilityBuilder {
    /// Writer for JSON log lines in `Local` mode (defaults to stdout)
    pub fn log_writer<W>(mut self, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.log_writer = Some(BoxMakeWriter::new(writer));
        self
    }

    pub fn build(self) -> Result<Observability, TelemetryError> {
        let config = self.config.resolve()?;
        let mode = config.mode();
        let port = config.port();

        let writer = self
            .log_writer
            .unwrap_or_else(|| BoxMakeWriter::new(std::io::stdout));
        let logger =
            QueuedLogger::for_target(&config, &target_for(Pillar::Logging, mode, port), writer)?;
        let tracer = OtelTracer::for_target(&config, &target_for(Pillar::Tracing, mode, port))?;
        let meter = OtelMeter::for_target(&config, &target_for(Pillar::Metrics, mode, port))?;

        info!(
            service = %config.service_name(),
            version = %config.service_version(),
            mode = %mode,
            "Telemetry initialized"
        );

        Ok(Observability::from_parts(
            config,
            Box::new(logger),
            Box::new(tracer),
            Box::new(meter),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::config::Mode;
    use crate::telemetry::fields::{FieldSet, STACKTRACE_HASH};
    use crate::telemetry::log::sink::tests::BufferWriter;
    use std::fmt;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<&'static str>>>;

    #[derive(Debug)]
    struct PaymentError;

    impl fmt::Display for PaymentError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("card declined")
        }
    }

    impl Error for PaymentError {}

    struct RecordingLogger {
        records: Arc<Mutex<Vec<LogRecord>>>,
        journal: Journal,
        fail: bool,
    }

    impl LogPillar for RecordingLogger {
        fn log(&self, record: LogRecord) {
            self.records.lock().unwrap().push(record);
        }

        fn close(&self) -> Result<(), TelemetryError> {
            self.journal.lock().unwrap().push("log");
            if self.fail {
                return Err(TelemetryError::shutdown(Pillar::Logging, "sink gone"));
            }
            Ok(())
        }
    }

    struct RecordingTracer {
        journal: Journal,
    }

    impl TracePillar for RecordingTracer {
        fn start_span(&self, parent: &Context, _name: &str) -> (Context, SpanHandle) {
            (parent.clone(), SpanHandle::new(parent.clone()))
        }

        fn close(&self) -> Result<(), TelemetryError> {
            self.journal.lock().unwrap().push("trace");
            Ok(())
        }
    }

    struct RecordingMeter {
        points: Arc<Mutex<Vec<(String, FieldSet)>>>,
        journal: Journal,
    }

    impl MetricPillar for RecordingMeter {
        fn histogram(
            &self,
            name: &str,
            _value: f64,
            attributes: &FieldSet,
        ) -> Result<(), TelemetryError> {
            self.points
                .lock()
                .unwrap()
                .push((name.to_string(), attributes.clone()));
            Ok(())
        }

        fn counter(&self, name: &str, _value: i64, attributes: &FieldSet) -> Result<(), TelemetryError> {
            self.points
                .lock()
                .unwrap()
                .push((name.to_string(), attributes.clone()));
            Ok(())
        }

        fn gauge(&self, name: &str, _value: i64, attributes: &FieldSet) -> Result<(), TelemetryError> {
            self.points
                .lock()
                .unwrap()
                .push((name.to_string(), attributes.clone()));
            Ok(())
        }

        fn close(&self) -> Result<(), TelemetryError> {
            self.journal.lock().unwrap().push("metrics");
            Ok(())
        }
    }

    struct Harness {
        obs: Observability,
        records: Arc<Mutex<Vec<LogRecord>>>,
        points: Arc<Mutex<Vec<(String, FieldSet)>>>,
        journal: Journal,
    }

    fn harness(mode: Mode, failing_logger: bool) -> Harness {
        let config = TelemetryConfig::new("svc", "1.0.0", mode)
            .with_hostname("host")
            .with_default_field("team", "payments")
            .resolve()
            .unwrap();
        let records = Arc::new(Mutex::new(Vec::new()));
        let points = Arc::new(Mutex::new(Vec::new()));
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));

        let obs = Observability::from_parts(
            config,
            Box::new(RecordingLogger {
                records: Arc::clone(&records),
                journal: Arc::clone(&journal),
                fail: failing_logger,
            }),
            Box::new(RecordingTracer {
                journal: Arc::clone(&journal),
            }),
            Box::new(RecordingMeter {
                points: Arc::clone(&points),
                journal: Arc::clone(&journal),
            }),
        );

        Harness {
            obs,
            records,
            points,
            journal,
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn shutdown_closes_pillars_in_order() {
        let h = harness(Mode::Local, false);

        assert!(h.obs.shutdown().is_ok());

        assert_eq!(*h.journal.lock().unwrap(), vec!["log", "trace", "metrics"]);
        assert!(h.obs.is_shut_down());
    }

    #[test]
    fn failing_logger_stops_shutdown_before_tracing() {
        let h = harness(Mode::Local, true);

        let result = h.obs.shutdown();

        assert!(matches!(
            result,
            Err(TelemetryError::Shutdown {
                pillar: Pillar::Logging,
                ..
            })
        ));
        assert_eq!(*h.journal.lock().unwrap(), vec!["log"]);
    }

    #[test]
    fn second_shutdown_is_a_no_op() {
        let h = harness(Mode::Local, true);

        assert!(h.obs.shutdown().is_err());
        assert!(h.obs.shutdown().is_ok());
        assert_eq!(h.journal.lock().unwrap().len(), 1);
    }

    #[test]
    fn info_record_is_merged_before_submission() {
        let h = harness(Mode::Local, false);

        h.obs.info("checkout", "charge", "hello", fields(&[("k", "v")]));

        let records = h.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Level::Info);
        assert_eq!(record.message, "hello");
        assert_eq!(record.fields.get("component"), Some("checkout"));
        assert_eq!(record.fields.get("team"), Some("payments"));
        assert_eq!(record.fields.get("k"), Some("v"));
        assert!(!record.fields.contains_key(STACKTRACE_HASH));
    }

    #[test]
    fn error_levels_attach_stacktrace_digest() {
        let h = harness(Mode::Local, false);

        h.obs.warn("c", "o", "w", &PaymentError, Fields::new());
        h.obs.error("c", "o", "e", &PaymentError, Fields::new());
        h.obs.fatal("c", "o", "f", &PaymentError, Fields::new());

        let records = h.records.lock().unwrap();
        let levels: Vec<_> = records.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![Level::Warn, Level::Error, Level::Fatal]);
        for record in records.iter() {
            let hash = record.fields.get(STACKTRACE_HASH).unwrap();
            assert_eq!(hash.len(), 64);
            assert_eq!(record.fields.get("error.kind"), Some("PaymentError"));
        }
    }

    #[test]
    fn boxed_errors_are_accepted() {
        let h = harness(Mode::Local, false);
        let err: Box<dyn Error + Send + Sync> = Box::new(PaymentError);

        h.obs.error("c", "o", "boxed", err.as_ref(), Fields::new());

        assert_eq!(h.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn production_drops_debug_records() {
        let h = harness(Mode::ProductionCollector, false);

        h.obs.debug("c", "o", "noise", Fields::new());
        h.obs.info("c", "o", "kept", Fields::new());

        let records = h.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }

    #[test]
    fn metric_fields_are_merged() {
        let h = harness(Mode::Local, false);

        h.obs
            .counter("orders", 1, &fields(&[("service.name", "override")]))
            .unwrap();

        let points = h.points.lock().unwrap();
        let (name, attrs) = &points[0];
        assert_eq!(name, "orders");
        assert_eq!(attrs.get("service.name"), Some("override"));
        assert_eq!(attrs.get("team"), Some("payments"));
    }

    #[test]
    fn local_builder_writes_json_lines_to_injected_writer() {
        let buffer = BufferWriter::default();
        let config = TelemetryConfig::new("svc", "1.0.0", Mode::Local).with_hostname("host");
        let obs = Observability::builder(config)
            .log_writer(buffer.clone())
            .build()
            .unwrap();

        obs.info("comp", "op", "hello", fields(&[("k", "v")]));
        obs.shutdown().unwrap();

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "hello");
        assert_eq!(lines[0]["service.name"], "svc");
        assert_eq!(lines[0]["k"], "v");
    }

    #[test]
    fn invalid_mode_name_fails_construction() {
        let config = TelemetryConfig::new("svc", "1.0.0", Mode::Local).with_mode_name("staging");

        let result = Observability::new(config);

        assert!(matches!(result, Err(TelemetryError::InvalidMode(_))));
    }

    #[test]
    fn collector_mode_without_runtime_is_an_init_error() {
        for mode in [
            Mode::DebugCollector,
            Mode::DevelopmentCollector,
            Mode::ProductionCollector,
        ] {
            let config = TelemetryConfig::new("svc", "1.0.0", mode).with_hostname("host");

            let result = Observability::new(config);

            assert!(
                matches!(result, Err(TelemetryError::ExporterInit { .. })),
                "{mode}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn collector_mode_builds_within_runtime() {
        let config = TelemetryConfig::new("svc", "1.0.0", Mode::DebugCollector)
            .with_hostname("host")
            .with_timeout(std::time::Duration::from_secs(1));

        let obs = Observability::new(config).unwrap();

        assert!(obs.tracer_provider().is_some());
        assert_eq!(obs.config().mode(), Mode::DebugCollector);
    }
}
