use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use opentelemetry::Context;
use telemetry_facade::telemetry::api::{LogPillar, MetricPillar, TracePillar};
use telemetry_facade::telemetry::fields::FieldSet;
use telemetry_facade::telemetry::log::LogRecord;
use telemetry_facade::telemetry::router::Pillar;
use telemetry_facade::{Fields, Mode, Observability, SpanHandle, TelemetryConfig, TelemetryError};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn lines(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Debug)]
struct InventoryError;

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("out of stock")
    }
}

impl Error for InventoryError {}

fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn facade(mode: Mode, capture: &Capture) -> Observability {
    let config = TelemetryConfig::new("svc", "1.0.0", mode).with_hostname("test-host");
    Observability::builder(config)
        .log_writer(capture.clone())
        .build()
        .unwrap()
}

#[test]
fn local_info_writes_one_json_line() {
    let capture = Capture::default();
    let obs = facade(Mode::Local, &capture);

    obs.info("comp", "op", "hello", fields(&[("k", "v")]));
    obs.shutdown().unwrap();

    let lines = capture.lines();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["level"], "info");
    assert_eq!(line["service.name"], "svc");
    assert_eq!(line["component"], "comp");
    assert_eq!(line["operation"], "op");
    assert_eq!(line["message"], "hello");
    assert_eq!(line["k"], "v");
    assert_eq!(line["host.name"], "test-host");
    assert!(line.get("stacktrace.hash").is_none());
}

#[test]
fn local_error_line_carries_stacktrace_digest() {
    let capture = Capture::default();
    let obs = facade(Mode::Local, &capture);

    obs.error("stock", "reserve", "reservation failed", &InventoryError, Fields::new());
    obs.shutdown().unwrap();

    let lines = capture.lines();
    let line = &lines[0];
    assert_eq!(line["level"], "error");
    assert_eq!(line["error"], "out of stock");
    assert_eq!(line["error.kind"], "InventoryError");
    let hash = line["stacktrace.hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!line["stacktrace"].as_str().unwrap().is_empty());
}

#[test]
fn call_fields_override_resource_fields() {
    let capture = Capture::default();
    let obs = facade(Mode::Local, &capture);

    obs.info("comp", "op", "hello", fields(&[("service.name", "X")]));
    obs.shutdown().unwrap();

    assert_eq!(capture.lines()[0]["service.name"], "X");
}

#[test]
fn call_fields_do_not_replace_the_log_body() {
    let capture = Capture::default();
    let obs = facade(Mode::Local, &capture);

    obs.info("c", "o", "hello", fields(&[("message", "X"), ("level", "L")]));
    obs.shutdown().unwrap();

    let line = &capture.lines()[0];
    assert_eq!(line["message"], "hello");
    assert_eq!(line["level"], "info");
}

#[test]
fn collector_mode_outside_a_runtime_is_an_init_error() {
    let config = TelemetryConfig::new("svc", "1.0.0", Mode::DebugCollector).with_hostname("h");

    let result = Observability::new(config);

    assert!(matches!(result, Err(TelemetryError::ExporterInit { .. })));
}

#[test]
fn discard_mode_is_silent() {
    let capture = Capture::default();
    let obs = facade(Mode::Discard, &capture);
    let attrs = fields(&[("k", "v")]);

    for i in 0..1000 {
        obs.info("comp", "op", "hello", attrs.clone());
        obs.counter("requests", 1, &attrs).unwrap();
        obs.histogram("latency_ms", f64::from(i), &attrs).unwrap();
    }
    obs.shutdown().unwrap();

    assert!(capture.is_empty());
}

#[test]
fn span_can_be_ended_twice() {
    let capture = Capture::default();
    let obs = facade(Mode::Local, &capture);

    let (cx, span) = obs.start_span(&Context::new(), "work");
    obs.add_event(&cx, "step", &fields(&[("n", "1")]));
    obs.set_attributes(&cx, &fields(&[("k", "v")]));
    span.end();
    span.end();

    assert!(span.is_ended());
    assert!(obs.shutdown().is_ok());
}

#[test]
fn invalid_metric_is_reported_to_the_caller() {
    let capture = Capture::default();
    let obs = facade(Mode::Local, &capture);

    let result = obs.counter("requests", -5, &Fields::new());

    assert!(matches!(result, Err(TelemetryError::MetricRecord { .. })));
    obs.shutdown().unwrap();
}

type Journal = Arc<Mutex<Vec<Pillar>>>;

struct BrokenLogger(Journal);

impl LogPillar for BrokenLogger {
    fn log(&self, _record: LogRecord) {}

    fn close(&self) -> Result<(), TelemetryError> {
        self.0.lock().unwrap().push(Pillar::Logging);
        Err(TelemetryError::Shutdown {
            pillar: Pillar::Logging,
            message: "sink unavailable".to_string(),
        })
    }
}

struct JournalTracer(Journal);

impl TracePillar for JournalTracer {
    fn start_span(&self, parent: &Context, _name: &str) -> (Context, SpanHandle) {
        (parent.clone(), SpanHandle::new(parent.clone()))
    }

    fn close(&self) -> Result<(), TelemetryError> {
        self.0.lock().unwrap().push(Pillar::Tracing);
        Ok(())
    }
}

struct JournalMeter(Journal);

impl MetricPillar for JournalMeter {
    fn histogram(&self, _: &str, _: f64, _: &FieldSet) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn counter(&self, _: &str, _: i64, _: &FieldSet) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn gauge(&self, _: &str, _: i64, _: &FieldSet) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn close(&self) -> Result<(), TelemetryError> {
        self.0.lock().unwrap().push(Pillar::Metrics);
        Ok(())
    }
}

#[test]
fn failing_logging_close_aborts_shutdown_and_second_call_is_a_no_op() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let config = TelemetryConfig::new("svc", "1.0.0", Mode::Local)
        .with_hostname("test-host")
        .resolve()
        .unwrap();
    let obs = Observability::from_parts(
        config,
        Box::new(BrokenLogger(Arc::clone(&journal))),
        Box::new(JournalTracer(Arc::clone(&journal))),
        Box::new(JournalMeter(Arc::clone(&journal))),
    );

    let first = obs.shutdown();
    let second = obs.shutdown();

    assert!(matches!(
        first,
        Err(TelemetryError::Shutdown {
            pillar: Pillar::Logging,
            ..
        })
    ));
    assert!(second.is_ok());
    assert_eq!(*journal.lock().unwrap(), vec![Pillar::Logging]);
}

#[test]
fn missing_identity_is_rejected() {
    let result = Observability::new(TelemetryConfig::new("", "1.0.0", Mode::Discard));

    assert!(matches!(
        result,
        Err(TelemetryError::InvalidConfiguration(_))
    ));
}
