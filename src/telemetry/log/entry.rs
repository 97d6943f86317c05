use std::error::Error;

use chrono::{DateTime, Utc};
use opentelemetry::logs::Severity;

use crate::telemetry::config::{Fields, Mode, ResolvedConfig};
use crate::telemetry::fields::{
    capture_stacktrace, error_kind, merge_log_fields, stacktrace_digest, FieldSet,
};

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Returns the OpenTelemetry severity number
    pub fn severity(&self) -> Severity {
        match self {
            Self::Debug => Severity::Debug,
            Self::Info => Severity::Info,
            Self::Warn => Severity::Warn,
            Self::Error => Severity::Error,
            Self::Fatal => Severity::Fatal,
        }
    }

    /// Least severe level that is still written in `mode`
    pub fn threshold(mode: Mode) -> Self {
        match mode {
            Mode::ProductionCollector => Self::Info,
            _ => Self::Debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    pub kind: &'static str,
}

/// One logging call, before attribute merging.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub component: String,
    pub operation: String,
    pub message: String,
    pub error: Option<ErrorInfo>,
    pub fields: Fields,
    stacktrace: Option<String>,
    stacktrace_hash: Option<String>,
}

impl LogEntry {
    pub fn new(
        component: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
        fields: Fields,
    ) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            message: message.into(),
            error: None,
            fields,
            stacktrace: None,
            stacktrace_hash: None,
        }
    }

    /// Attach `err` and capture the caller's stack trace with its digest.
    pub fn with_error<E>(mut self, err: &E) -> Self
    where
        E: Error + ?Sized,
    {
        self.error = Some(ErrorInfo {
            message: err.to_string(),
            kind: error_kind::<E>(),
        });
        let trace = capture_stacktrace();
        self.stacktrace_hash = Some(stacktrace_digest(&trace));
        self.stacktrace = Some(trace);
        self
    }

    pub fn stacktrace(&self) -> Option<&str> {
        self.stacktrace.as_deref()
    }

    pub fn stacktrace_hash(&self) -> Option<&str> {
        self.stacktrace_hash.as_deref()
    }
}

/// A merged log record, ready for a sink.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub fields: FieldSet,
}

impl LogRecord {
    /// Merge `entry` with the configured attributes, stamping the current time.
    pub fn from_entry(level: Level, entry: LogEntry, config: &ResolvedConfig) -> Self {
        let timestamp = Utc::now();
        let fields = merge_log_fields(&entry, config, timestamp);
        Self {
            level,
            message: entry.message,
            timestamp,
            fields,
        }
    }
}
