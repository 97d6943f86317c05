//! Attribute merging shared by the logging and metrics pillars.
//!
//! Every event is sent with an attribute set built from three sources, highest
//! precedence first:
//!
//! 1. fields passed at the call site,
//! 2. the process-wide default fields from the configuration,
//! 3. fixed resource and context attributes (`service.name`, `host.name`,
//!    `component`, ...).
//!
//! A call-site field may therefore shadow a resource attribute of the same
//! name; that override is intentional and not validated.

use std::backtrace::Backtrace;

use chrono::{DateTime, SecondsFormat, Utc};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::resource::{HOST_NAME, SERVICE_NAME, SERVICE_VERSION};
use sha2::{Digest, Sha256};

use crate::telemetry::config::{Fields, ResolvedConfig};
use crate::telemetry::log::LogEntry;

pub const COMPONENT: &str = "component";
pub const OPERATION: &str = "operation";
pub const TIMESTAMP: &str = "timestamp";
pub const ERROR: &str = "error";
pub const ERROR_KIND: &str = "error.kind";
pub const STACKTRACE: &str = "stacktrace";
pub const STACKTRACE_HASH: &str = "stacktrace.hash";
pub const DEPLOYMENT_STACK: &str = "deployment.stack";

/// Ordered key/value attributes with unique keys.
///
/// Re-inserting a key replaces its value but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    entries: Vec<(String, String)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn extend<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in fields {
            self.insert(key.as_str(), value.as_str());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn to_key_values(&self) -> Vec<KeyValue> {
        self.entries
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect()
    }
}

/// Resource attributes identifying the process
pub fn resource_fields(config: &ResolvedConfig) -> FieldSet {
    let mut set = FieldSet::new();
    set.insert(SERVICE_NAME, config.service_name());
    set.insert(SERVICE_VERSION, config.service_version());
    set.insert(HOST_NAME, config.hostname());
    set
}

/// Layer `defaults` and then `call` over `base`.
pub fn merge(call: &Fields, defaults: &Fields, base: FieldSet) -> FieldSet {
    let mut merged = base;
    merged.extend(defaults);
    merged.extend(call);
    merged
}

/// Attributes for one log record. `timestamp` is the time of the call.
pub fn merge_log_fields(
    entry: &LogEntry,
    config: &ResolvedConfig,
    timestamp: DateTime<Utc>,
) -> FieldSet {
    let mut base = resource_fields(config);
    base.insert(COMPONENT, entry.component.as_str());
    base.insert(OPERATION, entry.operation.as_str());
    base.insert(
        TIMESTAMP,
        timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
    );

    if let Some(error) = &entry.error {
        base.insert(ERROR, error.message.as_str());
        base.insert(ERROR_KIND, error.kind);
    }

    if let (Some(trace), Some(hash)) = (entry.stacktrace(), entry.stacktrace_hash()) {
        base.insert(STACKTRACE_HASH, hash);
        base.insert(STACKTRACE, trace);
    }

    merge(&entry.fields, config.default_fields(), base)
}

/// Attributes for one metric point, tagged with the deployment stack
pub fn merge_metric_fields(fields: &Fields, config: &ResolvedConfig) -> FieldSet {
    let mut base = resource_fields(config);
    base.insert(DEPLOYMENT_STACK, config.stack());
    merge(fields, config.default_fields(), base)
}

/// Capture the calling thread's stack trace regardless of `RUST_BACKTRACE`.
pub(crate) fn capture_stacktrace() -> String {
    Backtrace::force_capture().to_string()
}

/// Hex-encoded SHA-256 of a stack trace, so collectors can group identical traces.
pub fn stacktrace_digest(trace: &str) -> String {
    hex::encode(Sha256::digest(trace.as_bytes()))
}

/// Short type name of an error value, without module path or generics.
pub fn error_kind<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    let full = full.strip_prefix("dyn ").unwrap_or(full);
    let base = full.split(['<', ' ']).next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
