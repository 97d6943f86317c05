use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::error::TelemetryError;

/// String fields attached to log entries and metric points.
pub type Fields = BTreeMap<String, String>;

/// Collector flush interval used when none is configured
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Exporter timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Production collector port used when none is configured
pub const DEFAULT_PORT: &str = "80";

/// Capacity of the logging queue used when none is configured
pub const DEFAULT_LOG_QUEUE_CAPACITY: usize = 1024;

/// Deployment stack reported on metric points when none is configured
pub const DEFAULT_STACK: &str = "-";

/// Deployment mode, selecting the transport used by each pillar.
///
/// - `Discard`: everything is dropped. Useful for tests and benchmarks.
/// - `Local`: logs as JSON lines and metrics pretty-printed on stdout.
/// - `DebugCollector`: everything goes to a collector on localhost.
/// - `DevelopmentCollector`: everything goes to the development collector.
/// - `ProductionCollector`: everything goes to the production collector on the
///   configured port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Discard,
    Local,
    #[serde(rename = "debug")]
    DebugCollector,
    #[serde(rename = "development")]
    DevelopmentCollector,
    #[serde(rename = "production")]
    ProductionCollector,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Discard,
        Mode::Local,
        Mode::DebugCollector,
        Mode::DevelopmentCollector,
        Mode::ProductionCollector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discard => "discard",
            Self::Local => "local",
            Self::DebugCollector => "debug",
            Self::DevelopmentCollector => "development",
            Self::ProductionCollector => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" | "noop" => Ok(Self::Discard),
            "local" => Ok(Self::Local),
            "debug" => Ok(Self::DebugCollector),
            "development" | "dev" => Ok(Self::DevelopmentCollector),
            "production" | "prod" => Ok(Self::ProductionCollector),
            _ => Err(TelemetryError::InvalidMode(s.to_string())),
        }
    }
}

/// Mode as supplied by the caller. Names are only checked at resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ModeSelection {
    Known(Mode),
    Named(String),
}

impl ModeSelection {
    fn resolve(&self) -> Result<Mode, TelemetryError> {
        match self {
            Self::Known(mode) => Ok(*mode),
            Self::Named(name) => name.parse(),
        }
    }
}

/// Raw telemetry configuration, as supplied by the application.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    mode: ModeSelection,
    pub search_index: Option<String>,
    pub flush_interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub port: Option<String>,
    pub default_fields: Option<Fields>,
    pub hostname: Option<String>,
    pub log_queue_capacity: Option<usize>,
    pub stack: Option<String>,
}

impl TelemetryConfig {
    /// Create a new config with explicit identity and mode
    pub fn new(
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        mode: Mode,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            mode: ModeSelection::Known(mode),
            search_index: None,
            flush_interval: None,
            timeout: None,
            port: None,
            default_fields: None,
            hostname: None,
            log_queue_capacity: None,
            stack: None,
        }
    }

    /// Create config from environment variables
    /// - OTEL_SERVICE_NAME / OTEL_SERVICE_VERSION for the identity
    /// - TELEMETRY_MODE for the mode name (defaults to `local`)
    /// - TELEMETRY_SEARCH_INDEX, TELEMETRY_FLUSH_INTERVAL_SECS,
    ///   TELEMETRY_TIMEOUT_SECS, TELEMETRY_COLLECTOR_PORT, TELEMETRY_STACK for the
    ///   optional fields
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let seconds = |key: &str| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        Self {
            service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            service_version: lookup("OTEL_SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            mode: lookup("TELEMETRY_MODE")
                .map(ModeSelection::Named)
                .unwrap_or(ModeSelection::Known(Mode::Local)),
            search_index: lookup("TELEMETRY_SEARCH_INDEX"),
            flush_interval: seconds("TELEMETRY_FLUSH_INTERVAL_SECS"),
            timeout: seconds("TELEMETRY_TIMEOUT_SECS"),
            port: lookup("TELEMETRY_COLLECTOR_PORT"),
            default_fields: None,
            hostname: None,
            log_queue_capacity: None,
            stack: lookup("TELEMETRY_STACK"),
        }
    }

    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = ModeSelection::Known(mode);
        self
    }

    /// Select the mode by name; unknown names fail at resolution
    pub fn with_mode_name(mut self, name: impl Into<String>) -> Self {
        self.mode = ModeSelection::Named(name.into());
        self
    }

    pub fn with_search_index(mut self, index: impl Into<String>) -> Self {
        self.search_index = Some(index.into());
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_default_fields(mut self, fields: Fields) -> Self {
        self.default_fields = Some(fields);
        self
    }

    pub fn with_default_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_fields
            .get_or_insert_with(Fields::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_log_queue_capacity(mut self, capacity: usize) -> Self {
        self.log_queue_capacity = Some(capacity);
        self
    }

    /// Deployment stack attached to every metric point
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Validate the configuration and fill in defaults
    pub fn resolve(self) -> Result<ResolvedConfig, TelemetryError> {
        resolve(self)
    }
}

#[derive(Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    service_version: Option<String>,
    mode: Option<ModeSelection>,
    search_index: Option<String>,
    flush_interval: Option<Duration>,
    timeout: Option<Duration>,
    port: Option<String>,
    default_fields: Option<Fields>,
    stack: Option<String>,
}

impl TelemetryConfigBuilder {
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(ModeSelection::Known(mode));
        self
    }

    pub fn mode_name(mut self, name: impl Into<String>) -> Self {
        self.mode = Some(ModeSelection::Named(name.into()));
        self
    }

    pub fn search_index(mut self, index: impl Into<String>) -> Self {
        self.search_index = Some(index.into());
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn default_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_fields
            .get_or_insert_with(Fields::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Missing identity fields are left empty and rejected by `resolve`.
    pub fn build(self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.service_name.unwrap_or_default(),
            service_version: self.service_version.unwrap_or_default(),
            mode: self.mode.unwrap_or(ModeSelection::Known(Mode::Local)),
            search_index: self.search_index,
            flush_interval: self.flush_interval,
            timeout: self.timeout,
            port: self.port,
            default_fields: self.default_fields,
            hostname: None,
            log_queue_capacity: None,
            stack: self.stack,
        }
    }
}

/// Validated configuration with every optional field populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    service_name: String,
    service_version: String,
    mode: Mode,
    search_index: String,
    flush_interval: Duration,
    timeout: Duration,
    port: String,
    default_fields: Fields,
    hostname: String,
    log_queue_capacity: usize,
    stack: String,
}

impl ResolvedConfig {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn search_index(&self) -> &str {
        &self.search_index
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn default_fields(&self) -> &Fields {
        &self.default_fields
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn log_queue_capacity(&self) -> usize {
        self.log_queue_capacity
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }
}

impl From<ResolvedConfig> for TelemetryConfig {
    fn from(resolved: ResolvedConfig) -> Self {
        Self {
            service_name: resolved.service_name,
            service_version: resolved.service_version,
            mode: ModeSelection::Known(resolved.mode),
            search_index: Some(resolved.search_index),
            flush_interval: Some(resolved.flush_interval),
            timeout: Some(resolved.timeout),
            port: Some(resolved.port),
            default_fields: Some(resolved.default_fields),
            hostname: Some(resolved.hostname),
            log_queue_capacity: Some(resolved.log_queue_capacity),
            stack: Some(resolved.stack),
        }
    }
}

/// Validate `config`, apply defaults and resolve the local hostname.
pub fn resolve(config: TelemetryConfig) -> Result<ResolvedConfig, TelemetryError> {
    resolve_with(config, hostname::get)
}

pub(crate) fn resolve_with<F>(
    config: TelemetryConfig,
    lookup_hostname: F,
) -> Result<ResolvedConfig, TelemetryError>
where
    F: FnOnce() -> io::Result<OsString>,
{
    if config.service_name.trim().is_empty() || config.service_version.trim().is_empty() {
        return Err(TelemetryError::InvalidConfiguration(
            "service name and version are required".to_string(),
        ));
    }

    let mode = config.mode.resolve()?;

    let log_queue_capacity = config
        .log_queue_capacity
        .unwrap_or(DEFAULT_LOG_QUEUE_CAPACITY);
    if log_queue_capacity == 0 {
        return Err(TelemetryError::InvalidConfiguration(
            "log queue capacity must be positive".to_string(),
        ));
    }

    let hostname = match config.hostname.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => lookup_hostname()
            .map_err(|e| TelemetryError::HostnameResolution(e.to_string()))?
            .into_string()
            .map_err(|raw| {
                TelemetryError::HostnameResolution(format!("hostname is not UTF-8: {:?}", raw))
            })?,
    };

    let search_index = config
        .search_index
        .filter(|index| !index.is_empty())
        .unwrap_or_else(|| config.service_name.clone());

    Ok(ResolvedConfig {
        service_name: config.service_name,
        service_version: config.service_version,
        mode,
        search_index,
        flush_interval: config
            .flush_interval
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_FLUSH_INTERVAL),
        timeout: config
            .timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT),
        port: config
            .port
            .filter(|port| !port.is_empty())
            .unwrap_or_else(|| DEFAULT_PORT.to_string()),
        default_fields: config.default_fields.unwrap_or_default(),
        hostname,
        log_queue_capacity,
        stack: config
            .stack
            .filter(|stack| !stack.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STACK.to_string()),
    })
}
