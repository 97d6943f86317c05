//! Unified telemetry facade over OpenTelemetry.
//!
//! One [`Observability`] value gives application code a single call per
//! telemetry event across three pillars: structured logs, distributed traces
//! and metrics. The deployment [`Mode`] decides where each pillar goes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use telemetry_facade::{Fields, Mode, Observability, TelemetryConfig};
//!
//! let obs = Observability::new(
//!     TelemetryConfig::new("checkout", "1.4.0", Mode::Local)
//!         .with_default_field("team", "payments"),
//! )?;
//!
//! obs.info("cart", "add_item", "item added", Fields::new());
//! obs.counter("cart.items", 1, &Fields::new())?;
//! obs.shutdown()?;
//! ```
//!
//! # Modes
//!
//! | Mode | Logging | Tracing | Metrics |
//! |------|---------|---------|---------|
//! | `Discard` | dropped | never sampled | dropped |
//! | `Local` | JSON lines on stdout | batched, then discarded | pretty stdout |
//! | `DebugCollector` | `localhost:4317` | `localhost:4317` | `localhost:4317` |
//! | `DevelopmentCollector` | dev collector | dev collector | dev collector |
//! | `ProductionCollector` | `otel-collector.internal:<port>` | same | same |
//!
//! The production collector is reached over TLS when the port is `443`.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `OTEL_SERVICE_NAME` | Service name | `CARGO_PKG_NAME` |
//! | `OTEL_SERVICE_VERSION` | Service version | `CARGO_PKG_VERSION` |
//! | `TELEMETRY_MODE` | Mode name | `local` |
//! | `TELEMETRY_SEARCH_INDEX` | Collector search index | service name |
//! | `TELEMETRY_FLUSH_INTERVAL_SECS` | Export interval | `30` |
//! | `TELEMETRY_TIMEOUT_SECS` | Exporter timeout | `10` |
//! | `TELEMETRY_COLLECTOR_PORT` | Production collector port | `80` |
//! | `TELEMETRY_STACK` | Deployment stack on metric points | `-` |
//!
//! # Module Structure
//!
//! - [`client`]: The facade
//! - [`config`]: Raw and resolved configuration
//! - [`router`]: Mode to transport routing per pillar
//! - [`fields`]: Attribute merging and stack-trace digests
//! - [`api`]: Capability traits implemented by each pillar
//! - [`log`], [`trace`], [`metrics`]: OpenTelemetry-backed pillars
//! - [`subscriber`]: Optional `tracing` subscriber for the application itself

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod exporter;
pub mod fields;
pub mod log;
pub mod metrics;
pub mod resource;
pub mod router;
pub mod subscriber;
pub mod trace;

/// Instrumentation scope name used by every SDK provider of the facade
pub const INSTRUMENTATION_NAME: &str = "telemetry-facade";

// Re-exports
pub use api::{LogPillar, MetricPillar, TracePillar};
pub use client::{Observability, ObservabilityBuilder};
pub use config::{Fields, Mode, ResolvedConfig, TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use log::{Level, LogEntry, LogRecord};
pub use router::{Pillar, TransportTarget};
pub use subscriber::{init_subscriber, LogFormat};
pub use trace::SpanHandle;
