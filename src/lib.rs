pub mod telemetry;

pub use telemetry::{
    init_subscriber, Fields, Level, LogFormat, Mode, Observability, ObservabilityBuilder,
    ResolvedConfig, SpanHandle, TelemetryConfig, TelemetryError,
};
