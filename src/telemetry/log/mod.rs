//! Logging pillar.
//!
//! Log calls are merged into a [`LogRecord`] on the caller's thread and then
//! handed to a [`QueuedLogger`], whose writer thread feeds the sink selected by
//! the mode router:
//!
//! - null sink (`Discard`)
//! - one JSON object per line on stdout (`Local`)
//! - OTLP log export to a collector (collector modes)

mod entry;
pub mod sink;
mod worker;

pub use entry::{ErrorInfo, Level, LogEntry, LogRecord};
pub use sink::{JsonSink, NullSink, OtlpLogSink, RecordSink};
pub use worker::QueuedLogger;
