use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::telemetry::api::LogPillar;
use crate::telemetry::config::ResolvedConfig;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::log::sink::{JsonSink, NullSink, OtlpLogSink, RecordSink};
use crate::telemetry::log::LogRecord;
use crate::telemetry::router::{Pillar, TransportTarget};

const WRITER_THREAD_NAME: &str = "telemetry-log-writer";

/// Logging delegate backed by a bounded queue and one writer thread.
///
/// Submitting never blocks: when the queue is full the record is dropped and
/// counted. Records are not guaranteed to reach the sink in submission order.
pub struct QueuedLogger {
    sender: RwLock<Option<mpsc::Sender<LogRecord>>>,
    worker: Mutex<Option<JoinHandle<Result<(), TelemetryError>>>>,
    dropped: AtomicU64,
    failed: Arc<AtomicU64>,
}

impl QueuedLogger {
    /// Start the writer thread draining into `sink`
    pub fn spawn(sink: Box<dyn RecordSink>, capacity: usize) -> Result<Self, TelemetryError> {
        let (sender, receiver) = mpsc::channel(capacity);
        let failed = Arc::new(AtomicU64::new(0));
        let worker_failed = Arc::clone(&failed);

        let worker = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || drain(sink, receiver, worker_failed))
            .map_err(|e| TelemetryError::exporter(Pillar::Logging, e))?;

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
            failed,
        })
    }

    /// Build the sink selected by `target` and start the writer.
    ///
    /// `writer` is only used by stdout targets.
    pub fn for_target(
        config: &ResolvedConfig,
        target: &TransportTarget,
        writer: BoxMakeWriter,
    ) -> Result<Self, TelemetryError> {
        let sink: Box<dyn RecordSink> = match target {
            TransportTarget::Null | TransportTarget::NoopExporter => Box::new(NullSink),
            TransportTarget::Stdout(_) => Box::new(JsonSink::new(writer)),
            TransportTarget::Collector(endpoint) => {
                Box::new(OtlpLogSink::connect(config, endpoint)?)
            }
        };

        debug!(target = ?target, capacity = config.log_queue_capacity(), "Starting log writer");
        Self::spawn(sink, config.log_queue_capacity())
    }

    /// Records discarded because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records the sink failed to write
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

fn drain(
    mut sink: Box<dyn RecordSink>,
    mut receiver: mpsc::Receiver<LogRecord>,
    failed: Arc<AtomicU64>,
) -> Result<(), TelemetryError> {
    while let Some(record) = receiver.blocking_recv() {
        if let Err(e) = sink.write(&record) {
            failed.fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "Failed to write log record");
        }
    }
    sink.close()
}

impl LogPillar for QueuedLogger {
    fn log(&self, record: LogRecord) {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Log writer stopped, dropping record");
            }
        }
    }

    /// Stop accepting records, drain the queue and close the sink.
    fn close(&self) -> Result<(), TelemetryError> {
        // Dropping the only sender ends the writer loop once the queue is empty.
        drop(
            self.sender
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match worker {
            Some(handle) => {
                let result = handle
                    .join()
                    .map_err(|_| TelemetryError::shutdown(Pillar::Logging, "log writer panicked"))?;
                debug!(
                    dropped = self.dropped(),
                    failed = self.failed(),
                    "Log writer closed"
                );
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for QueuedLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "Error closing log writer on drop");
        }
    }
}
