use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use opentelemetry::trace::{SpanContext, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracerProvider, SpanData, SpanExporter,
};
use tracing::debug;

use crate::telemetry::api::TracePillar;
use crate::telemetry::config::{Fields, ResolvedConfig};
use crate::telemetry::error::TelemetryError;
use crate::telemetry::exporter::build_span_exporter;
use crate::telemetry::resource::build_resource;
use crate::telemetry::router::{Pillar, TransportTarget};
use crate::telemetry::INSTRUMENTATION_NAME;

pub(crate) fn key_values(fields: &Fields) -> Vec<KeyValue> {
    fields
        .iter()
        .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
        .collect()
}

/// Span exporter that accepts every batch and keeps nothing
#[derive(Debug, Default)]
pub struct DiscardExporter;

impl SpanExporter for DiscardExporter {
    async fn export(&self, _batch: Vec<SpanData>) -> OTelSdkResult {
        Ok(())
    }
}

fn batch_processor<E>(exporter: E, flush_interval: Duration) -> BatchSpanProcessor
where
    E: SpanExporter + 'static,
{
    let batch_config = BatchConfigBuilder::default()
        .with_scheduled_delay(flush_interval)
        .build();

    BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build()
}

/// Handle to one started span.
///
/// The span stays open until [`SpanHandle::end`] is called or the context
/// carrying it is dropped. Ending more than once is a no-op.
#[derive(Debug)]
pub struct SpanHandle {
    cx: Context,
    ended: AtomicBool,
}

impl SpanHandle {
    pub fn new(cx: Context) -> Self {
        Self {
            cx,
            ended: AtomicBool::new(false),
        }
    }

    /// Context carrying this span, for starting children
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    pub fn add_event(&self, name: &str, attributes: &Fields) {
        self.cx
            .span()
            .add_event(name.to_string(), key_values(attributes));
    }

    pub fn set_attributes(&self, attributes: &Fields) {
        self.cx.span().set_attributes(key_values(attributes));
    }

    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn end(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cx.span().end();
    }
}

/// Tracing delegate backed by an SDK tracer provider
pub struct OtelTracer {
    provider: SdkTracerProvider,
}

impl OtelTracer {
    pub fn new(provider: SdkTracerProvider) -> Self {
        Self { provider }
    }

    /// Build the provider for `target`.
    ///
    /// - `Null`: spans are never sampled
    /// - `NoopExporter`: spans are batched, then discarded. The router never
    ///   sends spans to stdout, so a `Stdout` target is handled the same way.
    /// - `Collector`: spans are batched and exported over OTLP
    pub fn for_target(
        config: &ResolvedConfig,
        target: &TransportTarget,
    ) -> Result<Self, TelemetryError> {
        let builder = SdkTracerProvider::builder().with_resource(build_resource(config));
        let interval = config.flush_interval();

        let provider = match target {
            TransportTarget::Null => builder.with_sampler(Sampler::AlwaysOff).build(),
            TransportTarget::NoopExporter | TransportTarget::Stdout(_) => builder
                .with_span_processor(batch_processor(DiscardExporter, interval))
                .build(),
            TransportTarget::Collector(endpoint) => {
                let exporter = build_span_exporter(endpoint, config.timeout())?;
                builder
                    .with_span_processor(batch_processor(exporter, interval))
                    .build()
            }
        };

        debug!(target = ?target, "Tracer provider built");
        Ok(Self::new(provider))
    }
}

impl TracePillar for OtelTracer {
    fn start_span(&self, parent: &Context, name: &str) -> (Context, SpanHandle) {
        let tracer = self.provider.tracer(INSTRUMENTATION_NAME);
        let span = tracer.start_with_context(name.to_string(), parent);
        let cx = parent.with_span(span);
        (cx.clone(), SpanHandle::new(cx))
    }

    fn close(&self) -> Result<(), TelemetryError> {
        self.provider
            .force_flush()
            .map_err(|e| TelemetryError::shutdown(Pillar::Tracing, e))?;
        self.provider
            .shutdown()
            .map_err(|e| TelemetryError::shutdown(Pillar::Tracing, e))
    }

    fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        Some(&self.provider)
    }
}
