/*!
 * Span Recorder
 * Timed, attributed units of work within a trace
 *
 * A span is mutable while open and owned by the operation that started it.
 * Ending it freezes it into an immutable record; sampled records are handed
 * to the export pipeline exactly once, unsampled ones are discarded with no
 * export cost.
 */

use crate::context::TraceContext;
use crate::core::errors::TelemetryError;
use crate::core::types::{now_unix_nanos, Attributes, SpanId, TelemetryResult, TraceId, Value};
use crate::export::BatchPipeline;
use crate::sampler::Sampler;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Role of a span relative to its trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

/// Span outcome. Monotonic: once Error, later Ok is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error(String),
}

impl SpanStatus {
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, SpanStatus::Error(_))
    }
}

/// Timestamped event attached to a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp_unix_nanos: u64,
    pub attributes: Attributes,
}

/// An error recorded against a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub timestamp_unix_nanos: u64,
}

/// Immutable record of a finished span, as handed to the export pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanData {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_unix_nanos: u64,
    pub end_unix_nanos: u64,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    pub errors: Vec<RecordedError>,
}

impl SpanData {
    #[inline]
    pub fn duration_nanos(&self) -> u64 {
        self.end_unix_nanos.saturating_sub(self.start_unix_nanos)
    }
}

/// An open span. Owned exclusively by the operation that started it until
/// `Recorder::end` freezes it.
pub struct Span {
    context: TraceContext,
    name: String,
    kind: SpanKind,
    start_unix_nanos: u64,
    attributes: Attributes,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    errors: Vec<RecordedError>,
    ended: bool,
    shared: Arc<RecorderShared>,
}

impl Span {
    /// Context under which this span runs; pass to `TraceContext::child_of`
    /// or `Recorder::start` for nested operations.
    #[inline]
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn status(&self) -> &SpanStatus {
        &self.status
    }

    /// Set one attribute, last write wins per key
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.set(key, value);
    }

    /// Set several attributes at once
    pub fn set_attributes<K, V, I>(&mut self, pairs: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in pairs {
            self.attributes.set(k, v);
        }
    }

    /// Append a timestamped event with its own attribute set
    pub fn add_event(&mut self, name: impl Into<String>, attributes: Attributes) {
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp_unix_nanos: now_unix_nanos(),
            attributes,
        });
    }

    /// Record an error. Sets the status to Error and appends the detail.
    pub fn record_error(&mut self, message: impl Into<String>, detail: Option<serde_json::Value>) {
        let message = message.into();
        self.status = SpanStatus::Error(message.clone());
        self.errors.push(RecordedError {
            message,
            detail,
            timestamp_unix_nanos: now_unix_nanos(),
        });
    }

    /// Move the status forward. Error is terminal: a later Ok does not
    /// revert it (the attempt is logged, not silently swallowed).
    pub fn set_status(&mut self, status: SpanStatus) {
        if self.status.is_error() && !status.is_error() {
            debug!(span = %self.name, "ignoring status downgrade from Error");
            return;
        }
        self.status = status;
    }

    fn freeze(&mut self, end_unix_nanos: u64) -> SpanData {
        SpanData {
            trace_id: self.context.trace_id,
            span_id: self.context.span_id,
            parent_span_id: self.context.parent_span_id,
            name: std::mem::take(&mut self.name),
            kind: self.kind,
            start_unix_nanos: self.start_unix_nanos,
            end_unix_nanos,
            attributes: std::mem::take(&mut self.attributes),
            events: std::mem::take(&mut self.events),
            status: std::mem::replace(&mut self.status, SpanStatus::Unset),
            errors: std::mem::take(&mut self.errors),
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.ended {
            // Abandoned without end(): a leak, made diagnosable
            self.shared.open_spans.fetch_sub(1, Ordering::Relaxed);
            self.shared.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Default)]
struct RecorderShared {
    open_spans: AtomicU64,
    abandoned: AtomicU64,
}

/// Open/abandoned span accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderStats {
    pub open_spans: u64,
    pub abandoned_spans: u64,
}

/// Creates and ends spans, enqueuing sampled records for export
#[derive(Clone)]
pub struct Recorder {
    sampler: Sampler,
    pipeline: Arc<BatchPipeline<SpanData>>,
    shared: Arc<RecorderShared>,
}

impl Recorder {
    pub fn new(sampler: Sampler, pipeline: Arc<BatchPipeline<SpanData>>) -> Self {
        Self {
            sampler,
            pipeline,
            shared: Arc::new(RecorderShared::default()),
        }
    }

    /// Open a span. With no parent this roots a new trace, consulting the
    /// sampler once; with a parent the decision is inherited. Returns the
    /// span together with its context for further derivation.
    pub fn start(
        &self,
        name: impl Into<String>,
        parent: Option<&TraceContext>,
        kind: SpanKind,
    ) -> (Span, TraceContext) {
        let context = TraceContext::derive(parent, &self.sampler);
        self.shared.open_spans.fetch_add(1, Ordering::Relaxed);
        let span = Span {
            context: context.clone(),
            name: name.into(),
            kind,
            start_unix_nanos: now_unix_nanos(),
            attributes: Attributes::new(),
            events: Vec::new(),
            status: SpanStatus::Unset,
            errors: Vec::new(),
            ended: false,
            shared: Arc::clone(&self.shared),
        };
        (span, context)
    }

    /// Freeze the span and, if its trace was sampled, hand the record to
    /// the export pipeline. Ending a span twice is caller misuse: reported,
    /// and no second enqueue happens.
    pub fn end(&self, span: &mut Span) -> TelemetryResult<()> {
        if span.ended {
            return Err(TelemetryError::CallerMisuse(format!(
                "span '{}' already ended",
                span.name
            )));
        }
        span.ended = true;
        self.shared.open_spans.fetch_sub(1, Ordering::Relaxed);

        if !span.context.sampled {
            return Ok(());
        }
        let data = span.freeze(now_unix_nanos());
        // Shedding on a full mailbox is not the producer's problem
        self.pipeline.enqueue(data);
        Ok(())
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            open_spans: self.shared.open_spans.load(Ordering::Relaxed),
            abandoned_spans: self.shared.abandoned.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}
