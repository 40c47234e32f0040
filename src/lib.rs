/*!
 * Beacon
 * Bounded-memory telemetry pipeline: trace spans, windowed metrics, and
 * correlated logs, batched and delivered to a remote collector
 */

pub mod config;
pub mod context;
pub mod core;
pub mod export;
pub mod lifecycle;
pub mod logs;
pub mod metrics;
pub mod sampler;
pub mod span;

// Re-exports
pub use config::{Config, Environment, LogLevel};
pub use context::{TraceContext, WireContext};
pub use core::errors::{ExportError, TelemetryError};
pub use core::types::{Attributes, SpanId, TelemetryResult, TraceId, Value};
pub use export::{BatchPipeline, ExportBatch, Exporter, Resource, StatsSnapshot};
pub use lifecycle::{Pipeline, PipelineSnapshot, PipelineState, ShutdownOutcome};
pub use logs::{init_logging, log, LogRecord};
pub use metrics::{Counter, Histogram, MetricData, MetricKind, MetricPoint, Registry};
pub use sampler::Sampler;
pub use span::{Recorder, RecorderStats, Span, SpanData, SpanEvent, SpanKind, SpanStatus};
