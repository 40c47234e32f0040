/*!
 * Log Correlation
 * Structured log records stamped with the active trace identity
 *
 * Correlation is a pure decoration step: if a sampled context is active at
 * emission time, the record carries copies of the trace and span ids. There
 * is no buffering; every call goes straight to the tracing sink.
 */

use crate::config::{Config, LogLevel};
use crate::context::TraceContext;
use crate::core::types::{now_unix_nanos, Attributes, SpanId, TraceId, Value};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// One structured log record. Correlation is frozen at creation: the ids
/// are copies, not references into the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub fields: Attributes,
    pub trace_id: Option<TraceId>,
    pub span_id: Option<SpanId>,
    pub timestamp_unix_nanos: u64,
}

impl LogRecord {
    /// Build a record, stamping trace identity only when the active
    /// context is sampled.
    pub fn build(
        context: Option<&TraceContext>,
        level: LogLevel,
        message: impl Into<String>,
        fields: Attributes,
    ) -> Self {
        let correlated = context.filter(|ctx| ctx.sampled);
        Self {
            level,
            message: message.into(),
            fields,
            trace_id: correlated.map(|ctx| ctx.trace_id),
            span_id: correlated.map(|ctx| ctx.span_id),
            timestamp_unix_nanos: now_unix_nanos(),
        }
    }

    #[inline]
    pub fn is_correlated(&self) -> bool {
        self.trace_id.is_some()
    }

    /// Structured fields as a JSON object, for sinks that want one value
    pub fn fields_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::Str(s) => serde_json::Value::from(s.clone()),
                    Value::Int(i) => serde_json::Value::from(*i),
                    Value::Float(f) => serde_json::Value::from(*f),
                    Value::Bool(b) => serde_json::Value::from(*b),
                };
                (k.to_string(), value)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Build and synchronously emit one correlated record
pub fn log(context: Option<&TraceContext>, level: LogLevel, message: &str, fields: Attributes) {
    emit(&LogRecord::build(context, level, message, fields));
}

/// Emit a record to the tracing sink
pub fn emit(record: &LogRecord) {
    let fields = record.fields_json();
    match (record.trace_id, record.span_id) {
        (Some(trace_id), Some(span_id)) => match record.level {
            LogLevel::Debug => tracing::debug!(trace_id = %trace_id, span_id = %span_id, fields = %fields, "{}", record.message),
            LogLevel::Info => tracing::info!(trace_id = %trace_id, span_id = %span_id, fields = %fields, "{}", record.message),
            LogLevel::Warn => tracing::warn!(trace_id = %trace_id, span_id = %span_id, fields = %fields, "{}", record.message),
            LogLevel::Error => tracing::error!(trace_id = %trace_id, span_id = %span_id, fields = %fields, "{}", record.message),
        },
        _ => match record.level {
            LogLevel::Debug => tracing::debug!(fields = %fields, "{}", record.message),
            LogLevel::Info => tracing::info!(fields = %fields, "{}", record.message),
            LogLevel::Warn => tracing::warn!(fields = %fields, "{}", record.message),
            LogLevel::Error => tracing::error!(fields = %fields, "{}", record.message),
        },
    }
}

/// Install the global tracing subscriber for the configured level.
///
/// Environment variables:
/// - RUST_LOG: overrides the configured level filter
/// - BEACON_LOG_JSON: emit JSON records (default: human-readable compact)
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let use_json = std::env::var("BEACON_LOG_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        let _ = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init();
    } else {
        let _ = registry
            .with(tracing_subscriber::fmt::layer().with_target(true).compact())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Sampler;

    fn fields(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_sampled_context_is_stamped() {
        let ctx = TraceContext::root(&Sampler::always());
        let record = LogRecord::build(
            Some(&ctx),
            LogLevel::Info,
            "order created",
            fields(&[("order_id", "o-42")]),
        );

        assert!(record.is_correlated());
        assert_eq!(record.trace_id, Some(ctx.trace_id));
        assert_eq!(record.span_id, Some(ctx.span_id));
    }

    #[test]
    fn test_unsampled_context_is_not_stamped() {
        let ctx = TraceContext::root(&Sampler::never());
        let record = LogRecord::build(Some(&ctx), LogLevel::Info, "order created", Attributes::new());

        assert!(!record.is_correlated());
        assert_eq!(record.trace_id, None);
        assert_eq!(record.span_id, None);
    }

    #[test]
    fn test_no_context_emits_unmodified() {
        let record = LogRecord::build(None, LogLevel::Warn, "standalone", Attributes::new());
        assert!(!record.is_correlated());
        assert_eq!(record.message, "standalone");
    }

    #[test]
    fn test_correlation_is_frozen_at_creation() {
        let ctx = TraceContext::root(&Sampler::always());
        let record = LogRecord::build(Some(&ctx), LogLevel::Info, "msg", Attributes::new());
        let frozen = record.trace_id;
        drop(ctx);
        assert_eq!(record.trace_id, frozen);
    }

    #[test]
    fn test_fields_json_shape() {
        let mut f = Attributes::new();
        f.set("count", 3i64);
        f.set("ok", true);
        let record = LogRecord::build(None, LogLevel::Debug, "msg", f);

        let json = record.fields_json();
        assert_eq!(json["count"], 3);
        assert_eq!(json["ok"], true);
    }
}
