/*!
 * Context Propagation
 * Trace identity and baggage carried along a causal call chain
 *
 * A context is immutable once created. Deriving a child copies the trace
 * identity and the sampling decision; only the span id is fresh. The
 * pipeline never inspects baggage, it only carries it.
 */

use crate::core::types::{SpanId, TraceId};
use crate::sampler::Sampler;
use serde::{Deserialize, Serialize};

/// W3C-style version prefix for the wire form
const WIRE_VERSION: &str = "00";

/// Immutable trace context.
///
/// `sampled` is fixed at the trace root and inherited by every descendant;
/// sampling is a per-trace decision, never per-span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub sampled: bool,
    /// Ordered key/value pairs propagated verbatim, never inspected
    pub baggage: Vec<(String, String)>,
}

impl TraceContext {
    /// Start a new trace: fresh trace id, one sampler consultation fixing
    /// the decision for the whole trace, fresh root span id.
    pub fn root(sampler: &Sampler) -> Self {
        let trace_id = TraceId::generate();
        Self {
            trace_id,
            span_id: SpanId::generate(),
            parent_span_id: None,
            sampled: sampler.decide(trace_id),
            baggage: Vec::new(),
        }
    }

    /// Derive a child context: same trace id, sampling decision, and
    /// baggage; `parent_span_id` points at the parent; fresh span id.
    pub fn child_of(parent: &TraceContext) -> Self {
        Self {
            trace_id: parent.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(parent.span_id),
            sampled: parent.sampled,
            baggage: parent.baggage.clone(),
        }
    }

    /// Derive a child of `parent`, or start a new trace if there is none
    pub fn derive(parent: Option<&TraceContext>, sampler: &Sampler) -> Self {
        match parent {
            Some(parent) => Self::child_of(parent),
            None => Self::root(sampler),
        }
    }

    /// Attach a baggage entry, replacing any existing value for the key
    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.baggage.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.baggage.push((key, value)),
        }
        self
    }

    pub fn baggage_value(&self, key: &str) -> Option<&str> {
        self.baggage
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Serialize for crossing a process or transport boundary.
    ///
    /// Carries exactly the trace id, span id, sampled flag
    /// (`00-{trace_id}-{span_id}-{01|00}`) and the baggage pairs
    /// (`k1=v1,k2=v2`). Re-deriving children on the receiving side is
    /// idempotent with respect to trace identity and sampling.
    pub fn to_wire(&self) -> WireContext {
        WireContext {
            traceparent: format!(
                "{}-{}-{}-{}",
                WIRE_VERSION,
                self.trace_id,
                self.span_id,
                if self.sampled { "01" } else { "00" }
            ),
            baggage: self
                .baggage
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Parse a wire form back into a context. The receiving side treats the
    /// result as the parent for its own spans.
    pub fn from_wire(wire: &WireContext) -> Option<Self> {
        let mut parts = wire.traceparent.split('-');
        let version = parts.next()?;
        if version != WIRE_VERSION {
            return None;
        }
        let trace_id: TraceId = parts.next()?.parse().ok()?;
        let span_id: SpanId = parts.next()?.parse().ok()?;
        let sampled = match parts.next()? {
            "01" => true,
            "00" => false,
            _ => return None,
        };
        if parts.next().is_some() || !trace_id.is_valid() || !span_id.is_valid() {
            return None;
        }

        let baggage = wire
            .baggage
            .split(',')
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let (k, v) = entry.split_once('=')?;
                Some((k.to_string(), v.to_string()))
            })
            .collect();

        Some(Self {
            trace_id,
            span_id,
            parent_span_id: None,
            sampled,
            baggage,
        })
    }
}

/// Serialized context as carried across a boundary (header values)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireContext {
    pub traceparent: String,
    pub baggage: String,
}
