/*!
 * Metric Instruments
 * Counters and histograms aggregated over fixed collection windows
 *
 * Producers accumulate into the current window under per-shard locking;
 * the collection driver swaps the window out atomically and renders it as
 * a batch of metric points. Metrics are never subject to trace sampling.
 */

use crate::core::errors::TelemetryError;
use crate::core::limits::DEFAULT_HISTOGRAM_BOUNDARIES;
use crate::core::types::{now_unix_nanos, Attributes, TelemetryResult};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Instrument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Histogram,
}

/// One exported point: everything accumulated for a single
/// `(name, attribute_set)` series over one collection window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub kind: MetricKind,
    pub description: String,
    pub unit: String,
    /// Sorted key/value pairs; set semantics, order-independent
    pub attributes: Vec<(String, String)>,
    pub data: MetricData,
    pub window_start_unix_nanos: u64,
    pub timestamp_unix_nanos: u64,
}

/// Aggregated values for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricData {
    Sum {
        value: f64,
    },
    Histogram {
        count: u64,
        sum: f64,
        boundaries: Vec<f64>,
        /// One count per boundary plus a final overflow bucket
        bucket_counts: Vec<u64>,
    },
}

/// Series identity inside a window: instrument name plus the attribute set
/// rendered to sorted string pairs, so that two points with the same name
/// and attributes accumulate into the same series regardless of the order
/// the attributes were supplied in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    name: String,
    attributes: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &str, attrs: &Attributes) -> Self {
        let mut attributes: Vec<(String, String)> = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.render()))
            .collect();
        attributes.sort();
        Self {
            name: name.to_string(),
            attributes,
        }
    }
}

/// Per-series accumulation state
#[derive(Debug, Clone)]
enum Accum {
    Counter {
        value: f64,
    },
    Histogram {
        boundaries: Arc<Vec<f64>>,
        bucket_counts: Vec<u64>,
        sum: f64,
        count: u64,
    },
}

/// Instrument metadata attached to a series at first write
#[derive(Debug, Clone)]
struct SeriesMeta {
    kind: MetricKind,
    description: String,
    unit: String,
}

struct Window {
    series: DashMap<SeriesKey, (SeriesMeta, Accum), RandomState>,
    started_at: u64,
}

impl Window {
    fn new() -> Self {
        Self {
            series: DashMap::with_hasher(RandomState::new()),
            started_at: now_unix_nanos(),
        }
    }
}

/// Aggregation registry holding the current collection window.
///
/// Updates run under the window's read lock so that a collection swap
/// (write lock) linearizes against every in-flight accumulation.
pub struct Registry {
    window: RwLock<Window>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            window: RwLock::new(Window::new()),
        }
    }

    fn add_counter(&self, counter: &Counter, value: f64, attrs: &Attributes) {
        let key = SeriesKey::new(&counter.name, attrs);
        let window = self.window.read();
        let mut entry = window.series.entry(key).or_insert_with(|| {
            (
                SeriesMeta {
                    kind: MetricKind::Counter,
                    description: counter.description.clone(),
                    unit: counter.unit.clone(),
                },
                Accum::Counter { value: 0.0 },
            )
        });
        match &mut entry.value_mut().1 {
            Accum::Counter { value: total } => *total += value,
            Accum::Histogram { .. } => {
                debug!(
                    series = %counter.name,
                    "dropping counter write, series already registered as a histogram"
                );
            }
        }
    }

    fn record_histogram(&self, histogram: &Histogram, value: f64, attrs: &Attributes) {
        let key = SeriesKey::new(&histogram.name, attrs);
        let window = self.window.read();
        let mut entry = window.series.entry(key).or_insert_with(|| {
            (
                SeriesMeta {
                    kind: MetricKind::Histogram,
                    description: histogram.description.clone(),
                    unit: histogram.unit.clone(),
                },
                Accum::Histogram {
                    boundaries: Arc::clone(&histogram.boundaries),
                    bucket_counts: vec![0; histogram.boundaries.len() + 1],
                    sum: 0.0,
                    count: 0,
                },
            )
        });
        match &mut entry.value_mut().1 {
            Accum::Histogram {
                boundaries,
                bucket_counts,
                sum,
                count,
            } => {
                let bucket = boundaries
                    .iter()
                    .position(|b| value <= *b)
                    .unwrap_or(boundaries.len());
                bucket_counts[bucket] += 1;
                *sum += value;
                *count += 1;
            }
            Accum::Counter { .. } => {
                debug!(
                    series = %histogram.name,
                    "dropping histogram write, series already registered as a counter"
                );
            }
        }
    }

    /// Snapshot the current window and reset it.
    ///
    /// The write lock waits out every in-flight accumulation, so no update
    /// straddles the window boundary.
    pub fn collect(&self) -> Vec<MetricPoint> {
        let drained = {
            let mut window = self.window.write();
            std::mem::replace(&mut *window, Window::new())
        };

        let timestamp = now_unix_nanos();
        let mut points: Vec<MetricPoint> = drained
            .series
            .into_iter()
            .map(|(key, (meta, accum))| MetricPoint {
                name: key.name,
                kind: meta.kind,
                description: meta.description,
                unit: meta.unit,
                attributes: key.attributes,
                data: match accum {
                    Accum::Counter { value } => MetricData::Sum { value },
                    Accum::Histogram {
                        boundaries,
                        bucket_counts,
                        sum,
                        count,
                    } => MetricData::Histogram {
                        count,
                        sum,
                        boundaries: boundaries.as_ref().clone(),
                        bucket_counts,
                    },
                },
                window_start_unix_nanos: drained.started_at,
                timestamp_unix_nanos: timestamp,
            })
            .collect();

        // Deterministic output order for exporters and tests
        points.sort_by(|a, b| (&a.name, &a.attributes).cmp(&(&b.name, &b.attributes)));
        points
    }

    /// Number of live series in the current window
    pub fn series_count(&self) -> usize {
        self.window.read().series.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonically increasing counter
#[derive(Clone)]
pub struct Counter {
    name: String,
    description: String,
    unit: String,
    registry: Arc<Registry>,
}

impl Counter {
    /// Create a counter bound to `registry`
    pub fn new(registry: Arc<Registry>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            registry,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Accumulate `value` into the series for `attrs` in the current
    /// window. Negative and non-finite values are caller misuse: reported,
    /// not applied.
    pub fn add(&self, value: f64, attrs: &Attributes) -> TelemetryResult<()> {
        // NaN fails every ordering comparison, so a plain `< 0.0` check
        // would let it through and poison the series sum
        if !value.is_finite() || value < 0.0 {
            return Err(TelemetryError::CallerMisuse(format!(
                "counter '{}' rejects invalid value {}",
                self.name, value
            )));
        }
        self.registry.add_counter(self, value, attrs);
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Distribution instrument over fixed bucket boundaries
#[derive(Clone)]
pub struct Histogram {
    name: String,
    description: String,
    unit: String,
    boundaries: Arc<Vec<f64>>,
    registry: Arc<Registry>,
}

impl Histogram {
    /// Create a histogram bound to `registry`, with default boundaries
    pub fn new(registry: Arc<Registry>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            boundaries: Arc::new(DEFAULT_HISTOGRAM_BOUNDARIES.to_vec()),
            registry,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Replace the bucket boundaries. Must be sorted ascending.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Arc::new(boundaries);
        self
    }

    /// Record one observation into the current window. Non-finite values
    /// would poison the series sum and are discarded.
    pub fn record(&self, value: f64, attrs: &Attributes) {
        if !value.is_finite() {
            debug!(histogram = %self.name, value, "discarding non-finite observation");
            return;
        }
        self.registry.record_histogram(self, value, attrs);
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_counter_accumulates_per_series() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::new(Arc::clone(&registry), "orders.created").with_unit("{order}");

        counter.add(1.0, &attrs(&[("status", "success")])).unwrap();
        counter.add(2.0, &attrs(&[("status", "success")])).unwrap();
        counter.add(5.0, &attrs(&[("status", "failed")])).unwrap();

        let points = registry.collect();
        assert_eq!(points.len(), 2);

        let failed = &points[0];
        assert_eq!(failed.attributes, vec![("status".into(), "failed".into())]);
        assert_eq!(failed.data, MetricData::Sum { value: 5.0 });

        let success = &points[1];
        assert_eq!(success.data, MetricData::Sum { value: 3.0 });
        assert_eq!(success.unit, "{order}");
    }

    #[test]
    fn test_attribute_order_does_not_split_series() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::new(Arc::clone(&registry), "requests");

        counter
            .add(1.0, &attrs(&[("a", "1"), ("b", "2")]))
            .unwrap();
        counter
            .add(1.0, &attrs(&[("b", "2"), ("a", "1")]))
            .unwrap();

        let points = registry.collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].data, MetricData::Sum { value: 2.0 });
    }

    #[test]
    fn test_negative_counter_value_rejected() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::new(Arc::clone(&registry), "orders.created");

        let err = counter.add(-1.0, &Attributes::new()).unwrap_err();
        assert!(matches!(err, TelemetryError::CallerMisuse(_)));

        // Rejected value was not applied
        assert_eq!(registry.collect().len(), 0);
    }

    #[test]
    fn test_nan_counter_value_rejected() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::new(Arc::clone(&registry), "orders.created");

        counter.add(2.0, &Attributes::new()).unwrap();
        let err = counter.add(f64::NAN, &Attributes::new()).unwrap_err();
        assert!(matches!(err, TelemetryError::CallerMisuse(_)));
        let err = counter.add(f64::INFINITY, &Attributes::new()).unwrap_err();
        assert!(matches!(err, TelemetryError::CallerMisuse(_)));

        // The accumulated sum stays untouched
        let points = registry.collect();
        assert_eq!(points[0].data, MetricData::Sum { value: 2.0 });
    }

    #[test]
    fn test_non_finite_histogram_observations_discarded() {
        let registry = Arc::new(Registry::new());
        let histogram = Histogram::new(Arc::clone(&registry), "orders.duration")
            .with_boundaries(vec![10.0]);

        histogram.record(5.0, &Attributes::new());
        histogram.record(f64::NAN, &Attributes::new());
        histogram.record(f64::INFINITY, &Attributes::new());

        let points = registry.collect();
        match &points[0].data {
            MetricData::Histogram { count, sum, .. } => {
                assert_eq!(*count, 1);
                assert_eq!(*sum, 5.0);
            }
            other => panic!("expected histogram data, got {:?}", other),
        }
    }

    #[test]
    fn test_kind_collision_does_not_corrupt_series() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::new(Arc::clone(&registry), "orders.duration");
        let histogram = Histogram::new(Arc::clone(&registry), "orders.duration")
            .with_boundaries(vec![10.0]);

        histogram.record(5.0, &Attributes::new());
        // Same name and attributes, conflicting instrument kind
        counter.add(1.0, &Attributes::new()).unwrap();

        let points = registry.collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind, MetricKind::Histogram);
        match &points[0].data {
            MetricData::Histogram { count, sum, .. } => {
                assert_eq!(*count, 1);
                assert_eq!(*sum, 5.0);
            }
            other => panic!("expected histogram data, got {:?}", other),
        }
    }

    #[test]
    fn test_histogram_buckets() {
        let registry = Arc::new(Registry::new());
        let histogram = Histogram::new(Arc::clone(&registry), "orders.duration")
            .with_unit("ms")
            .with_boundaries(vec![10.0, 100.0]);

        histogram.record(5.0, &Attributes::new());
        histogram.record(50.0, &Attributes::new());
        histogram.record(500.0, &Attributes::new());
        histogram.record(100.0, &Attributes::new());

        let points = registry.collect();
        assert_eq!(points.len(), 1);
        match &points[0].data {
            MetricData::Histogram {
                count,
                sum,
                boundaries,
                bucket_counts,
            } => {
                assert_eq!(*count, 4);
                assert_eq!(*sum, 655.0);
                assert_eq!(boundaries, &vec![10.0, 100.0]);
                // <=10, <=100, overflow
                assert_eq!(bucket_counts, &vec![1, 2, 1]);
            }
            other => panic!("expected histogram data, got {:?}", other),
        }
    }

    #[test]
    fn test_collect_resets_window() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::new(Arc::clone(&registry), "hits");

        counter.add(1.0, &Attributes::new()).unwrap();
        assert_eq!(registry.collect().len(), 1);
        assert_eq!(registry.collect().len(), 0);

        counter.add(1.0, &Attributes::new()).unwrap();
        let points = registry.collect();
        assert_eq!(points[0].data, MetricData::Sum { value: 1.0 });
    }

    #[test]
    fn test_concurrent_counter_increments() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::new(Arc::clone(&registry), "hits");
        let labels = attrs(&[("status", "success")]);

        let threads: Vec<_> = (0..10)
            .map(|_| {
                let counter = counter.clone();
                let labels = labels.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.add(1.0, &labels).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let points = registry.collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].data, MetricData::Sum { value: 10_000.0 });
    }
}
