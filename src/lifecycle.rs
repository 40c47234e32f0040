/*!
 * Lifecycle Controller
 * Startup and shutdown ordering for the whole pipeline
 *
 * The Pipeline handle replaces ambient globals: it is constructed once at
 * startup and threaded explicitly through everything that produces
 * telemetry. Shutdown drains buffered data before stopping, bounded by a
 * caller-supplied deadline.
 */

use crate::config::Config;
use crate::core::errors::TelemetryError;
use crate::core::limits::DEFAULT_SHUTDOWN_DEADLINE;
use crate::core::types::TelemetryResult;
use crate::export::collect::CollectionDriver;
use crate::export::pipeline::BatchConfig;
use crate::export::{BatchPipeline, Exporter, Resource, StatsSnapshot};
use crate::metrics::{Counter, Histogram, MetricPoint, Registry};
use crate::sampler::Sampler;
use crate::span::{Recorder, RecorderStats, SpanData};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Draining = 3,
}

impl PipelineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PipelineState::Starting,
            2 => PipelineState::Running,
            3 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Stopped => "stopped",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
        }
    }
}

/// Result of a drain: whether everything buffered made it out, and how many
/// items were shed over the pipeline's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownOutcome {
    pub flushed: bool,
    pub dropped_count: u64,
}

/// Combined self-metrics across both pipelines and the recorder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub state: String,
    pub spans: StatsSnapshot,
    pub metrics: StatsSnapshot,
    pub recorder: RecorderStats,
}

struct Inner {
    config: Config,
    state: AtomicU8,
    recorder: Recorder,
    registry: Arc<Registry>,
    span_pipeline: Arc<BatchPipeline<SpanData>>,
    metric_pipeline: Arc<BatchPipeline<MetricPoint>>,
    collection: CollectionDriver,
    shutdown_outcome: tokio::sync::OnceCell<ShutdownOutcome>,
}

/// Handle to a running telemetry pipeline.
///
/// Cheap to clone; all clones share the same workers and state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Start the pipeline: spawn the span and metric export workers and arm
    /// the metric collection timer. Requires a running tokio runtime.
    pub fn start(
        config: Config,
        span_exporter: Arc<dyn Exporter<SpanData>>,
        metric_exporter: Arc<dyn Exporter<MetricPoint>>,
    ) -> Self {
        let state = AtomicU8::new(PipelineState::Starting as u8);
        let resource = Arc::new(Resource::from_config(&config));
        let batch_config = BatchConfig {
            mailbox_capacity: config.mailbox_capacity,
            max_batch_size: config.batch_max_size,
            batch_timeout: config.batch_timeout,
        };

        let span_pipeline = Arc::new(BatchPipeline::spawn(
            "spans",
            batch_config,
            Arc::clone(&resource),
            span_exporter,
        ));
        let metric_pipeline = Arc::new(BatchPipeline::spawn(
            "metrics",
            batch_config,
            Arc::clone(&resource),
            metric_exporter,
        ));

        let registry = Arc::new(Registry::new());
        let collection = CollectionDriver::spawn(
            Arc::clone(&registry),
            Arc::clone(&metric_pipeline),
            config.metric_collection_interval,
        );

        let sampler = Sampler::for_environment(config.environment);
        let recorder = Recorder::new(sampler, Arc::clone(&span_pipeline));

        state.store(PipelineState::Running as u8, Ordering::Release);
        info!(
            service = %config.service_name,
            environment = ?config.environment,
            sample_rate = sampler.rate(),
            "telemetry pipeline running"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                state,
                recorder,
                registry,
                span_pipeline,
                metric_pipeline,
                collection,
                shutdown_outcome: tokio::sync::OnceCell::new(),
            }),
        }
    }

    #[inline]
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Span recorder backed by this pipeline's sampler and span worker
    #[inline]
    pub fn recorder(&self) -> &Recorder {
        &self.inner.recorder
    }

    /// Create a counter aggregated into this pipeline's collection window
    pub fn counter(&self, name: impl Into<String>) -> Counter {
        Counter::new(Arc::clone(&self.inner.registry), name)
    }

    /// Create a histogram aggregated into this pipeline's collection window
    pub fn histogram(&self, name: impl Into<String>) -> Histogram {
        Histogram::new(Arc::clone(&self.inner.registry), name)
    }

    /// Force both export workers to flush everything currently buffered.
    /// Resolves once the exporter calls for the drained data have returned.
    pub async fn flush(&self) -> TelemetryResult<()> {
        let state = self.state();
        if state != PipelineState::Running {
            return Err(TelemetryError::NotRunning(state.as_str().to_string()));
        }
        self.inner.span_pipeline.flush().await;
        self.inner.metric_pipeline.flush().await;
        Ok(())
    }

    /// Combined self-metrics
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            state: self.state().as_str().to_string(),
            spans: self.inner.span_pipeline.stats(),
            metrics: self.inner.metric_pipeline.stats(),
            recorder: self.inner.recorder.stats(),
        }
    }

    /// Drain and stop.
    ///
    /// Stops intake, takes a final metric snapshot, flushes everything
    /// buffered, and waits up to `deadline` for outstanding exporter calls.
    /// If the deadline elapses the remaining data is lost and the outcome
    /// reports `flushed: false`; the call itself always returns by the
    /// deadline. Re-entrant and concurrent calls are no-ops returning the
    /// first call's outcome.
    pub async fn shutdown(&self, deadline: Duration) -> ShutdownOutcome {
        *self
            .inner
            .shutdown_outcome
            .get_or_init(|| self.drain(deadline))
            .await
    }

    /// `shutdown` with the default drain deadline
    pub async fn stop(&self) -> ShutdownOutcome {
        self.shutdown(DEFAULT_SHUTDOWN_DEADLINE).await
    }

    async fn drain(&self, deadline: Duration) -> ShutdownOutcome {
        self.inner
            .state
            .store(PipelineState::Draining as u8, Ordering::Release);
        info!(deadline_ms = deadline.as_millis() as u64, "telemetry pipeline draining");

        let started = Instant::now();
        let remaining = |started: Instant| deadline.saturating_sub(started.elapsed());

        // Final metric snapshot first so it rides the metric drain below
        let collected = tokio::time::timeout(remaining(started), self.inner.collection.shutdown())
            .await
            .is_ok();

        let spans_flushed = self.inner.span_pipeline.shutdown(remaining(started)).await;
        let metrics_flushed = self
            .inner
            .metric_pipeline
            .shutdown(remaining(started))
            .await;

        let flushed = collected && spans_flushed && metrics_flushed;
        let dropped_count = self.inner.span_pipeline.stats().dropped
            + self.inner.metric_pipeline.stats().dropped;

        self.inner
            .state
            .store(PipelineState::Stopped as u8, Ordering::Release);

        if flushed {
            info!(dropped_count, "telemetry pipeline stopped, all buffered data flushed");
        } else {
            let err = TelemetryError::ShutdownTimeout {
                deadline_ms: deadline.as_millis() as u64,
            };
            error!(error = %err, dropped_count, "telemetry pipeline stopped with unflushed data");
        }

        ShutdownOutcome {
            flushed,
            dropped_count,
        }
    }
}
