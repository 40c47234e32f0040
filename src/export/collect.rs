/*!
 * Metric Collection Driver
 * Interval-driven snapshotting of the aggregation window
 *
 * Each tick snapshots the current window, resets it, and hands the
 * snapshot to the metric pipeline as one batch. Shutdown takes a final
 * snapshot so a partially elapsed window is not lost.
 */

use crate::export::BatchPipeline;
use crate::metrics::{MetricPoint, Registry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::debug;

enum Command {
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the background collection task
pub struct CollectionDriver {
    commands: mpsc::UnboundedSender<Command>,
    handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CollectionDriver {
    /// Spawn the driver. Requires a running tokio runtime.
    pub fn spawn(
        registry: Arc<Registry>,
        pipeline: Arc<BatchPipeline<MetricPoint>>,
        interval: Duration,
    ) -> Self {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            // First window ends one full interval from now
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        collect_window(&registry, &pipeline).await;
                    }
                    command = command_rx.recv() => {
                        match command {
                            Some(Command::Shutdown(ack)) => {
                                // Final snapshot of the partial window
                                collect_window(&registry, &pipeline).await;
                                let _ = ack.send(());
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            debug!("metric collection driver stopped");
        });

        Self {
            commands: command_tx,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    /// Take a final snapshot and stop ticking. Returns once the snapshot
    /// has been handed to the pipeline.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn collect_window(registry: &Registry, pipeline: &BatchPipeline<MetricPoint>) {
    let points = registry.collect();
    if points.is_empty() {
        return;
    }
    let count = points.len();
    for point in points {
        pipeline.enqueue(point);
    }
    // Ship the window as one batch instead of waiting out the batch timeout
    pipeline.flush().await;
    debug!(points = count, "metric window collected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::core::errors::ExportError;
    use crate::core::types::Attributes;
    use crate::export::pipeline::BatchConfig;
    use crate::export::{ExportBatch, Exporter, Resource};
    use crate::metrics::{Counter, MetricData};
    use futures::future::BoxFuture;
    use parking_lot::Mutex;

    struct CapturingExporter {
        batches: Arc<Mutex<Vec<Vec<MetricPoint>>>>,
    }

    impl Exporter<MetricPoint> for CapturingExporter {
        fn send(
            &self,
            batch: ExportBatch<MetricPoint>,
        ) -> BoxFuture<'static, Result<(), ExportError>> {
            let batches = Arc::clone(&self.batches);
            Box::pin(async move {
                batches.lock().push(batch.items);
                Ok(())
            })
        }
    }

    fn metric_pipeline(
        batches: &Arc<Mutex<Vec<Vec<MetricPoint>>>>,
    ) -> Arc<BatchPipeline<MetricPoint>> {
        Arc::new(BatchPipeline::spawn(
            "metrics",
            BatchConfig {
                mailbox_capacity: 256,
                max_batch_size: 512,
                batch_timeout: Duration::from_secs(60),
            },
            Arc::new(Resource {
                service_name: "test".into(),
                service_version: "0.0.0".into(),
                environment: Environment::Development,
            }),
            Arc::new(CapturingExporter {
                batches: Arc::clone(batches),
            }),
        ))
    }

    #[tokio::test]
    async fn test_tick_ships_window_as_one_batch() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let pipeline = metric_pipeline(&batches);
        let registry = Arc::new(Registry::new());

        let counter = Counter::new(Arc::clone(&registry), "hits");
        counter.add(3.0, &Attributes::new()).unwrap();

        let driver =
            CollectionDriver::spawn(Arc::clone(&registry), pipeline, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(120)).await;

        let captured = batches.lock().clone();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].len(), 1);
        assert_eq!(captured[0][0].data, MetricData::Sum { value: 3.0 });

        driver.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_window_ships_nothing() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let pipeline = metric_pipeline(&batches);
        let registry = Arc::new(Registry::new());

        let driver =
            CollectionDriver::spawn(Arc::clone(&registry), pipeline, Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(100)).await;
        driver.shutdown().await;

        assert!(batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_collects_partial_window() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let pipeline = metric_pipeline(&batches);
        let registry = Arc::new(Registry::new());

        let driver =
            CollectionDriver::spawn(Arc::clone(&registry), pipeline, Duration::from_secs(3600));
        Counter::new(Arc::clone(&registry), "hits")
            .add(1.0, &Attributes::new())
            .unwrap();
        driver.shutdown().await;

        let captured = batches.lock().clone();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0][0].data, MetricData::Sum { value: 1.0 });
    }
}
