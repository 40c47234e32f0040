/*!
 * Concurrency Stress Tests
 * High-contention workloads over the metric registry and the export mailbox
 */

use beacon::export::pipeline::BatchConfig;
use beacon::{
    Attributes, BatchPipeline, Environment, ExportBatch, ExportError, Exporter, MetricData,
    Registry, Resource,
};
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const HIGH_CONCURRENCY: usize = 1000;
const INCREMENTS_PER_TASK: usize = 100;

fn test_resource() -> Arc<Resource> {
    Arc::new(Resource {
        service_name: "stress".into(),
        service_version: "0.0.0".into(),
        environment: Environment::Development,
    })
}

/// Exporter that only counts delivered items
struct CountingExporter {
    items: Arc<AtomicU64>,
}

impl Exporter<u64> for CountingExporter {
    fn send(&self, batch: ExportBatch<u64>) -> BoxFuture<'static, Result<(), ExportError>> {
        let items = Arc::clone(&self.items);
        let count = batch.items.len() as u64;
        Box::pin(async move {
            items.fetch_add(count, Ordering::Relaxed);
            Ok(())
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_registry_concurrent_mixed_series() {
    let registry = Arc::new(Registry::new());
    let mut handles = vec![];

    // Tasks spread increments across a random subset of series; per-series
    // totals must still add up after collection.
    for task in 0..HIGH_CONCURRENCY {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(task as u64);
            let counter = beacon::Counter::new(Arc::clone(&registry), "stress.hits");
            for _ in 0..INCREMENTS_PER_TASK {
                let shard = rng.gen_range(0..4u32);
                let attrs: Attributes =
                    [("shard", shard.to_string())].into_iter().collect();
                counter.add(1.0, &attrs).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let points = registry.collect();
    assert_eq!(points.len(), 4);
    let total: f64 = points
        .iter()
        .map(|p| match &p.data {
            MetricData::Sum { value } => *value,
            other => panic!("expected sums, got {:?}", other),
        })
        .sum();
    assert_eq!(total, (HIGH_CONCURRENCY * INCREMENTS_PER_TASK) as f64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_pipeline_concurrent_enqueue_accounting() {
    let delivered = Arc::new(AtomicU64::new(0));
    let pipeline = Arc::new(BatchPipeline::spawn(
        "stress",
        BatchConfig {
            mailbox_capacity: 256,
            max_batch_size: 64,
            batch_timeout: Duration::from_millis(10),
        },
        test_resource(),
        Arc::new(CountingExporter {
            items: Arc::clone(&delivered),
        }),
    ));

    let mut handles = vec![];
    for i in 0..HIGH_CONCURRENCY {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            // Accepted or shed, never an error
            pipeline.enqueue(i as u64);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(pipeline.shutdown(Duration::from_secs(5)).await);
    let stats = pipeline.stats();
    assert_eq!(stats.enqueued + stats.dropped, HIGH_CONCURRENCY as u64);
    assert_eq!(stats.exported, stats.enqueued);
    assert_eq!(delivered.load(Ordering::Relaxed), stats.exported);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_histogram_concurrent_random_observations() {
    let registry = Arc::new(Registry::new());
    let mut handles = vec![];

    for task in 0..64 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(0xBEAC + task as u64);
            let histogram = beacon::Histogram::new(Arc::clone(&registry), "stress.latency")
                .with_boundaries(vec![10.0, 100.0, 1000.0]);
            for _ in 0..500 {
                histogram.record(rng.gen_range(0.0..2000.0), &Attributes::new());
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let points = registry.collect();
    assert_eq!(points.len(), 1);
    match &points[0].data {
        MetricData::Histogram {
            count,
            bucket_counts,
            ..
        } => {
            assert_eq!(*count, 64 * 500);
            assert_eq!(bucket_counts.iter().sum::<u64>(), 64 * 500);
        }
        other => panic!("expected histogram data, got {:?}", other),
    }
}
