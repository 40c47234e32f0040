/*!
 * Pipeline Benchmarks
 *
 * Producer-side costs: span enqueue, counter accumulation, context derivation
 */

use beacon::export::pipeline::BatchConfig;
use beacon::export::{BatchPipeline, ExportBatch, Exporter, Resource};
use beacon::{Attributes, Environment, ExportError, Sampler, TraceContext};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Exporter that accepts and discards everything
struct NullExporter;

impl Exporter<u64> for NullExporter {
    fn send(&self, _batch: ExportBatch<u64>) -> BoxFuture<'static, Result<(), ExportError>> {
        Box::pin(async { Ok(()) })
    }
}

fn resource() -> Arc<Resource> {
    Arc::new(Resource {
        service_name: "bench".into(),
        service_version: "0.0.0".into(),
        environment: Environment::Development,
    })
}

fn bench_enqueue(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let pipeline = runtime.block_on(async {
        BatchPipeline::spawn(
            "bench",
            BatchConfig {
                mailbox_capacity: 1 << 16,
                max_batch_size: 512,
                batch_timeout: Duration::from_secs(5),
            },
            resource(),
            Arc::new(NullExporter),
        )
    });

    c.bench_function("pipeline_enqueue", |b| {
        b.iter(|| {
            black_box(pipeline.enqueue(black_box(42u64)));
        });
    });

    runtime.block_on(pipeline.shutdown(Duration::from_secs(5)));
}

fn bench_counter_add(c: &mut Criterion) {
    let registry = Arc::new(beacon::Registry::new());
    let counter = beacon::Counter::new(Arc::clone(&registry), "bench.hits");
    let attrs: Attributes = [("status", "success")].into_iter().collect();

    c.bench_function("counter_add", |b| {
        b.iter(|| {
            counter.add(black_box(1.0), &attrs).unwrap();
        });
    });
}

fn bench_context_derive(c: &mut Criterion) {
    let sampler = Sampler::always();
    let root = TraceContext::root(&sampler);

    c.bench_function("context_child_of", |b| {
        b.iter(|| {
            black_box(TraceContext::child_of(black_box(&root)));
        });
    });
}

criterion_group!(
    benches,
    bench_enqueue,
    bench_counter_add,
    bench_context_derive
);
criterion_main!(benches);
