/*!
 * Batch Export Pipeline
 * Bounded mailbox feeding a single background worker
 *
 * Producers enqueue without ever blocking: a full mailbox sheds the item
 * and bumps a drop counter. The worker accumulates items into a batch and
 * flushes when the batch reaches its size limit or when the batch timeout
 * elapses since the first item of the current batch, whichever comes first.
 */

use super::{ExportBatch, Exporter, Resource};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Control messages for the export worker
enum Command {
    /// Drain the mailbox and flush everything buffered, then ack
    Flush(oneshot::Sender<()>),
    /// Drain, flush, ack, and exit
    Shutdown(oneshot::Sender<()>),
}

/// Self-metrics for one pipeline instance.
///
/// Telemetry failures are invisible to producers; these counters are the
/// only place they surface.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub enqueued: AtomicU64,
    pub exported: AtomicU64,
    /// Items shed because the mailbox was full
    pub dropped: AtomicU64,
    /// Items discarded because intake was already closed
    pub rejected: AtomicU64,
    pub batches_sent: AtomicU64,
    pub export_failures: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub exported: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub batches_sent: u64,
    pub export_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
        }
    }
}

/// Batching knobs for one pipeline instance
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub mailbox_capacity: usize,
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
}

/// Generic bounded-queue batching engine.
///
/// One background worker per instance; `enqueue` is the sole producer-side
/// synchronization point and never blocks beyond a bounded mailbox insert.
pub struct BatchPipeline<T> {
    mailbox: flume::Sender<T>,
    commands: mpsc::UnboundedSender<Command>,
    worker: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    stats: Arc<PipelineStats>,
    accepting: Arc<AtomicBool>,
    label: &'static str,
}

impl<T: Send + 'static> BatchPipeline<T> {
    /// Spawn the pipeline worker. Requires a running tokio runtime.
    pub fn spawn(
        label: &'static str,
        config: BatchConfig,
        resource: Arc<Resource>,
        exporter: Arc<dyn Exporter<T>>,
    ) -> Self {
        let (mailbox_tx, mailbox_rx) = flume::bounded(config.mailbox_capacity);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(PipelineStats::default());

        let worker = tokio::spawn(run_worker(
            label,
            config,
            resource,
            exporter,
            mailbox_rx,
            command_rx,
            Arc::clone(&stats),
        ));
        debug!(pipeline = label, "export worker spawned");

        Self {
            mailbox: mailbox_tx,
            commands: command_tx,
            worker: parking_lot::Mutex::new(Some(worker)),
            stats,
            accepting: Arc::new(AtomicBool::new(true)),
            label,
        }
    }

    /// Enqueue one finished item for export.
    ///
    /// Returns whether the item was accepted. Never blocks: a full mailbox
    /// sheds the item and increments the drop counter, and a closed intake
    /// (draining or stopped) rejects it. Neither case is an error from the
    /// producer's point of view.
    #[inline]
    pub fn enqueue(&self, item: T) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.mailbox.try_send(item) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(flume::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Force an immediate flush of the mailbox and any in-progress batch.
    /// Resolves once the exporter calls for the drained data have returned.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Close intake, drain and flush buffered items, and stop the worker.
    ///
    /// Returns `true` if the drain completed within `deadline`. On deadline
    /// expiry the worker is aborted and unflushed data is lost.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.accepting.store(false, Ordering::Release);

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_err() {
            // Worker already gone
            return true;
        }

        let drained = tokio::time::timeout(deadline, ack_rx).await.is_ok();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if drained {
                let _ = handle.await;
            } else {
                warn!(pipeline = self.label, "drain deadline exceeded, aborting worker");
                handle.abort();
            }
        }
        drained
    }

    /// Whether intake is currently open
    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

async fn run_worker<T: Send + 'static>(
    label: &'static str,
    config: BatchConfig,
    resource: Arc<Resource>,
    exporter: Arc<dyn Exporter<T>>,
    mailbox: flume::Receiver<T>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    stats: Arc<PipelineStats>,
) {
    let mut batch: Vec<T> = Vec::with_capacity(config.max_batch_size);
    // Armed when the first item of the current batch arrives
    let mut batch_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(Command::Flush(ack)) => {
                        drain_mailbox(&mailbox, &mut batch, config.max_batch_size, label, &resource, &exporter, &stats).await;
                        flush(&mut batch, label, &resource, &exporter, &stats).await;
                        batch_deadline = None;
                        let _ = ack.send(());
                    }
                    Some(Command::Shutdown(ack)) => {
                        drain_mailbox(&mailbox, &mut batch, config.max_batch_size, label, &resource, &exporter, &stats).await;
                        flush(&mut batch, label, &resource, &exporter, &stats).await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        flush(&mut batch, label, &resource, &exporter, &stats).await;
                        break;
                    }
                }
            }
            item = mailbox.recv_async() => {
                match item {
                    Ok(item) => {
                        if batch.is_empty() {
                            batch_deadline = Some(Instant::now() + config.batch_timeout);
                        }
                        batch.push(item);
                        // Soak up any burst already sitting in the mailbox
                        while batch.len() < config.max_batch_size {
                            match mailbox.try_recv() {
                                Ok(item) => batch.push(item),
                                Err(_) => break,
                            }
                        }
                        if batch.len() >= config.max_batch_size {
                            flush(&mut batch, label, &resource, &exporter, &stats).await;
                            batch_deadline = None;
                        }
                    }
                    Err(_) => {
                        // All producers dropped
                        flush(&mut batch, label, &resource, &exporter, &stats).await;
                        break;
                    }
                }
            }
            _ = {
                let deadline = batch_deadline;
                async move {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                }
            } => {
                flush(&mut batch, label, &resource, &exporter, &stats).await;
                batch_deadline = None;
            }
        }
    }
    debug!(pipeline = label, "export worker stopped");
}

/// Pull everything currently buffered in the mailbox, flushing full batches
/// along the way.
async fn drain_mailbox<T: Send + 'static>(
    mailbox: &flume::Receiver<T>,
    batch: &mut Vec<T>,
    max_batch_size: usize,
    label: &'static str,
    resource: &Arc<Resource>,
    exporter: &Arc<dyn Exporter<T>>,
    stats: &PipelineStats,
) {
    while let Ok(item) = mailbox.try_recv() {
        batch.push(item);
        if batch.len() >= max_batch_size {
            flush(batch, label, resource, exporter, stats).await;
        }
    }
}

/// Ship the in-progress batch. Empty batches are a no-op; a failed send is
/// logged once and the batch is discarded.
async fn flush<T: Send + 'static>(
    batch: &mut Vec<T>,
    label: &'static str,
    resource: &Arc<Resource>,
    exporter: &Arc<dyn Exporter<T>>,
    stats: &PipelineStats,
) {
    if batch.is_empty() {
        return;
    }
    let items = std::mem::take(batch);
    let count = items.len() as u64;
    let export = ExportBatch::new(Arc::clone(resource), items);

    match exporter.send(export).await {
        Ok(()) => {
            stats.exported.fetch_add(count, Ordering::Relaxed);
            stats.batches_sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            stats.export_failures.fetch_add(1, Ordering::Relaxed);
            warn!(pipeline = label, error = %err, items = count, "export failed, batch discarded");
        }
    }
}
