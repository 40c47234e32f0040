/*!
 * Export Module
 * Batch delivery of finished telemetry to a remote collector
 */

pub mod collect;
pub mod pipeline;

pub use pipeline::{BatchPipeline, PipelineStats, StatsSnapshot};

use crate::config::{Config, Environment};
use crate::core::errors::ExportError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Service identity stamped on every exported batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub service_name: String,
    pub service_version: String,
    pub environment: Environment,
}

impl Resource {
    pub fn from_config(config: &Config) -> Self {
        Self {
            service_name: config.service_name.clone(),
            service_version: config.service_version.clone(),
            environment: config.environment,
        }
    }
}

/// An ordered, bounded group of finished telemetry items delivered in one
/// exporter call. Owned by the pipeline; dropped once the call returns.
#[derive(Debug, Clone)]
pub struct ExportBatch<T> {
    pub resource: Arc<Resource>,
    pub items: Vec<T>,
}

impl<T> ExportBatch<T> {
    pub fn new(resource: Arc<Resource>, items: Vec<T>) -> Self {
        Self { resource, items }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Delivery capability consumed by the pipeline.
///
/// Assumed network-bound and potentially slow; the worker awaits each call
/// to completion before starting the next batch. A failed call discards
/// the batch; there is no retry.
pub trait Exporter<T>: Send + Sync + 'static {
    fn send(&self, batch: ExportBatch<T>) -> BoxFuture<'static, Result<(), ExportError>>;
}
