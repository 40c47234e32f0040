/*!
 * Pipeline Limits and Constants
 *
 * Centralized location for tuning values and defaults.
 * All values include rationale comments explaining WHY they exist.
 */

use std::time::Duration;

// =============================================================================
// EXPORT PIPELINE
// =============================================================================

/// Mailbox capacity between producers and the export worker (items)
/// Sized to absorb bursts; a full mailbox sheds load instead of blocking
/// [PERF] producers never wait on telemetry capacity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 2048;

/// Maximum items per export batch
/// Bounds exporter payload size and worker-side memory
pub const DEFAULT_BATCH_MAX_SIZE: usize = 512;

/// Maximum age of a partially filled batch before it is flushed
/// Caps delivery latency for low-throughput producers
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// METRICS
// =============================================================================

/// Interval between metric collection windows
/// Each tick snapshots the aggregation window and ships it as one batch
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(10);

/// Default histogram bucket upper bounds (milliseconds scale)
/// Matches common latency distributions from sub-ms to tens of seconds
pub const DEFAULT_HISTOGRAM_BOUNDARIES: &[f64] = &[
    0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0,
    10_000.0, 30_000.0,
];

// =============================================================================
// SAMPLING
// =============================================================================

/// Sampler rate for the development profile (capture everything)
pub const DEV_SAMPLE_RATE: f64 = 1.0;

/// Sampler rate for the production profile (one in ten traces)
pub const PROD_SAMPLE_RATE: f64 = 0.10;

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Default drain deadline for shutdown when the caller does not supply one
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);
