/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to telemetry producers.
///
/// None of these ever propagate into the host operation's result path;
/// they are reported to the instrumenting caller and the pipeline keeps
/// running.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TelemetryError {
    #[error("Caller misuse: {0}")]
    #[diagnostic(
        code(telemetry::caller_misuse),
        help("The instrumentation call violated an API contract. The operation was not applied.")
    )]
    CallerMisuse(String),

    #[error("Export failed: {0}")]
    #[diagnostic(
        code(telemetry::export_failure),
        help("The batch was discarded. Check collector connectivity and exporter logs.")
    )]
    ExportFailure(String),

    #[error("Shutdown deadline of {deadline_ms}ms exceeded")]
    #[diagnostic(
        code(telemetry::shutdown_timeout),
        help("Unflushed telemetry was lost. Consider a longer drain deadline.")
    )]
    ShutdownTimeout { deadline_ms: u64 },

    #[error("Pipeline is not running (state: {0})")]
    #[diagnostic(
        code(telemetry::not_running),
        help("start() must complete before producers can enqueue.")
    )]
    NotRunning(String),
}

/// Error returned by an exporter's send call.
///
/// The pipeline treats exporters as opaque: any failure discards the batch
/// after logging it once. There is no retry in the base design.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ExportError {
    #[error("Collector rejected the batch: {0}")]
    #[diagnostic(code(export::rejected))]
    Rejected(String),

    #[error("Transport failure: {0}")]
    #[diagnostic(code(export::transport))]
    Transport(String),

    #[error("Export timed out after {elapsed_ms}ms")]
    #[diagnostic(code(export::timeout))]
    Timeout { elapsed_ms: u64 },
}

impl From<ExportError> for TelemetryError {
    fn from(err: ExportError) -> Self {
        TelemetryError::ExportFailure(err.to_string())
    }
}
