//! Worker telemetry.
//!
//! Lock-free counters updated by the worker loop and pipelines, read as a
//! point-in-time snapshot.
//!
//! ```text
//! WorkerLoop / Pipelines ─────► WorkerMetrics ─────► WorkerSnapshot ─────► logs
//!                               (atomic counters)    (plain copy)
//! ```

mod metrics;
mod snapshot;

pub use metrics::WorkerMetrics;
pub use snapshot::{FailureCounts, WorkerSnapshot};
