//! The job state persistence seam.

use crate::BoxFuture;

use super::error::JobStoreError;
use super::record::{JobResult, JobStatus};

/// Whether a status write changed the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusWrite {
    /// The record now carries the requested status.
    Applied,
    /// The record was terminal (or missing) and kept its status.
    Rejected,
}

/// Persisted job records, keyed by job id.
///
/// All writes are idempotent overwrites, so a redelivered message may replay
/// them safely. Status-only writes never move a record out of a terminal
/// state. A result write completes the job unless it has already failed.
///
/// # Dyn Compatibility
///
/// Methods return [`BoxFuture`] so pipelines can hold `Arc<dyn JobStateStore>`.
pub trait JobStateStore: Send + Sync {
    /// Sets the job status, recording `error` as the error message.
    fn set_status<'a>(
        &'a self,
        job_id: &'a str,
        status: JobStatus,
        error: Option<&'a str>,
    ) -> BoxFuture<'a, Result<StatusWrite, JobStoreError>>;

    /// Marks the job completed with its result.
    fn set_result<'a>(
        &'a self,
        job_id: &'a str,
        result: &'a JobResult,
    ) -> BoxFuture<'a, Result<StatusWrite, JobStoreError>>;
}
