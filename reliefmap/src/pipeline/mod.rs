//! Job pipelines.
//!
//! A pipeline turns one decoded task into a rendered heightmap (and, for
//! batches, optionally an orthophoto) and records the outcome in the job
//! store. Both pipelines share one shape:
//!
//! ```text
//! processing ─► resolve sources ─► download ─► height field ─► render
//!                                                                 │
//!   delete sources ◄─ completed ◄─ upload ◄───────────────────────┘
//! ```
//!
//! Any failure before completion marks the job `failed` with the error
//! message and is returned to the worker loop. Local files live in a
//! [`ScratchSpace`] that is released on every exit path.

mod batch;
mod error;
mod scratch;
mod single;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::imagery::{ImageLimits, SUPPORTED_EXTENSIONS};
use crate::job::{JobResult, JobStateStore, JobStatus, StatusWrite};
use crate::storage::AssetStore;
use crate::task::{SourceLocation, TaskDescriptor, DEFAULT_KNOWN_BUCKETS};
use crate::BoxFuture;

pub use batch::BatchPipeline;
pub use error::{ErrorKind, PipelineError};
pub use scratch::ScratchSpace;
pub use single::SinglePipeline;

/// Key prefix of single-image heightmaps.
pub const SINGLE_RESULT_PREFIX: &str = "heightmaps";
/// Key prefix of batch heightmaps.
pub const BATCH_RESULT_PREFIX: &str = "batch-heightmaps";
/// Key prefix of orthophotos.
pub const ORTHOPHOTO_PREFIX: &str = "orthophotos";
/// Bucket receiving orthophotos unless configured otherwise.
pub const DEFAULT_ORTHOPHOTO_BUCKET: &str = "uav-photoplanes";
/// Longest side of batch images in fast mode.
pub const DEFAULT_FAST_MODE_MAX_SIDE: u32 = 2000;

/// Settings shared by both pipelines.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Parent of the per-job scratch directories.
    pub scratch_root: PathBuf,
    /// Bucket names recognised inside source URLs.
    pub known_buckets: Vec<String>,
    pub image_limits: ImageLimits,
    pub fast_mode_max_side: u32,
    pub orthophoto_bucket: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("reliefmap"),
            known_buckets: DEFAULT_KNOWN_BUCKETS.iter().map(|b| b.to_string()).collect(),
            image_limits: ImageLimits::default(),
            fast_mode_max_side: DEFAULT_FAST_MODE_MAX_SIDE,
            orthophoto_bucket: DEFAULT_ORTHOPHOTO_BUCKET.to_string(),
        }
    }
}

/// What a successful job produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    pub result_url: Option<String>,
    pub orthophoto_url: Option<String>,
    /// Rendered heightmap size.
    pub dimensions: Option<(u32, u32)>,
    pub elapsed: Duration,
    pub bytes_uploaded: u64,
}

/// A pipeline the worker loop can drive.
///
/// # Dyn Compatibility
///
/// `process` and `mark_failed` return [`BoxFuture`]; the associated task
/// type keeps the trait itself generic-only.
pub trait JobPipeline: Send + Sync + 'static {
    /// The message payload this pipeline consumes.
    type Task: TaskDescriptor + DeserializeOwned + Send + Sync + 'static;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Upper bound for the broker prefetch count, if the pipeline needs one.
    fn max_prefetch(&self) -> Option<u16> {
        None
    }

    /// Runs the job to completion.
    ///
    /// On error the job has already been marked failed. `abort` requests
    /// that long waits be abandoned.
    fn process<'a>(
        &'a self,
        task: &'a Self::Task,
        abort: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<JobOutcome, PipelineError>>;

    /// Marks a job failed outside of `process`, e.g. after a panic.
    fn mark_failed<'a>(&'a self, job_id: &'a str, message: &'a str) -> BoxFuture<'a, ()>;
}

/// Marks the job processing, runs `work` and marks the job failed if it errs.
pub(crate) async fn track_job<F>(
    jobs: &dyn JobStateStore,
    job_id: &str,
    work: F,
) -> Result<JobOutcome, PipelineError>
where
    F: Future<Output = Result<JobOutcome, PipelineError>>,
{
    let result = match jobs.set_status(job_id, JobStatus::Processing, None).await {
        Ok(write) => {
            if write == StatusWrite::Rejected {
                warn!(job_id = %job_id, "Job record did not accept processing status, continuing");
            }
            work.await
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &result {
        error!(job_id = %job_id, kind = e.kind().as_str(), error = %e, "Job failed");
        // A rejected result means the record is already failed; keep its message.
        if !matches!(e, PipelineError::ResultRejected(_)) {
            record_failure(jobs, job_id, &e.to_string()).await;
        }
    }
    result
}

/// Records a completed result.
///
/// # Errors
///
/// [`PipelineError::ResultRejected`] when the record is already failed.
pub(crate) async fn record_result(
    jobs: &dyn JobStateStore,
    job_id: &str,
    result: &JobResult,
) -> Result<(), PipelineError> {
    match jobs.set_result(job_id, result).await? {
        StatusWrite::Applied => Ok(()),
        StatusWrite::Rejected => Err(PipelineError::ResultRejected(job_id.to_string())),
    }
}

/// Best-effort failed-status write.
pub(crate) async fn record_failure(jobs: &dyn JobStateStore, job_id: &str, message: &str) {
    match jobs.set_status(job_id, JobStatus::Failed, Some(message)).await {
        Ok(StatusWrite::Applied) => {}
        Ok(StatusWrite::Rejected) => {
            warn!(job_id = %job_id, "Job record did not accept failed status")
        }
        Err(e) => error!(job_id = %job_id, error = %e, "Failed to record job failure"),
    }
}

/// Runs CPU-bound work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Aborted(e.to_string()))?
}

/// Local name for the `index`th input, keeping a usable image extension.
pub(crate) fn input_file_name(index: usize, location: &SourceLocation) -> String {
    let ext = Path::new(location.file_name())
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| "jpg".to_string());
    format!("input_{}.{}", index, ext)
}

/// Downloads every source into the scratch space, stopping at the first failure.
pub(crate) async fn download_inputs(
    store: &dyn AssetStore,
    sources: &[SourceLocation],
    scratch: &ScratchSpace,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let dest = scratch.file(&input_file_name(index, source));
        store.download(&source.bucket, &source.key, &dest).await?;
        paths.push(dest);
    }
    info!(count = paths.len(), "Downloaded inputs");
    Ok(paths)
}

/// Uploads a local file and returns its public URL and size.
pub(crate) async fn publish(
    store: &dyn AssetStore,
    src: &Path,
    bucket: &str,
    key: &str,
    public_host: Option<&str>,
) -> Result<(String, u64), PipelineError> {
    let bytes = tokio::fs::metadata(src)
        .await
        .map_err(|e| PipelineError::io(src, e))?
        .len();
    let stored = store.upload(src, bucket, key).await?;
    let url = store.generate_url(bucket, &stored, public_host);
    info!(bucket = %bucket, key = %stored, bytes, "Uploaded result");
    Ok((url, bytes))
}

/// Deletes the sources of a completed job, logging failures.
pub(crate) async fn delete_sources(store: &dyn AssetStore, sources: &[SourceLocation]) {
    for source in sources {
        if let Err(e) = store.delete(&source.bucket, &source.key).await {
            warn!(bucket = %source.bucket, key = %source.key, error = %e, "Failed to delete source object");
        }
    }
}
