//! Engine task life cycle: submit, poll until terminal, fetch results.
//!
//! ```text
//! submit ──► task id ──► poll ─┬─ code 40 ─────────► Completed ──► download_results
//!                              ├─ code 30 / 50 ────► TaskFailed
//!                              ├─ deadline elapsed ► Timeout
//!                              └─ abort token ─────► Cancelled
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::Builder;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::archive::{AssetPattern, ResultArchive};
use super::error::EngineError;
use super::options::{options_json, EngineOption};
use super::transport::EngineTransport;

/// Status code of a completed task.
pub const STATUS_COMPLETED: i64 = 40;
/// Status code of a failed task.
pub const STATUS_FAILED: i64 = 30;
/// Status code of a canceled task.
pub const STATUS_CANCELED: i64 = 50;

/// Name of the combined results archive.
pub const ALL_ASSETS: &str = "all.zip";

/// Default seconds between status checks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
/// Default seconds before polling gives up.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

/// Polling cadence and deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

/// Coarse task state derived from the engine's status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(STATUS_COMPLETED) => Self::Completed,
            Some(STATUS_FAILED) | Some(STATUS_CANCELED) => Self::Failed,
            _ => Self::Running,
        }
    }
}

/// The parts of a task info document the client acts on.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskInfo {
    pub code: Option<i64>,
    pub progress: f64,
    pub error_message: Option<String>,
}

impl TaskInfo {
    pub fn from_json(doc: &Value) -> Self {
        let status = doc.get("status");
        Self {
            code: status.and_then(|s| s.get("code")).and_then(Value::as_i64),
            progress: doc.get("progress").and_then(Value::as_f64).unwrap_or(0.0),
            error_message: status
                .and_then(|s| s.get("errorMessage"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_code(self.code)
    }
}

/// Drives one engine task at a time over an [`EngineTransport`].
pub struct EngineClient {
    transport: Arc<dyn EngineTransport>,
    policy: PollPolicy,
}

impl EngineClient {
    pub fn new(transport: Arc<dyn EngineTransport>) -> Self {
        Self::with_policy(transport, PollPolicy::default())
    }

    pub fn with_policy(transport: Arc<dyn EngineTransport>, policy: PollPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Creates a task and returns its identifier.
    ///
    /// # Errors
    ///
    /// [`EngineError::Submission`] when the engine rejects the request or
    /// its answer carries no `uuid`.
    pub async fn submit(
        &self,
        images: &[PathBuf],
        options: &[EngineOption],
    ) -> Result<String, EngineError> {
        info!(images = images.len(), options = options.len(), "Submitting engine task");
        let response = match self
            .transport
            .create_task(images, &options_json(options))
            .await
        {
            Ok(response) => response,
            Err(e @ (EngineError::Submission(_) | EngineError::Io { .. })) => return Err(e),
            Err(e) => return Err(EngineError::Submission(e.to_string())),
        };

        match response.get("uuid").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                info!(task_id = %id, "Engine task created");
                Ok(id.to_string())
            }
            _ => Err(EngineError::Submission(format!(
                "response carries no task id: {}",
                response
            ))),
        }
    }

    /// Fetches the task's current state once.
    pub async fn status(&self, task_id: &str) -> Result<TaskInfo, EngineError> {
        let doc = self.transport.task_info(task_id).await?;
        Ok(TaskInfo::from_json(&doc))
    }

    /// Polls until the task completes.
    ///
    /// Transient request failures are logged and retried on the next tick.
    /// The `abort` token is checked at every wait.
    pub async fn poll(
        &self,
        task_id: &str,
        abort: &CancellationToken,
    ) -> Result<TaskInfo, EngineError> {
        let started = Instant::now();
        let deadline = started + self.policy.timeout;

        loop {
            if abort.is_cancelled() {
                return Err(EngineError::Cancelled {
                    task_id: task_id.to_string(),
                });
            }

            match self.status(task_id).await {
                Ok(info) => match info.state() {
                    TaskState::Completed => {
                        info!(
                            task_id = %task_id,
                            elapsed_secs = started.elapsed().as_secs(),
                            "Engine task completed"
                        );
                        return Ok(info);
                    }
                    TaskState::Failed => {
                        return Err(EngineError::TaskFailed {
                            task_id: task_id.to_string(),
                            code: info.code.unwrap_or_default(),
                            message: info
                                .error_message
                                .unwrap_or_else(|| "unknown error".to_string()),
                        });
                    }
                    TaskState::Running => {
                        debug!(task_id = %task_id, code = ?info.code, progress = info.progress, "Engine task running");
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(task_id = %task_id, error = %e, "Engine status check failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::Timeout {
                    task_id: task_id.to_string(),
                    waited: now - started,
                });
            }
            let wake = (now + self.policy.interval).min(deadline);

            tokio::select! {
                _ = abort.cancelled() => {
                    return Err(EngineError::Cancelled { task_id: task_id.to_string() });
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Downloads the combined results archive into `scratch_dir`.
    pub async fn download_results(
        &self,
        task_id: &str,
        scratch_dir: &Path,
    ) -> Result<ResultArchive, EngineError> {
        let file = Builder::new()
            .prefix("results-")
            .suffix(".zip")
            .tempfile_in(scratch_dir)
            .map_err(|e| EngineError::io(scratch_dir, e))?;
        self.transport
            .download(task_id, ALL_ASSETS, file.path())
            .await?;
        Ok(ResultArchive::new(file))
    }

    /// Downloads the results and extracts the entry matching `pattern`.
    pub async fn fetch_asset(
        &self,
        task_id: &str,
        pattern: &AssetPattern,
        dest: &Path,
        scratch_dir: &Path,
    ) -> Result<String, EngineError> {
        let archive = self.download_results(task_id, scratch_dir).await?;
        archive.extract(pattern, dest)
    }
}
