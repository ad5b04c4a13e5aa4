//! Error types for the photogrammetry engine client.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while driving an engine task.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected the task or returned no identifier.
    #[error("engine task submission failed: {0}")]
    Submission(String),

    /// No terminal status was observed before the deadline.
    #[error("engine task {task_id} did not finish within {}s", .waited.as_secs())]
    Timeout { task_id: String, waited: Duration },

    /// The engine reported the task as failed or canceled.
    #[error("engine task {task_id} failed with status {code}: {message}")]
    TaskFailed {
        task_id: String,
        code: i64,
        message: String,
    },

    /// Polling was aborted by the caller.
    #[error("engine task {task_id} was abandoned by the worker")]
    Cancelled { task_id: String },

    /// The result archive holds no entry matching the pattern.
    #[error("no entry matching {pattern} in engine results")]
    AssetNotFound { pattern: String },

    /// The request never produced a response.
    #[error("engine request failed: {0}")]
    Transport(String),

    /// The engine answered with an error status.
    #[error("engine returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// The engine's answer could not be interpreted.
    #[error("unexpected engine response: {0}")]
    Protocol(String),

    /// The result archive is corrupt.
    #[error("invalid result archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Local file handling failed.
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Protocol(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
