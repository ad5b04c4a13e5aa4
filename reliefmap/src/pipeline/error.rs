//! Error types for job pipelines.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::dem::DemError;
use crate::depth::DepthError;
use crate::engine::EngineError;
use crate::imagery::ImageryError;
use crate::job::JobStoreError;
use crate::relief::RenderError;
use crate::storage::StorageError;
use crate::task::TaskError;

/// Failure categories that decide how a failure is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Broker, object store or database connection problems.
    Transport,
    /// Bad, missing or out-of-bounds input.
    Validation,
    /// The photogrammetry engine or depth estimator failed.
    Engine,
    /// The raster could not be rendered or saved.
    Render,
    /// Anything else, including panics.
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Validation => "validation",
            Self::Engine => "engine",
            Self::Render => "render",
            Self::Unexpected => "unexpected",
        }
    }
}

/// Errors that fail a job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Imagery(#[from] ImageryError),

    #[error("depth estimation failed: {0}")]
    Depth(#[from] DepthError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to read DEM: {0}")]
    Dem(#[from] DemError),

    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("job store error: {0}")]
    JobStore(#[from] JobStoreError),

    /// Scratch space handling failed.
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The job record was already terminal and refused the result.
    #[error("job '{0}' is already terminal; result not recorded")]
    ResultRejected(String),

    /// A blocking worker thread panicked or was cancelled.
    #[error("processing task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Task(_) | Self::Imagery(_) => ErrorKind::Validation,
            Self::Storage(StorageError::NotFound { .. }) => ErrorKind::Validation,
            Self::Storage(StorageError::Io { .. }) => ErrorKind::Unexpected,
            Self::Storage(_) | Self::JobStore(_) => ErrorKind::Transport,
            Self::ResultRejected(_) => ErrorKind::Validation,
            Self::Depth(_) => ErrorKind::Engine,
            Self::Engine(EngineError::Io { .. }) => ErrorKind::Unexpected,
            Self::Engine(_) => ErrorKind::Engine,
            Self::Dem(_) | Self::Render(_) => ErrorKind::Render,
            Self::Io { .. } | Self::Aborted(_) => ErrorKind::Unexpected,
        }
    }
}
