//! Error types for object storage.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an [`AssetStore`](super::AssetStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing a local file failed.
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The request never produced a response.
    #[error("request to object store failed: {0}")]
    Http(String),

    /// The store answered with an error status.
    #[error("{operation} {bucket}/{key} failed with HTTP {status}")]
    Status {
        operation: &'static str,
        bucket: String,
        key: String,
        status: u16,
    },

    /// The object does not exist.
    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    /// The credentials name an unusable endpoint.
    #[error("invalid store endpoint '{0}'")]
    InvalidEndpoint(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
