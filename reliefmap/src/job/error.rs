//! Error types for job state persistence.

use thiserror::Error;

/// Errors raised by a [`JobStateStore`](super::JobStateStore).
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// The database rejected or failed the statement.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No record exists for the job id.
    #[error("job '{0}' not found")]
    NotFound(String),
}
