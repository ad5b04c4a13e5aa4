//! Error types for task decoding and validation.

use thiserror::Error;

/// Errors raised while decoding or validating a task descriptor.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The message body is not a valid task document.
    #[error("malformed task message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required field is missing or empty.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The batch has too few or too many images.
    #[error("batch must contain between {min} and {max} images, got {count}")]
    ImageCount { count: usize, min: usize, max: usize },

    /// A source location could not be turned into a bucket/object pair.
    #[error("invalid source location '{url}': {reason}")]
    InvalidLocation { url: String, reason: String },
}
