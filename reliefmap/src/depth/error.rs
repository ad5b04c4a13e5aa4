//! Error types for depth estimation.

use thiserror::Error;

/// Errors raised by a [`DepthEstimator`](super::DepthEstimator).
#[derive(Debug, Error)]
pub enum DepthError {
    /// The estimator could not be reached.
    #[error("depth estimator request failed: {0}")]
    Http(String),

    /// The estimator answered with an error status.
    #[error("depth estimator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Encoding the request image or decoding the response failed.
    #[error("depth image codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// The estimator returned something that is not a depth map.
    #[error("invalid depth output: {0}")]
    InvalidOutput(String),
}

impl From<reqwest::Error> for DepthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}
