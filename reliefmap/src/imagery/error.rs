//! Error types for input imagery handling.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or preparing input images.
#[derive(Debug, Error)]
pub enum ImageryError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The file is not a decodable image.
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    /// Encoding a derived image failed.
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },

    /// The file is unsuitable before decoding (extension, size).
    #[error("{path}: {reason}")]
    UnsupportedFile { path: PathBuf, reason: String },

    /// Decoded dimensions fall outside the accepted bounds.
    #[error("image {kind}: {width}x{height} (allowed {min}..={max} px per side)")]
    Dimensions {
        kind: &'static str,
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },
}
