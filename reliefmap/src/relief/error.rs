//! Error types for relief rendering.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or rendering a raster.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The raster has no pixels.
    #[error("raster is empty ({width}x{height})")]
    EmptyRaster { width: u32, height: u32 },

    /// Value or mask length does not match the declared dimensions.
    #[error("raster buffer holds {actual} cells, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Every cell is masked out.
    #[error("raster contains no valid data")]
    NoValidData,

    /// Encoding the rendered image failed.
    #[error("failed to encode relief image: {0}")]
    Encode(#[from] image::ImageError),

    /// Writing the rendered image failed.
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}
