//! Depth estimation.
//!
//! The depth model is an opaque capability: it maps an RGB image to a field
//! of relative inverse depth (larger = closer to the camera). For aerial
//! imagery closer means higher, so the height field is the inverted,
//! min-max normalized depth.

mod error;
mod remote;

use image::{GrayImage, RgbImage};

use crate::BoxFuture;

pub use error::DepthError;
pub use remote::RemoteDepthEstimator;

/// Relative inverse depth, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, DepthError> {
        let expected = width as usize * height as usize;
        if expected == 0 || values.len() != expected {
            return Err(DepthError::InvalidOutput(format!(
                "{} values for a {}x{} map",
                values.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }
}

/// Estimates depth for a single image.
pub trait DepthEstimator: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produces a depth map with the same dimensions as `image`.
    fn estimate<'a>(&'a self, image: &'a RgbImage) -> BoxFuture<'a, Result<DepthMap, DepthError>>;
}

/// Converts relative inverse depth to an 8-bit height field.
///
/// Values are min-max scaled to 0..=255 (truncated), then inverted. A flat
/// map scales to 0 and therefore inverts to 255. Non-finite values are
/// treated as the minimum.
pub fn to_height_field(depth: &DepthMap) -> GrayImage {
    let finite = depth.values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let range = max - min;
    let scale = if range.is_finite() && range > 0.0 {
        255.0 / range as f64
    } else {
        0.0
    };

    let data = depth
        .values
        .iter()
        .map(|&v| {
            let scaled = if v.is_finite() {
                ((v - min) as f64 * scale).clamp(0.0, 255.0) as u8
            } else {
                0
            };
            255 - scaled
        })
        .collect();

    GrayImage::from_raw(depth.width, depth.height, data)
        .unwrap_or_else(|| GrayImage::new(depth.width, depth.height))
}
