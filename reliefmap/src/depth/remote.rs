//! Depth estimation through an HTTP inference sidecar.
//!
//! The sidecar accepts `POST {base}/predict` with a PNG body and answers
//! with a single-band image (16-bit PNG or 32-bit float TIFF) of relative
//! inverse depth. Output that does not match the input size is resampled
//! bicubically.

use std::io::Cursor;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, ImageFormat, Luma, RgbImage};
use reqwest::Client;
use tracing::{debug, info};

use crate::BoxFuture;

use super::error::DepthError;
use super::{DepthEstimator, DepthMap};

/// Default inference timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Estimator backed by a remote model server.
pub struct RemoteDepthEstimator {
    client: Client,
    endpoint: String,
}

impl RemoteDepthEstimator {
    pub fn new(base_url: &str) -> Result<Self, DepthError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, DepthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DepthError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    async fn infer(&self, image: &RgbImage) -> Result<DepthMap, DepthError> {
        let mut body = Vec::new();
        image.write_to(&mut Cursor::new(&mut body), ImageFormat::Png)?;
        debug!(
            endpoint = %self.endpoint,
            width = image.width(),
            height = image.height(),
            bytes = body.len(),
            "Requesting depth estimate"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "image/png")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DepthError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;

        let decoded = image::load_from_memory(&bytes)?.to_luma32f();
        let (width, height) = image.dimensions();
        let depth = if decoded.dimensions() != (width, height) {
            info!(
                from_width = decoded.width(),
                from_height = decoded.height(),
                to_width = width,
                to_height = height,
                "Resampling depth output to input size"
            );
            resample(&decoded, width, height)
        } else {
            decoded
        };

        DepthMap::new(width, height, depth.into_raw())
    }
}

fn resample(
    src: &ImageBuffer<Luma<f32>, Vec<f32>>,
    width: u32,
    height: u32,
) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    imageops::resize(src, width, height, FilterType::CatmullRom)
}

impl DepthEstimator for RemoteDepthEstimator {
    fn name(&self) -> &str {
        "remote"
    }

    fn estimate<'a>(&'a self, image: &'a RgbImage) -> BoxFuture<'a, Result<DepthMap, DepthError>> {
        Box::pin(self.infer(image))
    }
}
