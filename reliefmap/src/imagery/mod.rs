//! Input imagery: loading, validation and resizing.
//!
//! - [`load_rgb`]: decode with EXIF orientation applied
//! - [`ImageLimits::validate`]: dimension bounds for single-image jobs
//! - [`resize_to_fit`]: downscale so the longest side fits
//! - [`downscale_jpeg_in_place`]: fast-mode reduction keeping EXIF
//! - [`summarize_gps`]: diagnostics over a batch

mod downscale;
mod error;
mod gps;

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use tracing::info;

pub use downscale::{downscale_jpeg_in_place, extract_exif_segment, DownscaleOutcome, FAST_MODE_JPEG_QUALITY};
pub use error::ImageryError;
pub use gps::{read_gps, summarize_gps, GpsCoordinates, GpsSummary};

/// Extensions accepted as source imagery.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Largest source file accepted.
pub const MAX_FILE_BYTES: u64 = 500 * 1024 * 1024;

/// Dimension bounds for single-image jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageLimits {
    /// Smallest accepted side.
    pub min_side: u32,
    /// Largest accepted side.
    pub max_side: u32,
    /// Longest side fed to depth estimation; larger images are downscaled.
    pub working_side: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            min_side: 100,
            max_side: 8000,
            working_side: 4000,
        }
    }
}

impl ImageLimits {
    /// Checks decoded dimensions against the bounds.
    pub fn validate(&self, width: u32, height: u32) -> Result<(), ImageryError> {
        let kind = if width < self.min_side || height < self.min_side {
            "too small"
        } else if width > self.max_side || height > self.max_side {
            "too large"
        } else {
            return Ok(());
        };
        Err(ImageryError::Dimensions {
            kind,
            width,
            height,
            min: self.min_side,
            max: self.max_side,
        })
    }
}

/// Checks extension and size of a source file before decoding.
pub fn check_image_file(path: &Path) -> Result<u64, ImageryError> {
    let unsupported = |reason: String| ImageryError::UnsupportedFile {
        path: path.to_path_buf(),
        reason,
    };

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(unsupported(format!("unsupported format '.{}'", ext)));
    }

    let size = std::fs::metadata(path)
        .map_err(|e| ImageryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    if size == 0 {
        return Err(unsupported("file is empty".to_string()));
    }
    if size > MAX_FILE_BYTES {
        return Err(unsupported(format!(
            "file too large: {:.2}MB",
            size as f64 / (1024.0 * 1024.0)
        )));
    }
    Ok(size)
}

/// Decodes an image as RGB, applying its EXIF orientation.
pub fn load_rgb(path: &Path) -> Result<RgbImage, ImageryError> {
    let decode_err = |source| ImageryError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .map_err(|e| ImageryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?
        .with_guessed_format()
        .map_err(|e| ImageryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut decoder = reader.into_decoder().map_err(decode_err)?;
    let orientation = decoder.orientation().map_err(decode_err)?;
    let mut image = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    image.apply_orientation(orientation);

    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "Loaded image"
    );
    Ok(image.to_rgb8())
}

/// Target size when scaling `(width, height)` so its longest side is `max_side`.
///
/// Returns `None` when the image already fits.
pub fn fit_dimensions(width: u32, height: u32, max_side: u32) -> Option<(u32, u32)> {
    if width <= max_side && height <= max_side {
        return None;
    }
    let scale = (max_side as f64 / width as f64).min(max_side as f64 / height as f64);
    Some((
        ((width as f64 * scale) as u32).max(1),
        ((height as f64 * scale) as u32).max(1),
    ))
}

/// Downscales so the longest side is at most `max_side`.
///
/// Uses a triangle (area-averaging) filter; images that already fit are
/// returned unchanged.
pub fn resize_to_fit(image: RgbImage, max_side: u32) -> RgbImage {
    match fit_dimensions(image.width(), image.height(), max_side) {
        Some((w, h)) => {
            info!(
                from_width = image.width(),
                from_height = image.height(),
                to_width = w,
                to_height = h,
                "Resizing image"
            );
            image::imageops::resize(&image, w, h, FilterType::Triangle)
        }
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_limits() {
        let limits = ImageLimits::default();
        assert!(limits.validate(100, 8000).is_ok());
        assert!(matches!(
            limits.validate(99, 500),
            Err(ImageryError::Dimensions { kind: "too small", .. })
        ));
        assert!(matches!(
            limits.validate(8001, 500),
            Err(ImageryError::Dimensions { kind: "too large", .. })
        ));
    }

    #[test]
    fn test_fit_dimensions() {
        assert_eq!(fit_dimensions(4000, 3000, 4000), None);
        assert_eq!(fit_dimensions(8000, 6000, 4000), Some((4000, 3000)));
        assert_eq!(fit_dimensions(3000, 6000, 2000), Some((1000, 2000)));
    }

    #[test]
    fn test_resize_to_fit() {
        let img = RgbImage::new(500, 250);
        let out = resize_to_fit(img, 200);
        assert_eq!(out.dimensions(), (200, 100));
    }

    #[test]
    fn test_check_image_file() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("a.jpg");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            check_image_file(&empty),
            Err(ImageryError::UnsupportedFile { .. })
        ));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert!(check_image_file(&text).is_err());

        let ok = dir.path().join("b.JPG");
        std::fs::write(&ok, b"xx").unwrap();
        assert_eq!(check_image_file(&ok).unwrap(), 2);
    }

    #[test]
    fn test_load_rgb_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.png");
        RgbImage::from_pixel(120, 110, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let img = load_rgb(&path).unwrap();
        assert_eq!(img.dimensions(), (120, 110));
        assert_eq!(img.get_pixel(0, 0), &image::Rgb([1, 2, 3]));
    }

    #[test]
    fn test_load_rgb_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(load_rgb(&path).is_err());
    }
}
