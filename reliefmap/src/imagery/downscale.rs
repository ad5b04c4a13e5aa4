//! Fast-mode downscaling that keeps EXIF metadata.
//!
//! The photogrammetry engine relies on EXIF (camera model, focal length,
//! GPS) and orientation. Re-encoding through the `image` crate drops all
//! metadata, so the original APP1 `Exif` segment is copied into the new
//! JPEG stream right after its SOI/APP0 header.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use tracing::{debug, info};

use super::error::ImageryError;
use super::fit_dimensions;

/// JPEG quality used when re-encoding.
pub const FAST_MODE_JPEG_QUALITY: u8 = 85;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// What [`downscale_jpeg_in_place`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownscaleOutcome {
    /// The image already fit.
    Unchanged { width: u32, height: u32 },
    /// The file is not a JPEG and was left as is.
    NotJpeg,
    /// The file was rewritten.
    Resized {
        from: (u32, u32),
        to: (u32, u32),
        exif_preserved: bool,
    },
}

/// Returns the complete APP1 Exif segment (marker, length and payload).
pub fn extract_exif_segment(jpeg: &[u8]) -> Option<&[u8]> {
    if !jpeg.starts_with(&SOI) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != 0xFF {
            return None;
        }
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        if marker == SOS || marker == EOI {
            return None;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return None;
        }
        if marker == APP1 && jpeg[pos + 4..end].starts_with(EXIF_HEADER) {
            return Some(&jpeg[pos..end]);
        }
        pos = end;
    }
    None
}

/// Inserts `segment` after the SOI marker and any leading APP0 segment.
fn splice_segment(jpeg: &[u8], segment: &[u8]) -> Vec<u8> {
    let mut insert_at = 2;
    if jpeg.len() >= 6 && jpeg[2] == 0xFF && jpeg[3] == APP0 {
        let len = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        if 2 + 2 + len <= jpeg.len() {
            insert_at = 4 + len;
        }
    }

    let mut out = Vec::with_capacity(jpeg.len() + segment.len());
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(segment);
    out.extend_from_slice(&jpeg[insert_at..]);
    out
}

/// Downscales the JPEG at `path` so its longest side is `max_side`,
/// rewriting it with the original EXIF segment.
///
/// Files that do not start with a JPEG SOI marker are never rewritten.
pub fn downscale_jpeg_in_place(path: &Path, max_side: u32) -> Result<DownscaleOutcome, ImageryError> {
    let io_err = |source| ImageryError::Io {
        path: path.to_path_buf(),
        source,
    };

    let original = std::fs::read(path).map_err(io_err)?;
    if !original.starts_with(&SOI) {
        debug!(path = %path.display(), "Not a JPEG, skipping downscale");
        return Ok(DownscaleOutcome::NotJpeg);
    }
    let image = ImageReader::new(Cursor::new(&original))
        .with_guessed_format()
        .map_err(io_err)?
        .decode()
        .map_err(|source| ImageryError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let from = (image.width(), image.height());
    let Some(to) = fit_dimensions(from.0, from.1, max_side) else {
        debug!(path = %path.display(), width = from.0, height = from.1, "No resize needed");
        return Ok(DownscaleOutcome::Unchanged {
            width: from.0,
            height: from.1,
        });
    };

    let resized = image.resize_exact(to.0, to.1, FilterType::Lanczos3).to_rgb8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, FAST_MODE_JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|source| ImageryError::Encode {
            path: path.to_path_buf(),
            source,
        })?;

    let exif = extract_exif_segment(&original);
    let output = match exif {
        Some(segment) => splice_segment(&encoded, segment),
        None => encoded,
    };
    std::fs::write(path, &output).map_err(io_err)?;

    info!(
        path = %path.display(),
        from = ?from,
        to = ?to,
        exif = exif.is_some(),
        "Downscaled image"
    );
    Ok(DownscaleOutcome::Resized {
        from,
        to,
        exif_preserved: exif.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use tempfile::TempDir;

    use super::*;

    fn exif_app1() -> Vec<u8> {
        // Minimal big-endian TIFF header with an empty IFD
        let mut payload = EXIF_HEADER.to_vec();
        payload.extend_from_slice(&[b'M', b'M', 0, 42, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0]);
        let len = (payload.len() + 2) as u16;
        let mut seg = vec![0xFF, APP1];
        seg.extend_from_slice(&len.to_be_bytes());
        seg.extend_from_slice(&payload);
        seg
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 90)
            .encode_image(&RgbImage::from_pixel(width, height, image::Rgb([80, 120, 160])))
            .unwrap();
        buf
    }

    #[test]
    fn test_extract_and_splice_round_trip() {
        let plain = jpeg(16, 16);
        assert!(extract_exif_segment(&plain).is_none());

        let segment = exif_app1();
        let tagged = splice_segment(&plain, &segment);
        assert_eq!(extract_exif_segment(&tagged), Some(segment.as_slice()));
        assert!(image::load_from_memory(&tagged).is_ok());
    }

    #[test]
    fn test_extract_rejects_non_jpeg() {
        assert!(extract_exif_segment(b"\x89PNG....").is_none());
        assert!(extract_exif_segment(&[0xFF, 0xD8, 0xFF]).is_none());
    }

    #[test]
    fn test_downscale_keeps_exif() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input_0.jpg");
        std::fs::write(&path, splice_segment(&jpeg(300, 150), &exif_app1())).unwrap();

        let outcome = downscale_jpeg_in_place(&path, 100).unwrap();
        assert_eq!(
            outcome,
            DownscaleOutcome::Resized {
                from: (300, 150),
                to: (100, 50),
                exif_preserved: true,
            }
        );

        let rewritten = std::fs::read(&path).unwrap();
        assert_eq!(extract_exif_segment(&rewritten), Some(exif_app1().as_slice()));
        let decoded = image::load_from_memory(&rewritten).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_small_image_is_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.jpg");
        let bytes = jpeg(50, 40);
        std::fs::write(&path, &bytes).unwrap();

        let outcome = downscale_jpeg_in_place(&path, 100).unwrap();
        assert_eq!(outcome, DownscaleOutcome::Unchanged { width: 50, height: 40 });
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_oversized_png_is_left_as_is() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input_0.png");
        RgbImage::from_pixel(300, 150, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let outcome = downscale_jpeg_in_place(&path, 100).unwrap();
        assert_eq!(outcome, DownscaleOutcome::NotJpeg);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }
}
