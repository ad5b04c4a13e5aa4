//! GPS metadata diagnostics.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use exif::{In, Reader, Tag, Value};
use tracing::debug;

/// Position read from an image's EXIF GPS block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// How many images of a batch carry GPS coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpsSummary {
    pub with_gps: usize,
    pub total: usize,
}

impl GpsSummary {
    pub fn none_tagged(&self) -> bool {
        self.with_gps == 0
    }

    pub fn all_tagged(&self) -> bool {
        self.total > 0 && self.with_gps == self.total
    }
}

fn dms_to_degrees(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(parts) if parts.len() >= 3 => Some(
            parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0,
        ),
        _ => None,
    }
}

fn first_ascii(value: &Value) -> Option<u8> {
    match value {
        Value::Ascii(strings) => strings.first().and_then(|s| s.first().copied()),
        _ => None,
    }
}

/// Reads GPS coordinates; `None` when the file has no usable GPS block.
pub fn read_gps(path: &Path) -> Option<GpsCoordinates> {
    let file = File::open(path).ok()?;
    let exif = match Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No EXIF data");
            return None;
        }
    };

    let field = |tag| exif.get_field(tag, In::PRIMARY).map(|f| &f.value);

    let mut latitude = dms_to_degrees(field(Tag::GPSLatitude)?)?;
    let mut longitude = dms_to_degrees(field(Tag::GPSLongitude)?)?;
    if field(Tag::GPSLatitudeRef).and_then(first_ascii) == Some(b'S') {
        latitude = -latitude;
    }
    if field(Tag::GPSLongitudeRef).and_then(first_ascii) == Some(b'W') {
        longitude = -longitude;
    }

    let altitude = match field(Tag::GPSAltitude) {
        Some(Value::Rational(parts)) if !parts.is_empty() && parts[0].denom != 0 => {
            parts[0].to_f64()
        }
        _ => 0.0,
    };

    Some(GpsCoordinates {
        latitude,
        longitude,
        altitude,
    })
}

/// Counts images carrying GPS coordinates.
pub fn summarize_gps(paths: &[PathBuf]) -> GpsSummary {
    GpsSummary {
        with_gps: paths.iter().filter(|p| read_gps(p).is_some()).count(),
        total: paths.len(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_untagged_images_have_no_gps() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.png");
        image::RgbImage::new(4, 4).save(&a).unwrap();
        let missing = dir.path().join("missing.jpg");

        assert_eq!(read_gps(&a), None);
        let summary = summarize_gps(&[a, missing]);
        assert_eq!(summary, GpsSummary { with_gps: 0, total: 2 });
        assert!(summary.none_tagged());
        assert!(!summary.all_tagged());
    }

    #[test]
    fn test_dms_conversion() {
        let value = Value::Rational(vec![
            exif::Rational { num: 52, denom: 1 },
            exif::Rational { num: 30, denom: 1 },
            exif::Rational { num: 36, denom: 1 },
        ]);
        assert!((dms_to_degrees(&value).unwrap() - 52.51).abs() < 1e-9);
        assert_eq!(dms_to_degrees(&Value::Byte(vec![1])), None);
    }
}
