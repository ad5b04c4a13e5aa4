//! Conversion of height fields to 8-bit planes.

use image::GrayImage;

use super::error::RenderError;
use super::raster::RasterBuffer;

/// Ranges narrower than this are treated as flat.
pub const FLAT_RANGE_EPSILON: f64 = 1e-6;

/// Value given to valid cells of a flat raster.
pub const FLAT_GRAY: u8 = 128;

/// Value range used for normalization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    pub p1: f64,
    pub p99: f64,
}

impl ValueRange {
    /// Whether the clip range collapses to a single value.
    pub fn is_flat(&self) -> bool {
        (self.p99 - self.p1).abs() < FLAT_RANGE_EPSILON
    }
}

/// Linear-interpolated percentile of sorted data (`q` in 0..=100).
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Computes min, max and the 1st/99th percentile of valid cells.
pub fn value_range(raster: &RasterBuffer) -> Result<ValueRange, RenderError> {
    let mut valid: Vec<f64> = raster.valid_values().map(f64::from).collect();
    if valid.is_empty() {
        return Err(RenderError::NoValidData);
    }
    valid.sort_unstable_by(|a, b| a.total_cmp(b));

    let last = valid.len() - 1;
    Ok(ValueRange {
        min: valid[0],
        max: valid[last],
        p1: percentile(&valid, 1.0).unwrap_or(valid[0]),
        p99: percentile(&valid, 99.0).unwrap_or(valid[last]),
    })
}

/// Clips valid cells to the 1st/99th percentile and rescales to 0..=255.
///
/// Masked cells become 0. When the clip range is flat every valid cell
/// becomes [`FLAT_GRAY`].
pub fn normalize_percentile(raster: &RasterBuffer) -> Result<(GrayImage, ValueRange), RenderError> {
    let range = value_range(raster)?;
    let flat = range.is_flat();
    let span = (range.p99 - range.p1).max(FLAT_RANGE_EPSILON);

    let data = raster
        .values()
        .iter()
        .zip(raster.mask())
        .map(|(&v, &ok)| {
            if !ok {
                0
            } else if flat {
                FLAT_GRAY
            } else {
                let clipped = (v as f64).clamp(range.p1, range.p99);
                ((clipped - range.p1) / span * 255.0) as u8
            }
        })
        .collect();

    Ok((to_gray(raster, data)?, range))
}

/// Treats valid cells as 8-bit values already, clamping and rounding.
///
/// Masked cells become 0.
pub fn quantize(raster: &RasterBuffer) -> Result<GrayImage, RenderError> {
    let data = raster
        .values()
        .iter()
        .zip(raster.mask())
        .map(|(&v, &ok)| if ok { v.clamp(0.0, 255.0).round() as u8 } else { 0 })
        .collect();
    to_gray(raster, data)
}

fn to_gray(raster: &RasterBuffer, data: Vec<u8>) -> Result<GrayImage, RenderError> {
    let expected = data.len();
    GrayImage::from_raw(raster.width(), raster.height(), data).ok_or(
        RenderError::DimensionMismatch {
            expected: raster.width() as usize * raster.height() as usize,
            actual: expected,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let data: Vec<f64> = (0..=100).map(f64::from).collect();
        assert!((percentile(&data, 1.0).unwrap() - 1.0).abs() < 1e-9);
        assert!((percentile(&data, 99.0).unwrap() - 99.0).abs() < 1e-9);

        let small = [10.0, 20.0, 30.0];
        // rank = 0.02 -> 10 + 0.02 * 10
        assert!((percentile(&small, 1.0).unwrap() - 10.2).abs() < 1e-9);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_normalize_spans_full_range() {
        let values: Vec<f32> = (0..1000).map(|i| 10.0 + 40.0 * i as f32 / 999.0).collect();
        let raster = RasterBuffer::new(100, 10, values).unwrap();
        let (gray, range) = normalize_percentile(&raster).unwrap();

        assert!((range.min - 10.0).abs() < 1e-4);
        assert!((range.max - 50.0).abs() < 1e-4);
        let lo = *gray.as_raw().iter().min().unwrap();
        let hi = *gray.as_raw().iter().max().unwrap();
        assert_eq!((lo, hi), (0, 255));
    }

    #[test]
    fn test_flat_raster_is_mid_gray() {
        let raster = RasterBuffer::with_mask(
            3,
            1,
            vec![7.0, 7.0, 7.0],
            vec![true, false, true],
        )
        .unwrap();
        let (gray, range) = normalize_percentile(&raster).unwrap();
        assert!(range.is_flat());
        assert_eq!(gray.as_raw(), &vec![FLAT_GRAY, 0, FLAT_GRAY]);
    }

    #[test]
    fn test_outliers_are_clipped_and_excluded_when_masked() {
        let mut values: Vec<f32> = (0..200).map(|i| i as f32).collect();
        values[0] = -10_000.0;
        let mut mask = vec![true; 200];
        mask[199] = false;
        values[199] = 1e9;
        let raster = RasterBuffer::with_mask(200, 1, values, mask).unwrap();

        let range = value_range(&raster).unwrap();
        assert_eq!(range.max, 198.0);
        let (gray, _) = normalize_percentile(&raster).unwrap();
        assert_eq!(gray.as_raw()[0], 0);
        assert_eq!(gray.as_raw()[199], 0);
    }

    #[test]
    fn test_all_masked_is_an_error() {
        let raster = RasterBuffer::with_mask(2, 1, vec![1.0, 2.0], vec![false, false]).unwrap();
        assert!(matches!(
            normalize_percentile(&raster),
            Err(RenderError::NoValidData)
        ));
    }

    #[test]
    fn test_quantize_clamps() {
        let raster = RasterBuffer::new(3, 1, vec![-5.0, 127.6, 300.0]).unwrap();
        assert_eq!(quantize(&raster).unwrap().as_raw(), &vec![0, 128, 255]);
    }
}
