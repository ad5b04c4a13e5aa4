//! Scalar height field with a validity mask.

use image::GrayImage;

use super::error::RenderError;

/// A 2-D height field plus a same-shaped validity mask.
///
/// Cells outside the mask are excluded from every statistic and rendered
/// black. Non-finite values are always treated as invalid.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    values: Vec<f32>,
    valid: Vec<bool>,
}

impl RasterBuffer {
    /// Creates a raster whose mask marks every finite value valid.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, RenderError> {
        let valid = values.iter().map(|v| v.is_finite()).collect();
        Self::with_mask(width, height, values, valid)
    }

    /// Creates a raster with an explicit mask (`true` = valid).
    pub fn with_mask(
        width: u32,
        height: u32,
        values: Vec<f32>,
        mut valid: Vec<bool>,
    ) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyRaster { width, height });
        }
        let expected = width as usize * height as usize;
        for actual in [values.len(), valid.len()] {
            if actual != expected {
                return Err(RenderError::DimensionMismatch { expected, actual });
            }
        }

        for (flag, value) in valid.iter_mut().zip(&values) {
            *flag &= value.is_finite();
        }

        Ok(Self {
            width,
            height,
            values,
            valid,
        })
    }

    /// Creates a fully valid raster from an 8-bit image.
    pub fn from_gray(image: &GrayImage) -> Result<Self, RenderError> {
        let values = image.as_raw().iter().map(|&v| v as f32).collect();
        Self::new(image.width(), image.height(), values)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Row-major validity mask.
    pub fn mask(&self) -> &[bool] {
        &self.valid
    }

    #[cfg(test)]
    pub(crate) fn is_valid(&self, x: u32, y: u32) -> bool {
        self.valid[self.index(x, y)]
    }

    #[cfg(test)]
    pub(crate) fn value(&self, x: u32, y: u32) -> f32 {
        self.values[self.index(x, y)]
    }

    /// Number of valid cells.
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Whether every cell is valid.
    pub fn is_fully_valid(&self) -> bool {
        self.valid.iter().all(|&v| v)
    }

    /// Values of valid cells, in row-major order.
    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values
            .iter()
            .zip(&self.valid)
            .filter(|(_, ok)| **ok)
            .map(|(&v, _)| v)
    }

    #[cfg(test)]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_values_are_masked() {
        let raster = RasterBuffer::new(2, 2, vec![1.0, f32::NAN, f32::INFINITY, 4.0]).unwrap();
        assert_eq!(raster.valid_count(), 2);
        assert!(!raster.is_valid(1, 0));
        assert!(raster.is_valid(1, 1));
        assert_eq!(raster.valid_values().collect::<Vec<_>>(), vec![1.0, 4.0]);
    }

    #[test]
    fn test_explicit_mask_is_combined_with_finiteness() {
        let raster = RasterBuffer::with_mask(
            3,
            1,
            vec![1.0, f32::NAN, 3.0],
            vec![false, true, true],
        )
        .unwrap();
        assert_eq!(raster.mask(), &[false, false, true]);
    }

    #[test]
    fn test_dimension_errors() {
        assert!(matches!(
            RasterBuffer::new(0, 5, vec![]),
            Err(RenderError::EmptyRaster { .. })
        ));
        assert!(matches!(
            RasterBuffer::new(2, 2, vec![0.0; 3]),
            Err(RenderError::DimensionMismatch { expected: 4, actual: 3 })
        ));
        assert!(RasterBuffer::with_mask(2, 1, vec![0.0; 2], vec![true]).is_err());
    }

    #[test]
    fn test_from_gray() {
        let img = GrayImage::from_raw(2, 1, vec![10, 250]).unwrap();
        let raster = RasterBuffer::from_gray(&img).unwrap();
        assert_eq!(raster.value(1, 0), 250.0);
        assert!(raster.is_fully_valid());
    }
}
