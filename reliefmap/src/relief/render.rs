//! Relief rendering from a height field.

use std::path::Path;

use image::{GrayImage, ImageFormat, RgbImage};
use tracing::debug;

use super::blend::{add_weighted, zero_masked, Layer};
use super::clahe::equalize;
use super::colormap::apply_jet;
use super::error::RenderError;
use super::filters::{laplacian3, magnitude_to_gray, sobel5};
use super::hillshade::hillshade;
use super::normalize::{normalize_percentile, quantize, value_range, ValueRange};
use super::raster::RasterBuffer;
use super::style::{Normalization, ReliefStyle};

/// Diagnostics gathered while rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct ReliefStats {
    /// Range of the valid input values.
    pub input_range: ValueRange,
    pub valid_cells: usize,
    pub total_cells: usize,
    /// Mean of the contrast-enhanced plane over valid cells.
    pub enhanced_mean: f64,
}

/// A composited relief image.
#[derive(Clone, Debug)]
pub struct RenderedRelief {
    pub image: RgbImage,
    pub stats: ReliefStats,
}

impl RenderedRelief {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Writes the image as PNG.
    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Renders `raster` with `style`.
///
/// The output always matches the raster's dimensions. Masked cells are
/// black in the result.
pub fn render(raster: &RasterBuffer, style: &ReliefStyle) -> Result<RenderedRelief, RenderError> {
    let mask = raster.mask();

    let (height_field, input_range) = match style.normalization {
        Normalization::Percentile => normalize_percentile(raster)?,
        Normalization::Quantize => (quantize(raster)?, value_range(raster)?),
    };

    let enhanced = equalize(&height_field, mask, &style.clahe);
    let enhanced_mean = masked_mean(&enhanced, mask);

    let gradients = sobel5(&enhanced);
    let shade = hillshade(&gradients, &style.lights);
    let colors = apply_jet(&enhanced);

    let mut composite = add_weighted(
        Layer::Color(&colors),
        style.colormap_weight,
        Layer::Gray(&shade),
        style.shade_weight,
        0.0,
    );

    if let Some(edge_weight) = style.edge_weight {
        let edges = magnitude_to_gray(&laplacian3(&enhanced), mask, raster.width(), raster.height());
        composite = add_weighted(Layer::Color(&composite), 1.0, Layer::Gray(&edges), edge_weight, 0.0);
    }

    zero_masked(&mut composite, mask);

    let stats = ReliefStats {
        input_range,
        valid_cells: raster.valid_count(),
        total_cells: mask.len(),
        enhanced_mean,
    };
    debug!(
        style = %style.kind,
        width = composite.width(),
        height = composite.height(),
        min = stats.input_range.min,
        max = stats.input_range.max,
        p1 = stats.input_range.p1,
        p99 = stats.input_range.p99,
        enhanced_mean = stats.enhanced_mean,
        "Rendered relief"
    );

    Ok(RenderedRelief {
        image: composite,
        stats,
    })
}

fn masked_mean(plane: &GrayImage, mask: &[bool]) -> f64 {
    let (sum, count) = plane
        .as_raw()
        .iter()
        .zip(mask)
        .filter(|(_, ok)| **ok)
        .fold((0u64, 0u64), |(s, c), (&v, _)| (s + v as u64, c + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn ramp_raster(width: u32, height: u32, lo: f32, hi: f32) -> RasterBuffer {
        let n = (width * height) as usize;
        let values = (0..n)
            .map(|i| lo + (hi - lo) * i as f32 / (n - 1) as f32)
            .collect();
        RasterBuffer::new(width, height, values).unwrap()
    }

    #[test]
    fn test_single_style_keeps_dimensions() {
        let raster = ramp_raster(40, 30, 0.0, 255.0);
        let relief = render(&raster, &ReliefStyle::single()).unwrap();
        assert_eq!((relief.width(), relief.height()), (40, 30));
        assert_eq!(relief.stats.valid_cells, 1200);
    }

    #[test]
    fn test_dem_style_blacks_out_nodata() {
        let mut values: Vec<f32> = (0..64 * 48).map(|i| 10.0 + (i % 64) as f32 * 0.5).collect();
        let mut mask = vec![true; values.len()];
        for x in 0..64 {
            mask[x] = false;
            values[x] = -9999.0;
        }
        let raster = RasterBuffer::with_mask(64, 48, values, mask).unwrap();
        let relief = render(&raster, &ReliefStyle::dem()).unwrap();

        for x in 0..64 {
            assert_eq!(relief.image.get_pixel(x, 0), &Rgb([0, 0, 0]));
        }
        assert!(relief.stats.input_range.min >= 10.0);
        assert!(relief.image.get_pixel(10, 10) != &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_flat_dem_renders() {
        let raster = RasterBuffer::new(20, 20, vec![42.0; 400]).unwrap();
        let relief = render(&raster, &ReliefStyle::dem()).unwrap();
        assert!(relief.stats.input_range.is_flat());
        assert_eq!(relief.image.dimensions(), (20, 20));
    }

    #[test]
    fn test_fully_masked_raster_fails() {
        let raster = RasterBuffer::with_mask(2, 2, vec![1.0; 4], vec![false; 4]).unwrap();
        assert!(matches!(
            render(&raster, &ReliefStyle::dem()),
            Err(RenderError::NoValidData)
        ));
        assert!(render(&raster, &ReliefStyle::single()).is_err());
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("relief.png");
        let relief = render(&ramp_raster(8, 8, 0.0, 100.0), &ReliefStyle::single()).unwrap();
        relief.save_png(&path).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }
}
