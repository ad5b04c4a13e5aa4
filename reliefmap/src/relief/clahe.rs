//! Contrast-limited adaptive histogram equalization.
//!
//! The plane is split into a grid of tiles. Each tile gets an equalization
//! lookup table built from its clipped histogram; the excess above the clip
//! limit is spread evenly over all bins. Pixels are mapped by bilinear
//! interpolation between the tables of the four nearest tile centers.

use image::GrayImage;
use rayon::prelude::*;

type Lut = [u8; 256];

/// Tuning for [`equalize`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClaheParams {
    /// Histogram clip limit relative to a flat histogram.
    pub clip_limit: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl ClaheParams {
    pub const fn new(clip_limit: f32, tiles: u32) -> Self {
        Self {
            clip_limit,
            tiles_x: tiles,
            tiles_y: tiles,
        }
    }
}

/// Applies CLAHE to `src`, ignoring cells where `mask` is false.
///
/// Masked cells contribute to no histogram and are written as 0.
pub fn equalize(src: &GrayImage, mask: &[bool], params: &ClaheParams) -> GrayImage {
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 {
        return src.clone();
    }
    let tiles_x = params.tiles_x.clamp(1, width);
    let tiles_y = params.tiles_y.clamp(1, height);

    let x_bounds = tile_bounds(width, tiles_x);
    let y_bounds = tile_bounds(height, tiles_y);
    let pixels = src.as_raw();

    let luts: Vec<Lut> = (0..tiles_x * tiles_y)
        .into_par_iter()
        .map(|tile| {
            let (tx, ty) = ((tile % tiles_x) as usize, (tile / tiles_x) as usize);
            let mut hist = [0u32; 256];
            let mut area = 0u32;
            for y in y_bounds[ty]..y_bounds[ty + 1] {
                let row = y as usize * width as usize;
                for x in x_bounds[tx]..x_bounds[tx + 1] {
                    let idx = row + x as usize;
                    if mask[idx] {
                        hist[pixels[idx] as usize] += 1;
                        area += 1;
                    }
                }
            }
            tile_lut(&mut hist, area, params.clip_limit)
        })
        .collect();

    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;
    let mut out = vec![0u8; pixels.len()];

    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row_out)| {
            let (ty1, ty2, ya) = neighbours(y as u32, tile_h, tiles_y);
            let row = y * width as usize;
            for (x, slot) in row_out.iter_mut().enumerate() {
                let idx = row + x;
                if !mask[idx] {
                    continue;
                }
                let (tx1, tx2, xa) = neighbours(x as u32, tile_w, tiles_x);
                let v = pixels[idx] as usize;
                let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][v] as f32;

                let top = (1.0 - xa) * lut(tx1, ty1) + xa * lut(tx2, ty1);
                let bottom = (1.0 - xa) * lut(tx1, ty2) + xa * lut(tx2, ty2);
                *slot = ((1.0 - ya) * top + ya * bottom).round().clamp(0.0, 255.0) as u8;
            }
        });

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}

fn tile_bounds(len: u32, tiles: u32) -> Vec<u32> {
    (0..=tiles)
        .map(|i| (i as u64 * len as u64 / tiles as u64) as u32)
        .collect()
}

/// Two nearest tile indices along one axis and the weight of the second.
fn neighbours(pos: u32, tile_len: f32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile_len - 0.5;
    let lower = f.floor();
    let weight = f - lower;
    let last = tiles as i64 - 1;
    let first = (lower as i64).clamp(0, last) as u32;
    let second = (lower as i64 + 1).clamp(0, last) as u32;
    (first, second, weight)
}

fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> Lut {
    let mut lut = [0u8; 256];
    if area == 0 {
        for (i, slot) in lut.iter_mut().enumerate() {
            *slot = i as u8;
        }
        return lut;
    }

    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let batch = excess / 256;
    let mut residual = excess - batch * 256;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1) as usize;
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }

    let scale = 255.0 / area as f32;
    let mut sum = 0u32;
    for (bin, slot) in hist.iter().zip(lut.iter_mut()) {
        sum += bin;
        *slot = (sum as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| image::Luma([(x * 255 / (width - 1)) as u8]))
    }

    #[test]
    fn test_single_tile_is_monotonic() {
        let src = ramp(64, 4);
        let mask = vec![true; 64 * 4];
        let out = equalize(&src, &mask, &ClaheParams::new(2.5, 1));

        let row: Vec<u8> = (0..64).map(|x| out.get_pixel(x, 0)[0]).collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
        assert!(row[63] >= 250);
    }

    #[test]
    fn test_masked_cells_do_not_affect_valid_output() {
        let mut a = ramp(32, 32);
        let mut b = ramp(32, 32);
        let mut mask = vec![true; 32 * 32];
        for y in 0..32 {
            for x in 0..8 {
                mask[(y * 32 + x) as usize] = false;
                a.put_pixel(x, y, image::Luma([0]));
                b.put_pixel(x, y, image::Luma([255]));
            }
        }
        let params = ClaheParams::new(3.0, 4);
        let out_a = equalize(&a, &mask, &params);
        let out_b = equalize(&b, &mask, &params);

        assert_eq!(out_a, out_b);
        assert_eq!(out_a.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_grid_larger_than_image() {
        let src = ramp(5, 3);
        let mask = vec![true; 15];
        let out = equalize(&src, &mask, &ClaheParams::new(3.0, 16));
        assert_eq!(out.dimensions(), (5, 3));
    }

    #[test]
    fn test_lut_of_uniform_histogram_is_identity_like() {
        let mut hist = [1u32; 256];
        let lut = tile_lut(&mut hist, 256, 2.5);
        assert_eq!(lut[0], 1);
        assert_eq!(lut[255], 255);
    }
}
