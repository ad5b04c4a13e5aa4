//! Derivative filters over 8-bit planes.
//!
//! Borders are handled by reflecting without repeating the edge pixel
//! (`dcb|abcd|cba`).

use image::GrayImage;
use rayon::prelude::*;

const SOBEL5_DERIVATIVE: [f32; 5] = [-1.0, -2.0, 0.0, 2.0, 1.0];
const SOBEL5_SMOOTHING: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];

const LAPLACIAN3: [[f32; 3]; 3] = [[2.0, 0.0, 2.0], [0.0, -8.0, 0.0], [2.0, 0.0, 2.0]];

/// Horizontal and vertical derivatives of a plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    pub width: u32,
    pub height: u32,
    pub dx: Vec<f32>,
    pub dy: Vec<f32>,
}

/// Mirrors an out-of-range index back into `0..len`.
fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = i;
    while i < 0 || i > last {
        i = if i < 0 { -i } else { 2 * last - i };
    }
    i as usize
}

/// Separable correlation: `row_kernel` along x, then `col_kernel` along y.
fn separable(src: &[f32], width: usize, height: usize, row_kernel: &[f32; 5], col_kernel: &[f32; 5]) -> Vec<f32> {
    let mut horizontal = vec![0f32; src.len()];
    horizontal
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, out)| {
            let row = &src[y * width..(y + 1) * width];
            for (x, slot) in out.iter_mut().enumerate() {
                *slot = row_kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * row[reflect101(x as isize + k as isize - 2, width)])
                    .sum();
            }
        });

    let mut out = vec![0f32; src.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, out)| {
        for (x, slot) in out.iter_mut().enumerate() {
            *slot = col_kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let sy = reflect101(y as isize + k as isize - 2, height);
                    w * horizontal[sy * width + x]
                })
                .sum();
        }
    });
    out
}

/// 5x5 Sobel derivatives.
pub fn sobel5(src: &GrayImage) -> Gradients {
    let (width, height) = src.dimensions();
    let data: Vec<f32> = src.as_raw().iter().map(|&v| v as f32).collect();
    let (w, h) = (width as usize, height as usize);

    if w == 0 || h == 0 {
        return Gradients {
            width,
            height,
            dx: Vec::new(),
            dy: Vec::new(),
        };
    }

    Gradients {
        width,
        height,
        dx: separable(&data, w, h, &SOBEL5_DERIVATIVE, &SOBEL5_SMOOTHING),
        dy: separable(&data, w, h, &SOBEL5_SMOOTHING, &SOBEL5_DERIVATIVE),
    }
}

/// 3x3 Laplacian (second derivative) response.
pub fn laplacian3(src: &GrayImage) -> Vec<f32> {
    let (width, height) = (src.width() as usize, src.height() as usize);
    let pixels = src.as_raw();
    let mut out = vec![0f32; pixels.len()];
    if width == 0 || height == 0 {
        return out;
    }

    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, slot) in row.iter_mut().enumerate() {
            let mut acc = 0f32;
            for (ky, weights) in LAPLACIAN3.iter().enumerate() {
                let sy = reflect101(y as isize + ky as isize - 1, height);
                for (kx, w) in weights.iter().enumerate() {
                    if *w == 0.0 {
                        continue;
                    }
                    let sx = reflect101(x as isize + kx as isize - 1, width);
                    acc += w * pixels[sy * width + sx] as f32;
                }
            }
            *slot = acc;
        }
    });
    out
}

/// Rescales absolute responses of valid cells to 0..=255.
///
/// `(|v| - min) / (max - min + 1e-6) * 255`, truncated; min and max are
/// taken over valid cells only. Masked cells become 0.
pub fn magnitude_to_gray(values: &[f32], mask: &[bool], width: u32, height: u32) -> GrayImage {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (v, _) in values.iter().zip(mask).filter(|(_, ok)| **ok) {
        let a = v.abs() as f64;
        min = min.min(a);
        max = max.max(a);
    }
    if !min.is_finite() {
        return GrayImage::new(width, height);
    }

    let span = max - min + 1e-6;
    let data = values
        .iter()
        .zip(mask)
        .map(|(v, ok)| {
            if *ok {
                ((v.abs() as f64 - min) / span * 255.0).clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}
