//! The JET perceptual color map.

use image::{GrayImage, Rgb, RgbImage};

/// Piecewise-linear control points `(position, intensity)` per channel.
const JET_RED: &[(f32, f32)] = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_GREEN: &[(f32, f32)] = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const JET_BLUE: &[(f32, f32)] = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn interpolate(points: &[(f32, f32)], t: f32) -> f32 {
    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if t <= x1 {
            let f = if x1 > x0 { (t - x0) / (x1 - x0) } else { 0.0 };
            return y0 + (y1 - y0) * f;
        }
    }
    points.last().map(|p| p.1).unwrap_or_default()
}

/// 256-entry RGB lookup table for JET.
pub fn jet_lut() -> [[u8; 3]; 256] {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let t = i as f32 / 255.0;
        *entry = [JET_RED, JET_GREEN, JET_BLUE]
            .map(|channel| (interpolate(channel, t) * 255.0).round().clamp(0.0, 255.0) as u8);
    }
    lut
}

/// Maps every 8-bit value through JET.
pub fn apply_jet(src: &GrayImage) -> RgbImage {
    let lut = jet_lut();
    let mut out = RgbImage::new(src.width(), src.height());
    for (dst, value) in out.pixels_mut().zip(src.pixels()) {
        *dst = Rgb(lut[value[0] as usize]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        let lut = jet_lut();
        assert_eq!(lut[0], [0, 0, 128]);
        assert_eq!(lut[255], [128, 0, 0]);
    }

    #[test]
    fn test_jet_midpoint_is_green_dominant() {
        let [r, g, b] = jet_lut()[128];
        assert_eq!(g, 255);
        assert!(r > 100 && b > 100);
    }

    #[test]
    fn test_apply_jet_preserves_dimensions() {
        let src = GrayImage::from_pixel(4, 3, image::Luma([0]));
        let out = apply_jet(&src);
        assert_eq!(out.dimensions(), (4, 3));
        assert_eq!(out.get_pixel(3, 2), &Rgb([0, 0, 128]));
    }
}
