//! Per-channel weighted compositing.

use image::{GrayImage, Rgb, RgbImage};

/// A layer fed into a weighted blend.
pub enum Layer<'a> {
    Color(&'a RgbImage),
    /// Gray layer replicated into all three channels.
    Gray(&'a GrayImage),
}

impl Layer<'_> {
    fn channel(&self, index: usize, channel: usize) -> f32 {
        match self {
            Layer::Color(img) => img.as_raw()[index * 3 + channel] as f32,
            Layer::Gray(img) => img.as_raw()[index] as f32,
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match self {
            Layer::Color(img) => img.dimensions(),
            Layer::Gray(img) => img.dimensions(),
        }
    }
}

/// `alpha * a + beta * b + gamma`, rounded and saturated per channel.
///
/// Both layers must share dimensions; the result takes those of `a`.
pub fn add_weighted(a: Layer<'_>, alpha: f32, b: Layer<'_>, beta: f32, gamma: f32) -> RgbImage {
    let (width, height) = a.dimensions();
    debug_assert_eq!(a.dimensions(), b.dimensions());

    let mut out = RgbImage::new(width, height);
    for (index, pixel) in out.pixels_mut().enumerate() {
        let mut rgb = [0u8; 3];
        for (channel, slot) in rgb.iter_mut().enumerate() {
            let v = alpha * a.channel(index, channel) + beta * b.channel(index, channel) + gamma;
            *slot = v.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(rgb);
    }
    out
}

/// Paints every cell where `mask` is false black.
pub fn zero_masked(image: &mut RgbImage, mask: &[bool]) {
    for (pixel, &ok) in image.pixels_mut().zip(mask) {
        if !ok {
            *pixel = Rgb([0, 0, 0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_blend_rounds() {
        let color = RgbImage::from_pixel(1, 1, Rgb([255, 100, 0]));
        let gray = GrayImage::from_pixel(1, 1, image::Luma([181]));
        let out = add_weighted(Layer::Color(&color), 0.6, Layer::Gray(&gray), 0.4, 0.0);
        // 153 + 72.4, 60 + 72.4, 0 + 72.4
        assert_eq!(out.get_pixel(0, 0), &Rgb([225, 132, 72]));
    }

    #[test]
    fn test_blend_saturates() {
        let color = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        let gray = GrayImage::from_pixel(1, 1, image::Luma([255]));
        let out = add_weighted(Layer::Color(&color), 1.0, Layer::Gray(&gray), 0.15, 0.0);
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_zero_masked() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([9, 9, 9]));
        zero_masked(&mut img, &[true, false]);
        assert_eq!(img.get_pixel(0, 0), &Rgb([9, 9, 9]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }
}
