//! Lambertian relief shading.

use image::GrayImage;
use rayon::prelude::*;

use super::filters::Gradients;

/// A virtual light illuminating the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSource {
    /// Compass direction the light comes from, in degrees.
    pub azimuth_deg: f64,
    /// Elevation above the horizon, in degrees.
    pub altitude_deg: f64,
    /// Contribution to the combined shade.
    pub weight: f64,
}

impl LightSource {
    pub const fn new(azimuth_deg: f64, altitude_deg: f64, weight: f64) -> Self {
        Self {
            azimuth_deg,
            altitude_deg,
            weight,
        }
    }

    /// Unclipped illumination for one gradient sample.
    pub fn illuminate(&self, dx: f64, dy: f64) -> f64 {
        let slope = (dx * dx + dy * dy).sqrt();
        let aspect = (-dy).atan2(dx);
        let altitude = self.altitude_deg.to_radians();
        let azimuth = self.azimuth_deg.to_radians();
        altitude.sin() * slope.cos() + altitude.cos() * slope.sin() * (azimuth - aspect).cos()
    }
}

/// Weighted shade of all lights, clipped to [0, 1] and scaled to 8 bits.
pub fn shade_value(lights: &[LightSource], dx: f64, dy: f64) -> u8 {
    let shade: f64 = lights
        .iter()
        .map(|light| light.weight * light.illuminate(dx, dy))
        .sum();
    if !shade.is_finite() {
        return 0;
    }
    (shade.clamp(0.0, 1.0) * 255.0) as u8
}

/// Renders the combined shade layer for a gradient field.
pub fn hillshade(gradients: &Gradients, lights: &[LightSource]) -> GrayImage {
    let (width, height) = (gradients.width, gradients.height);
    let mut out = vec![0u8; gradients.dx.len()];
    if width == 0 {
        return GrayImage::new(width, height);
    }

    out.par_chunks_mut(width as usize)
        .zip(gradients.dx.par_chunks(width as usize))
        .zip(gradients.dy.par_chunks(width as usize))
        .for_each(|((row, dx), dy)| {
            for ((slot, &gx), &gy) in row.iter_mut().zip(dx).zip(dy) {
                *slot = shade_value(lights, gx as f64, gy as f64);
            }
        });

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NW: LightSource = LightSource::new(315.0, 45.0, 1.0);

    #[test]
    fn test_flat_surface_single_light() {
        // sin(45 deg) * 255
        assert_eq!(shade_value(&[NW], 0.0, 0.0), 180);
    }

    #[test]
    fn test_flat_surface_dual_light() {
        let lights = [
            LightSource::new(315.0, 45.0, 0.7),
            LightSource::new(135.0, 30.0, 0.3),
        ];
        assert_eq!(shade_value(&lights, 0.0, 0.0), 164);
    }

    #[test]
    fn test_overflowing_slope_is_black() {
        assert_eq!(shade_value(&[NW], f64::MAX, f64::MAX), 0);
    }

    #[test]
    fn test_layer_dimensions() {
        let gradients = Gradients {
            width: 3,
            height: 2,
            dx: vec![0.0; 6],
            dy: vec![0.0; 6],
        };
        let layer = hillshade(&gradients, &[NW]);
        assert_eq!(layer.dimensions(), (3, 2));
        assert!(layer.as_raw().iter().all(|&v| v == 180));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_illumination_clips_for_any_finite_gradient(
                dx in -1.0e7..1.0e7_f64,
                dy in -1.0e7..1.0e7_f64,
                azimuth in 0.0..360.0_f64,
                altitude in 0.0..90.0_f64,
            ) {
                let light = LightSource::new(azimuth, altitude, 1.0);
                let raw = light.illuminate(dx, dy);
                prop_assert!(raw.is_finite());
                prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&raw));

                let value = shade_value(&[light], dx, dy);
                let expected = (raw.clamp(0.0, 1.0) * 255.0) as u8;
                prop_assert_eq!(value, expected);
            }
        }
    }
}
