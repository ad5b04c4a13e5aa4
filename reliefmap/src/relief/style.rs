//! Render style presets.

use std::fmt;
use std::str::FromStr;

use super::clahe::ClaheParams;
use super::hillshade::LightSource;

/// How the height field is brought to 8 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Normalization {
    /// Values are already 0..=255 and are clamped.
    Quantize,
    /// 1st/99th percentile clip, then linear rescale.
    Percentile,
}

/// Which preset to render with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StyleKind {
    /// Single-image heightmaps: one light, no edge layer.
    #[default]
    Single,
    /// Engine DEMs: dual lighting plus an edge layer.
    Dem,
}

impl StyleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Dem => "dem",
        }
    }
}

impl fmt::Display for StyleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StyleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "dem" | "batch" => Ok(Self::Dem),
            other => Err(format!("unknown style '{}', expected single or dem", other)),
        }
    }
}

/// Full set of render parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ReliefStyle {
    pub kind: StyleKind,
    pub normalization: Normalization,
    pub clahe: ClaheParams,
    pub lights: Vec<LightSource>,
    pub colormap_weight: f32,
    pub shade_weight: f32,
    /// Weight of the edge layer, blended in a second pass.
    pub edge_weight: Option<f32>,
}

impl ReliefStyle {
    /// Preset for single-image heightmaps.
    pub fn single() -> Self {
        Self {
            kind: StyleKind::Single,
            normalization: Normalization::Quantize,
            clahe: ClaheParams::new(2.5, 8),
            lights: vec![LightSource::new(315.0, 45.0, 1.0)],
            colormap_weight: 0.6,
            shade_weight: 0.4,
            edge_weight: None,
        }
    }

    /// Preset for engine DEMs.
    pub fn dem() -> Self {
        Self {
            kind: StyleKind::Dem,
            normalization: Normalization::Percentile,
            clahe: ClaheParams::new(3.0, 16),
            lights: vec![
                LightSource::new(315.0, 45.0, 0.7),
                LightSource::new(135.0, 30.0, 0.3),
            ],
            colormap_weight: 0.5,
            shade_weight: 0.35,
            edge_weight: Some(0.15),
        }
    }

    pub fn for_kind(kind: StyleKind) -> Self {
        match kind {
            StyleKind::Single => Self::single(),
            StyleKind::Dem => Self::dem(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let single = ReliefStyle::single();
        assert_eq!(single.lights.len(), 1);
        assert!(single.edge_weight.is_none());

        let dem = ReliefStyle::dem();
        let total: f32 = dem.colormap_weight + dem.shade_weight + dem.edge_weight.unwrap();
        assert!((total - 1.0).abs() < 1e-6);
        let light_total: f64 = dem.lights.iter().map(|l| l.weight).sum();
        assert!((light_total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_style_kind() {
        assert_eq!("DEM".parse::<StyleKind>().unwrap(), StyleKind::Dem);
        assert_eq!("single".parse::<StyleKind>().unwrap(), StyleKind::Single);
        assert!("hypsometric".parse::<StyleKind>().is_err());
    }
}
