//! Engine processing options and quality presets.

use serde::Serialize;
use serde_json::Value;

/// One `{name, value}` entry of the engine's options list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineOption {
    pub name: String,
    pub value: Value,
}

impl EngineOption {
    pub fn new(name: &str, value: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Reconstruction quality, selected by a batch's `merge_method`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QualityPreset {
    Max,
    Medium,
    #[default]
    Standard,
}

impl QualityPreset {
    /// `max` and `medium` select their presets; anything else is standard.
    pub fn from_merge_method(method: &str) -> Self {
        match method.trim().to_ascii_lowercase().as_str() {
            "max" => Self::Max,
            "medium" => Self::Medium,
            _ => Self::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Medium => "medium",
            Self::Standard => "standard",
        }
    }
}

/// Flags that skip expensive stages in fast mode.
const FAST_MODE_FLAGS: &[&str] = &[
    "fast-orthophoto",
    "skip-3dmodel",
    "skip-report",
    "optimize-disk-space",
    "pc-skip-geometric",
];

/// Builds the options list for a preset.
pub fn build_options(preset: QualityPreset, fast_mode: bool) -> Vec<EngineOption> {
    let (quality, resolution, min_features, mesh_size) = match preset {
        QualityPreset::Max => ("ultra", 0.5, 20_000, 500_000),
        QualityPreset::Medium => ("high", 1.0, 10_000, 200_000),
        QualityPreset::Standard => ("high", 1.0, 5_000, 100_000),
    };

    let mut options = vec![
        EngineOption::new("dsm", true),
        EngineOption::new("dtm", false),
        EngineOption::new("pc-quality", quality),
        EngineOption::new("feature-quality", quality),
        EngineOption::new("dem-resolution", resolution),
        EngineOption::new("orthophoto-resolution", resolution),
        EngineOption::new("min-num-features", min_features),
        EngineOption::new("mesh-octree-depth", 12),
        EngineOption::new("mesh-size", mesh_size),
    ];

    if fast_mode {
        options.extend(FAST_MODE_FLAGS.iter().map(|flag| EngineOption::new(flag, true)));
    }
    options
}

/// Serializes options as the JSON string the engine expects.
pub fn options_json(options: &[EngineOption]) -> String {
    serde_json::to_string(options).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(options: &'a [EngineOption], name: &str) -> Option<&'a Value> {
        options.iter().find(|o| o.name == name).map(|o| &o.value)
    }

    #[test]
    fn test_preset_selection() {
        assert_eq!(QualityPreset::from_merge_method("max"), QualityPreset::Max);
        assert_eq!(QualityPreset::from_merge_method("MEDIUM"), QualityPreset::Medium);
        assert_eq!(QualityPreset::from_merge_method("average"), QualityPreset::Standard);
        assert_eq!(QualityPreset::from_merge_method(""), QualityPreset::Standard);
    }

    #[test]
    fn test_max_preset_values() {
        let options = build_options(QualityPreset::Max, false);
        assert_eq!(options.len(), 9);
        assert_eq!(find(&options, "pc-quality"), Some(&Value::from("ultra")));
        assert_eq!(find(&options, "dem-resolution"), Some(&Value::from(0.5)));
        assert_eq!(find(&options, "min-num-features"), Some(&Value::from(20_000)));
        assert!(find(&options, "fast-orthophoto").is_none());
    }

    #[test]
    fn test_fast_mode_appends_skip_flags() {
        let options = build_options(QualityPreset::Standard, true);
        assert_eq!(options.len(), 14);
        for flag in FAST_MODE_FLAGS {
            assert_eq!(find(&options, flag), Some(&Value::Bool(true)));
        }
        assert_eq!(find(&options, "mesh-size"), Some(&Value::from(100_000)));
    }

    #[test]
    fn test_options_json_shape() {
        let json = options_json(&[EngineOption::new("dsm", true)]);
        assert_eq!(json, r#"[{"name":"dsm","value":true}]"#);
    }
}
