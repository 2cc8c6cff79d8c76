//! On-disk pipeline configuration: calibration model selection and
//! per-stage period filters. Mirrors the `toml::Value`-driven
//! validate-then-build shape used for driver configuration elsewhere in
//! this codebase, scaled down to this crate's much smaller surface.

use std::collections::HashMap;

use serde::Deserialize;

use crate::kernels::CalibrationModel;

/// Raw, serde-deserialized configuration as it appears in the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_calibration_model")]
    pub calibration_model: String,
    #[serde(default)]
    pub stage_periods: HashMap<String, u32>,
}

fn default_calibration_model() -> String {
    "pinhole".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calibration_model: default_calibration_model(),
            stage_periods: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolve `calibration_model` to a concrete model, falling back to
    /// PINHOLE (with the defaulted flag set) for anything unrecognized.
    pub fn resolve_calibration_model(&self) -> (CalibrationModel, bool) {
        CalibrationModel::parse_or_default(&self.calibration_model)
    }

    pub fn period_for(&self, stage_name: &str) -> u32 {
        self.stage_periods.get(stage_name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_pinhole_with_no_periods() {
        let config = PipelineConfig::default();
        let (model, defaulted) = config.resolve_calibration_model();
        assert_eq!(model, CalibrationModel::Pinhole);
        assert!(!defaulted);
        assert_eq!(config.period_for("disparity"), 0);
    }

    #[test]
    fn parses_calibration_model_and_stage_periods() {
        let toml = r#"
            calibration_model = "kannala_brandt"

            [stage_periods]
            disparity = 2
            points = 3
        "#;
        let config = PipelineConfig::from_toml_str(toml).unwrap();
        let (model, defaulted) = config.resolve_calibration_model();
        assert_eq!(model, CalibrationModel::KannalaBrandt);
        assert!(!defaulted);
        assert_eq!(config.period_for("disparity"), 2);
        assert_eq!(config.period_for("points"), 3);
        assert_eq!(config.period_for("depth"), 0);
    }

    #[test]
    fn unknown_calibration_model_defaults_to_pinhole_with_flag_set() {
        let toml = r#"calibration_model = "fisheye""#;
        let config = PipelineConfig::from_toml_str(toml).unwrap();
        let (model, defaulted) = config.resolve_calibration_model();
        assert_eq!(model, CalibrationModel::Pinhole);
        assert!(defaulted);
    }
}
