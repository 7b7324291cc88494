//! Top-level scan configuration.

use std::path::Path;

use crate::enhance::EnhanceConfig;
use crate::fiducial::FiducialConfig;
use crate::orientation::OrientationConfig;
use crate::rectify::RectifyConfig;
use crate::sampler::SamplingConfig;

/// Tuning for every pipeline stage. Missing JSON fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub enhance: EnhanceConfig,
    pub fiducial: FiducialConfig,
    pub rectify: RectifyConfig,
    pub orientation: OrientationConfig,
    pub sampling: SamplingConfig,
}

/// Scan configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanConfig {
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binarize::BinarizeMethod;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ScanConfig::from_json_str("{}").unwrap(), ScanConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg = ScanConfig::from_json_str(
            r#"{
                "fiducial": { "binarize": { "method": "fixed", "level": 90 } },
                "orientation": { "decode": { "min_contrast": 25.0 } }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.fiducial.binarize, BinarizeMethod::Fixed { level: 90 });
        assert_eq!(cfg.fiducial.min_area_px, FiducialConfig::default().min_area_px);
        assert_eq!(cfg.orientation.decode.min_contrast, 25.0);
        assert_eq!(cfg.sampling, SamplingConfig::default());
    }

    #[test]
    fn config_roundtrips_through_json() {
        let mut cfg = ScanConfig::default();
        cfg.enhance.sharpen = true;
        cfg.rectify.fill = [0, 0, 0];
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(ScanConfig::from_json_str(&json).unwrap(), cfg);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = ScanConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
