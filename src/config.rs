//! Pipeline configuration.
//!
//! Loaded from JSON; every field has a default so a config file only needs
//! the values it changes. Cloud parameters go in the `uniforms` object keyed
//! by their shader names and are applied through
//! [`SharedUniforms`](crate::shared_uniforms::SharedUniforms).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::{PipelineError, Result};
use crate::noise::DEFAULT_VOLUME_SIZE;
use crate::quality::UndersamplingSettings;
use crate::wind::WindAnimator;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub undersampling: UndersamplingSettings,
    /// Run the edge antialiasing pass before output.
    pub antialias: bool,
    pub wind: WindAnimator,
    pub camera: Camera,
    /// Edge length of the generated 3D noise volume.
    pub noise_volume_size: u32,
    /// PNG for the 2D detail noise. Generated procedurally when absent.
    pub noise_texture: Option<PathBuf>,
    /// Cloud parameter overrides, `{ "cloudsScale": 80.0, ... }`.
    pub uniforms: serde_json::Map<String, serde_json::Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            undersampling: UndersamplingSettings::default(),
            antialias: true,
            wind: WindAnimator::default(),
            camera: Camera::default(),
            noise_volume_size: DEFAULT_VOLUME_SIZE,
            noise_texture: None,
            uniforms: serde_json::Map::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let config_error = |message: String| PipelineError::Config {
            path: path.display().to_string(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config = Self::from_json_str(&text).map_err(|e| config_error(e.to_string()))?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.undersampling, UndersamplingSettings::default());
        assert!(config.antialias);
        assert_eq!(config.wind, WindAnimator::default());
        assert_eq!(config.noise_volume_size, DEFAULT_VOLUME_SIZE);
        assert!(config.uniforms.is_empty());
    }

    #[test]
    fn test_partial_config() {
        let json = r#"{
            "undersampling": { "level": 3 },
            "antialias": false,
            "wind": { "detailsWindSpeed": 500.0 },
            "camera": { "position": [0.0, 50.0, 0.0], "yaw": 0.0 },
            "uniforms": { "cloudsScale": 80.0, "fogEnabled": true }
        }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();
        assert_eq!(config.undersampling.level, 3);
        assert_eq!(config.undersampling.divisor, None);
        assert!(!config.antialias);
        assert_eq!(config.wind.details_wind_speed, 500.0);
        assert_eq!(config.wind.details_wind_change_speed, 0.05);
        assert_eq!(config.camera.position, glam::Vec3::new(0.0, 50.0, 0.0));
        assert_eq!(config.camera.fov_y, Camera::default().fov_y);
        assert_eq!(config.uniforms.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/clouds.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
