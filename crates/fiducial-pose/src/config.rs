//! JSON configuration for the marker pipeline.
//!
//! ```json
//! {
//!   "camera": {
//!     "intrinsics": [[1000.0, 0.0, 500.0], [0.0, 1000.0, 500.0], [0.0, 0.0, 1.0]],
//!     "distortion": [0.1, 0.01, 0.0, 0.0, 0.001]
//!   },
//!   "method": "svd_orthogonalized",
//!   "marker": { "side_length": 1.0, "cube_height": 1.0 },
//!   "refine": { "max_iters": 20 }
//! }
//! ```
//!
//! `distortion`, `method`, `marker` and `refine` may be omitted. Without a
//! `refine` section poses come straight from the homography decomposition.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::decompose::DecompositionMethod;
use crate::error::ConfigError;
use crate::marker::{MarkerGeometry, MarkerPoseEstimator};
use crate::refine::LMParams;

/// Camera section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Row-major 3x3 intrinsic matrix.
    pub intrinsics: [[f64; 3]; 3],
    /// Distortion coefficients `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`.
    #[serde(default)]
    pub distortion: Vec<f64>,
}

impl CameraConfig {
    /// Validate the section into a camera model.
    pub fn to_camera(&self) -> Result<CameraModel, ConfigError> {
        Ok(CameraModel::from_parts(&self.intrinsics, &self.distortion)?)
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Camera calibration.
    pub camera: CameraConfig,
    /// Decomposition strategy.
    #[serde(default)]
    pub method: DecompositionMethod,
    /// Marker layout.
    #[serde(default)]
    pub marker: MarkerGeometry,
    /// Reprojection refinement, disabled when absent.
    #[serde(default)]
    pub refine: Option<LMParams>,
}

impl PipelineConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("loading pipeline configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serialize the configuration to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the camera and marker sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.to_camera()?;
        self.marker.validate().map_err(ConfigError::Marker)
    }

    /// Build the estimator described by this configuration.
    pub fn build_estimator(&self) -> Result<MarkerPoseEstimator, ConfigError> {
        self.validate()?;
        let mut estimator = MarkerPoseEstimator::new(self.camera.to_camera()?)
            .with_method(self.method)
            .with_geometry(self.marker)
            .map_err(ConfigError::Marker)?;
        if let Some(params) = self.refine {
            estimator = estimator.with_refinement(params);
        }
        Ok(estimator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoseError;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "camera": {
            "intrinsics": [[1000.0, 0.0, 500.0], [0.0, 1000.0, 500.0], [0.0, 0.0, 1.0]]
        }
    }"#;

    #[test]
    fn test_minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config = PipelineConfig::from_json_str(MINIMAL)?;
        assert!(config.camera.distortion.is_empty());
        assert_eq!(config.method, DecompositionMethod::SvdOrthogonalized);
        assert_eq!(config.marker, MarkerGeometry::default());

        assert!(config.refine.is_none());

        let estimator = config.build_estimator()?;
        assert_eq!(estimator.camera().intrinsic.fx, 1000.0);
        assert!(!estimator.camera().distortion.has_distortion());
        assert!(estimator.refinement().is_none());
        Ok(())
    }

    #[test]
    fn test_full_config() -> Result<(), Box<dyn std::error::Error>> {
        let config = PipelineConfig::from_json_str(
            r#"{
                "camera": {
                    "intrinsics": [[800.0, 0.5, 320.0], [0.0, 810.0, 240.0], [0.0, 0.0, 1.0]],
                    "distortion": [0.1, 0.01, 0.001, 0.002, 0.0001]
                },
                "method": "normalized",
                "marker": { "side_length": 0.05 },
                "refine": { "max_iters": 7 }
            }"#,
        )?;
        assert_eq!(config.method, DecompositionMethod::Normalized);
        assert_eq!(config.refine.map(|p| p.max_iters), Some(7));
        assert_eq!(
            config.build_estimator()?.refinement().map(|p| p.lambda_init),
            Some(LMParams::default().lambda_init)
        );
        assert_eq!(config.marker.side_length, 0.05);
        assert_eq!(config.marker.cube_height, 1.0);

        let camera = config.camera.to_camera()?;
        assert_eq!(camera.intrinsic.skew, 0.5);
        assert_eq!(camera.distortion.p2, 0.002);
        assert_eq!(camera.distortion.k3, 0.0001);
        Ok(())
    }

    #[test]
    fn test_config_rejects_bad_intrinsics() {
        let result = PipelineConfig::from_json_str(
            r#"{ "camera": { "intrinsics": [[1000.0, 0.0, 500.0], [0.0, 1000.0, 500.0], [0.0, 0.0, 2.0]] } }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Camera(PoseError::InvalidIntrinsics(_)))
        ));
    }

    #[test]
    fn test_config_rejects_bad_distortion() {
        let result = PipelineConfig::from_json_str(
            r#"{
                "camera": {
                    "intrinsics": [[1000.0, 0.0, 500.0], [0.0, 1000.0, 500.0], [0.0, 0.0, 1.0]],
                    "distortion": [0.1, 0.2]
                }
            }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Camera(PoseError::InvalidDistortion { len: 2 }))
        ));
    }

    #[test]
    fn test_config_rejects_bad_marker_and_json() {
        let result = PipelineConfig::from_json_str(
            r#"{
                "camera": {
                    "intrinsics": [[1000.0, 0.0, 500.0], [0.0, 1000.0, 500.0], [0.0, 0.0, 1.0]]
                },
                "marker": { "side_length": -1.0 }
            }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Marker(PoseError::DegenerateConfiguration(_)))
        ));

        assert!(matches!(
            PipelineConfig::from_json_str(r#"{ "method": "normalized" }"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{ "camera": { "intrinsics": [[1.0]] } }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_config_file_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let config = PipelineConfig::from_json_str(MINIMAL)?;

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(config.to_json_string()?.as_bytes())?;
        file.flush()?;

        let loaded = PipelineConfig::from_file(file.path())?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_config_missing_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let result = PipelineConfig::from_file(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
        Ok(())
    }
}
