//! Marker geometry and the per-frame pose pipeline.
//!
//! The corner detector is external: it hands over four ordered pixel corners
//! and a centre per marker. [`MarkerPoseEstimator`] turns each detection into a
//! pose and the overlay geometry an external renderer draws on top of the image.

use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::decompose::DecompositionMethod;
use crate::error::PoseError;
use crate::homography::find_homography;
use crate::pose::MarkerPose;
use crate::projection::{project_points, reprojection_rmse};
use crate::refine::{refine_pose_lm, LMParams};

/// Physical layout of a square marker and the cube drawn on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerGeometry {
    /// Side length of the marker square, in marker units.
    pub side_length: f64,
    /// Height of the overlay cube, in marker units.
    pub cube_height: f64,
}

impl Default for MarkerGeometry {
    fn default() -> Self {
        Self {
            side_length: 1.0,
            cube_height: 1.0,
        }
    }
}

impl MarkerGeometry {
    /// Create a new geometry.
    pub fn new(side_length: f64, cube_height: f64) -> Self {
        Self {
            side_length,
            cube_height,
        }
    }

    /// Check that the side length is positive and the height is finite.
    pub fn validate(&self) -> Result<(), PoseError> {
        if !self.side_length.is_finite() || !self.cube_height.is_finite() {
            return Err(PoseError::NonFiniteInput("marker geometry"));
        }
        if self.side_length <= 0.0 {
            return Err(PoseError::DegenerateConfiguration(
                "marker side length must be positive",
            ));
        }
        Ok(())
    }

    /// Corners of the marker on its own plane, in the order the detector
    /// reports them: `(0, 0)`, `(0, s)`, `(s, s)`, `(s, 0)`.
    pub fn planar_corners(&self) -> [[f64; 2]; 4] {
        let s = self.side_length;
        [[0.0, 0.0], [0.0, s], [s, s], [s, 0.0]]
    }

    /// Top face of the overlay cube, one vertex above each planar corner.
    ///
    /// The marker's z axis points away from the camera, so the cube is
    /// extruded along negative z.
    pub fn cube_vertices(&self) -> [[f64; 3]; 4] {
        let z = -self.cube_height;
        self.planar_corners().map(|[x, y]| [x, y, z])
    }
}

/// A marker as reported by the external corner detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Marker identifier.
    pub id: u32,
    /// Pixel corners, in the same order as [`MarkerGeometry::planar_corners`].
    pub corners: [[f64; 2]; 4],
    /// Pixel centre of the marker.
    pub center: [f64; 2],
}

/// Everything needed to draw one marker's overlay.
///
/// `corners[i]` and `cube[i]` are joined by a vertical cube edge, and
/// consecutive indices form the base and the top squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerOverlay {
    /// Marker identifier.
    pub id: u32,
    /// Estimated pose of the marker.
    pub pose: MarkerPose,
    /// Observed pixel corners (base of the cube).
    pub corners: [[f64; 2]; 4],
    /// Projected pixel positions of the cube's top vertices.
    pub cube: Vec<[f64; 2]>,
    /// Pixel centre of the marker.
    pub center: [f64; 2],
    /// RMS distance between the observed corners and their reprojection.
    pub reprojection_rmse: f64,
}

/// Estimates marker poses for a fixed camera.
///
/// The marker geometry is validated when it is set, so a constructed
/// estimator only fails on bad detections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPoseEstimator {
    camera: CameraModel,
    method: DecompositionMethod,
    geometry: MarkerGeometry,
    refine: Option<LMParams>,
}

impl MarkerPoseEstimator {
    /// Create an estimator using the default strategy and marker geometry,
    /// without refinement.
    pub fn new(camera: CameraModel) -> Self {
        Self {
            camera,
            method: DecompositionMethod::default(),
            geometry: MarkerGeometry::default(),
            refine: None,
        }
    }

    /// Replace the decomposition strategy.
    pub fn with_method(mut self, method: DecompositionMethod) -> Self {
        self.method = method;
        self
    }

    /// Replace the marker geometry after checking it.
    pub fn with_geometry(mut self, geometry: MarkerGeometry) -> Result<Self, PoseError> {
        geometry.validate()?;
        self.geometry = geometry;
        Ok(self)
    }

    /// Refine every decomposed pose against the observed corners.
    ///
    /// The decomposition result seeds a Levenberg-Marquardt minimization of
    /// the pixel reprojection error, see [`refine_pose_lm`].
    pub fn with_refinement(mut self, params: LMParams) -> Self {
        self.refine = Some(params);
        self
    }

    /// The calibrated camera.
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// The decomposition strategy.
    pub fn method(&self) -> DecompositionMethod {
        self.method
    }

    /// The marker layout.
    pub fn geometry(&self) -> &MarkerGeometry {
        &self.geometry
    }

    /// The refinement parameters, if refinement is enabled.
    pub fn refinement(&self) -> Option<&LMParams> {
        self.refine.as_ref()
    }

    /// Estimate the pose of a marker from its four pixel corners.
    ///
    /// Corner distortion is not removed before the homography is fitted; the
    /// optional refinement step does model it.
    pub fn estimate(&self, corners: &[[f64; 2]; 4]) -> Result<MarkerPose, PoseError> {
        let planar = self.geometry.planar_corners();
        let homography = find_homography(&planar, corners)?;
        let pose = self.method.decompose(&homography, &self.camera.intrinsic)?;

        match &self.refine {
            Some(params) => {
                let (refined, _summary) =
                    refine_pose_lm(&planar, corners, &pose, &self.camera, params)?;
                Ok(refined)
            }
            None => Ok(pose),
        }
    }

    /// Estimate the pose of a detection and project its overlay cube.
    pub fn overlay(&self, detection: &Detection) -> Result<MarkerOverlay, PoseError> {
        let pose = self.estimate(&detection.corners)?;
        let cube = project_points(&self.geometry.cube_vertices(), &pose, &self.camera);
        let rmse = reprojection_rmse(
            &self.geometry.planar_corners(),
            &detection.corners,
            &pose,
            &self.camera,
        )?;

        log::debug!(
            "marker {}: t = {:?}, rvec = {:?}, rmse = {:.4}",
            detection.id,
            pose.translation,
            pose.rvec(),
            rmse
        );

        Ok(MarkerOverlay {
            id: detection.id,
            pose,
            corners: detection.corners,
            cube,
            center: detection.center,
            reprojection_rmse: rmse,
        })
    }

    /// Process all detections of one frame.
    ///
    /// A marker that fails is logged and left out; the others are still
    /// returned in input order.
    pub fn process_frame(&self, detections: &[Detection]) -> Vec<MarkerOverlay> {
        detections
            .iter()
            .filter_map(|detection| match self.overlay(detection) {
                Ok(overlay) => Some(overlay),
                Err(err) => {
                    log::warn!("skipping marker {}: {}", detection.id, err);
                    None
                }
            })
            .collect()
    }
}
