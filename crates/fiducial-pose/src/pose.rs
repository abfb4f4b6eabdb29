//! Rigid marker pose relative to the camera.

use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::linalg;

/// Rotations closer than this to orthonormal are converted as they are.
const ORTHONORMAL_TOL: f64 = 1e-12;

/// Pose of a marker expressed in the camera frame.
///
/// A point `p` in the marker's local frame maps into camera coordinates as
/// `R * p + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    /// Rotation matrix, row-major.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl MarkerPose {
    /// Create a pose from a rotation matrix and a translation.
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build a pose from a Rodrigues axis-angle vector and a translation.
    pub fn from_rvec(rvec: [f64; 3], translation: [f64; 3]) -> Self {
        let v = DVec3::from_array(rvec);
        let angle = v.length();
        let rot = if angle < f64::EPSILON {
            DMat3::IDENTITY
        } else {
            DMat3::from_axis_angle(v / angle, angle)
        };
        Self::new(linalg::dmat3_to_array33(&rot), translation)
    }

    /// Rodrigues axis-angle representation (log-map) of the rotation.
    ///
    /// A matrix that is not orthonormal is first replaced by the closest
    /// rotation in the Frobenius norm.
    pub fn rvec(&self) -> [f64; 3] {
        let mut r = self.rotation_mat();
        if self.orthonormality_error() > ORTHONORMAL_TOL {
            r = linalg::closest_rotation(&r);
        }
        let q = DQuat::from_mat3(&r).normalize();
        // keep the angle in [0, pi]
        let q = if q.w < 0.0 { -q } else { q };
        let (axis, angle) = q.to_axis_angle();
        if angle.abs() < f64::EPSILON {
            return [0.0; 3];
        }
        (axis * angle).to_array()
    }

    /// Transform a point from the marker frame into the camera frame.
    pub fn transform_point(&self, p: &[f64; 3]) -> [f64; 3] {
        (self.rotation_mat() * DVec3::from_array(*p) + self.translation_vec()).to_array()
    }

    /// Position of the camera centre expressed in the marker frame, `-R^T t`.
    pub fn camera_center(&self) -> [f64; 3] {
        (-(self.rotation_mat().transpose() * self.translation_vec())).to_array()
    }

    /// Frobenius norm of `R^T R - I`.
    pub fn orthonormality_error(&self) -> f64 {
        let r = self.rotation_mat();
        let e = r.transpose() * r - DMat3::IDENTITY;
        (e.x_axis.length_squared() + e.y_axis.length_squared() + e.z_axis.length_squared()).sqrt()
    }

    /// Determinant of the rotation matrix.
    pub fn rotation_determinant(&self) -> f64 {
        self.rotation_mat().determinant()
    }

    /// Check that the rotation is orthonormal with determinant +1 within `tol`.
    pub fn is_proper_rotation(&self, tol: f64) -> bool {
        self.orthonormality_error() <= tol && (self.rotation_determinant() - 1.0).abs() <= tol
    }

    pub(crate) fn rotation_mat(&self) -> DMat3 {
        linalg::array33_to_dmat3(&self.rotation)
    }

    pub(crate) fn translation_vec(&self) -> DVec3 {
        DVec3::from_array(self.translation)
    }
}
