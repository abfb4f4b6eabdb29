//! Recover a marker pose from a plane-to-image homography and known intrinsics.
//!
//! Writing the marker plane as `z = 0`, a homography satisfies
//! `H ~ K [r1 r2 t]`, so `B = K⁻¹ H` holds the first two rotation columns and
//! the translation up to a common scale. Two strategies turn `B` into a pose:
//!
//! - [`decompose_normalized`] rescales by the mean column norm and completes
//!   the frame with a cross product. Fast, but the rotation is only
//!   approximately orthonormal when the corners are noisy.
//! - [`decompose_svd`] projects the candidate frame onto the closest proper
//!   rotation (Frobenius norm) with one 3x3 SVD.

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraIntrinsic;
use crate::error::PoseError;
use crate::homography::Homography;
use crate::linalg;
use crate::pose::MarkerPose;

/// Threshold below which a determinant is treated as zero.
const SINGULAR_TOL: f64 = 1e-12;

/// Strategy used to turn a homography into a rotation and a translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMethod {
    /// Scale by the mean of the first two column norms, no orthogonalization.
    Normalized,
    /// Orthogonalize the candidate rotation with an SVD.
    #[default]
    SvdOrthogonalized,
}

impl DecompositionMethod {
    /// Run the selected decomposition.
    pub fn decompose(
        &self,
        homography: &Homography,
        intrinsic: &CameraIntrinsic,
    ) -> Result<MarkerPose, PoseError> {
        match self {
            Self::Normalized => decompose_normalized(homography, intrinsic),
            Self::SvdOrthogonalized => decompose_svd(homography, intrinsic),
        }
    }
}

/// Dispatch function that routes to the chosen decomposition strategy.
pub fn decompose_homography(
    homography: &Homography,
    intrinsic: &CameraIntrinsic,
    method: DecompositionMethod,
) -> Result<MarkerPose, PoseError> {
    method.decompose(homography, intrinsic)
}

/// Decompose with the fast normalization strategy.
///
/// With `[a1 a2 a3] = ±K⁻¹H` and `λ = 2 / (‖a1‖ + ‖a2‖)`:
/// `r1 = λ a1`, `r2 = λ a2`, `r3 = r1 × r2`, `t = λ a3`.
///
/// `r1` and `r2` are not forced to be orthogonal, so the returned rotation is
/// only approximately orthonormal.
pub fn decompose_normalized(
    homography: &Homography,
    intrinsic: &CameraIntrinsic,
) -> Result<MarkerPose, PoseError> {
    let (a1, a2, a3) = extrinsic_columns(homography, intrinsic)?;

    let lambda = 2.0 / (a1.length() + a2.length());
    let r1 = lambda * a1;
    let r2 = lambda * a2;
    let r3 = r1.cross(r2);
    let t = lambda * a3;

    finish(DMat3::from_cols(r1, r2, r3), t)
}

/// Decompose with the SVD orthogonalization strategy.
///
/// Builds `M = [a1 a2 a1×a2]` from `[a1 a2 a3] = ±K⁻¹H`, factors
/// `M = U S Vᵀ` and returns `R = U diag(1, 1, det(U Vᵀ)) Vᵀ` together with
/// `t = a3 / ‖a1‖`. The rotation is orthonormal with determinant +1.
pub fn decompose_svd(
    homography: &Homography,
    intrinsic: &CameraIntrinsic,
) -> Result<MarkerPose, PoseError> {
    let (a1, a2, a3) = extrinsic_columns(homography, intrinsic)?;

    let candidate = DMat3::from_cols(a1, a2, a1.cross(a2));
    let t = a3 / a1.length();

    finish(linalg::closest_rotation(&candidate), t)
}

/// Compute the columns of `B = K⁻¹ H`, with the sign fixed so `det(B) > 0`.
///
/// The homography is normalized first, which makes both strategies
/// independent of the scale (and sign) of the input matrix.
fn extrinsic_columns(
    homography: &Homography,
    intrinsic: &CameraIntrinsic,
) -> Result<(DVec3, DVec3, DVec3), PoseError> {
    let det_k = intrinsic.determinant();
    if !det_k.is_finite() {
        return Err(PoseError::NonFiniteInput("intrinsic matrix"));
    }
    if det_k.abs() < SINGULAR_TOL {
        return Err(PoseError::SingularMatrix {
            what: "intrinsic matrix",
            det: det_k,
        });
    }

    let h = linalg::array33_to_dmat3(homography.normalized()?.matrix());
    let mut b = intrinsic.to_dmat3().inverse() * h;
    if !linalg::is_finite_mat3(&b) {
        return Err(PoseError::NonFiniteInput("K^-1 H"));
    }

    // scale-free determinant so the test does not depend on pixel units
    let norms = b.x_axis.length() * b.y_axis.length() * b.z_axis.length();
    let det = b.determinant();
    let rel_det = if norms > 0.0 { det / norms } else { 0.0 };
    if rel_det.abs() < SINGULAR_TOL {
        return Err(PoseError::SingularMatrix {
            what: "K^-1 H",
            det: rel_det,
        });
    }

    // H and -H describe the same mapping, only one puts the marker in front
    if det < 0.0 {
        b = b * -1.0;
    }

    Ok((b.x_axis, b.y_axis, b.z_axis))
}

fn finish(rotation: DMat3, translation: DVec3) -> Result<MarkerPose, PoseError> {
    if !linalg::is_finite_mat3(&rotation) || !translation.is_finite() {
        return Err(PoseError::NonFiniteInput("decomposed pose"));
    }
    Ok(MarkerPose::new(
        linalg::dmat3_to_array33(&rotation),
        translation.to_array(),
    ))
}
