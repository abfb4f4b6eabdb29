//! Pinhole projection of marker-frame points into the image.

use glam::{DMat3, DVec3};

use crate::camera::CameraModel;
use crate::error::PoseError;
use crate::pose::MarkerPose;

/// Project 3D points given in the marker frame to pixel coordinates.
///
/// Each point is moved into the camera frame with `R * p + t`, divided by its
/// depth, passed through the camera's lens distortion and mapped through the
/// intrinsic matrix. Without distortion this is `K (R p + t)` followed by the
/// perspective division.
///
/// Points at or behind the camera plane are not filtered: their coordinates are
/// meaningless and callers must not pass them.
///
/// # Arguments
///
/// * `points` - Points in the marker's local frame.
/// * `pose` - Marker pose relative to the camera.
/// * `camera` - Intrinsics and distortion of the camera.
///
/// # Returns
///
/// One `[u, v]` pixel coordinate per input point, in the same order.
///
/// # Example
///
/// ```
/// use fiducial_pose::camera::{CameraIntrinsic, CameraModel};
/// use fiducial_pose::pose::MarkerPose;
/// use fiducial_pose::projection::project_points;
///
/// let camera = CameraModel::pinhole(CameraIntrinsic::new(1000.0, 1000.0, 500.0, 500.0));
/// let pose = MarkerPose::from_rvec([0.0; 3], [0.0, 0.0, 5.0]);
/// let pixels = project_points(&[[1.0, 1.0, 0.0]], &pose, &camera);
/// assert_eq!(pixels, vec![[700.0, 700.0]]);
/// ```
pub fn project_points(
    points: &[[f64; 3]],
    pose: &MarkerPose,
    camera: &CameraModel,
) -> Vec<[f64; 2]> {
    let r_mat = pose.rotation_mat();
    let t_vec = pose.translation_vec();

    points
        .iter()
        .map(|p| project_point(&r_mat, t_vec, DVec3::from_array(*p), camera))
        .collect()
}

/// Project a single marker-frame point, `R p + t` followed by the camera model.
#[inline]
pub(crate) fn project_point(r_mat: &DMat3, t_vec: DVec3, p: DVec3, camera: &CameraModel) -> [f64; 2] {
    let pc = *r_mat * p + t_vec;
    let inv_z = 1.0 / pc.z;
    camera.normalized_to_pixel(pc.x * inv_z, pc.y * inv_z)
}

/// Root-mean-square pixel distance between observed points and the
/// projection of the corresponding planar points (z = 0) under `pose`.
pub fn reprojection_rmse(
    planar: &[[f64; 2]],
    pixels: &[[f64; 2]],
    pose: &MarkerPose,
    camera: &CameraModel,
) -> Result<f64, PoseError> {
    if planar.len() != pixels.len() {
        return Err(PoseError::MismatchedLengths {
            planar: planar.len(),
            pixel: pixels.len(),
        });
    }
    if planar.is_empty() {
        return Err(PoseError::InsufficientCorrespondences {
            required: 1,
            actual: 0,
        });
    }

    let points = planar.iter().map(|p| [p[0], p[1], 0.0]).collect::<Vec<_>>();
    let projected = project_points(&points, pose, camera);

    let sum_sq = projected
        .iter()
        .zip(pixels.iter())
        .map(|(a, b)| {
            let du = a[0] - b[0];
            let dv = a[1] - b[1];
            du.mul_add(du, dv * dv)
        })
        .sum::<f64>();

    let rmse = (sum_sq / planar.len() as f64).sqrt();
    if !rmse.is_finite() {
        return Err(PoseError::NonFiniteInput("reprojection"));
    }
    Ok(rmse)
}
