#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Camera intrinsics and lens distortion.
///
/// [`camera::CameraModel`] bundles a pinhole [`camera::CameraIntrinsic`] with a
/// rational Brown-Conrady [`camera::PolynomialDistortion`].
pub mod camera;

/// Serde-backed pipeline configuration.
pub mod config;

/// Homography decomposition into a marker pose.
pub mod decompose;

/// Error types.
pub mod error;

/// Direct linear transform homography estimation.
///
/// See [`homography::find_homography`].
pub mod homography;

/// Marker geometry, detections and the per-frame pipeline.
pub mod marker;

/// The marker pose value type.
pub mod pose;

/// Projection of marker-frame points into the image.
pub mod projection;

/// Levenberg-Marquardt refinement of a pose against the observed corners.
pub mod refine;

mod linalg;

pub use crate::camera::{CameraIntrinsic, CameraModel, PolynomialDistortion};
pub use crate::config::{CameraConfig, PipelineConfig};
pub use crate::decompose::{
    decompose_homography, decompose_normalized, decompose_svd, DecompositionMethod,
};
pub use crate::error::{ConfigError, PoseError};
pub use crate::homography::{find_homography, find_homography_homogeneous, Homography};
pub use crate::marker::{Detection, MarkerGeometry, MarkerOverlay, MarkerPoseEstimator};
pub use crate::pose::MarkerPose;
pub use crate::projection::{project_points, reprojection_rmse};
pub use crate::refine::{refine_pose_lm, LMParams, RefineSummary};
