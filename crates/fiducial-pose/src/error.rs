//! Error types shared by the pose pipeline.

use thiserror::Error;

/// Errors raised while estimating or decomposing a marker homography.
///
/// Every variant is local to a single marker: callers processing a frame are
/// expected to drop the affected marker and keep going.
#[derive(Debug, Error, PartialEq)]
pub enum PoseError {
    /// Not enough correspondences to constrain the eight homography degrees of freedom.
    #[error("homography estimation requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required.
        required: usize,
        /// Number of correspondences provided.
        actual: usize,
    },

    /// Planar and pixel point sets have different lengths.
    #[error("mismatched correspondence lengths: planar points ({planar}) != pixel points ({pixel})")]
    MismatchedLengths {
        /// Number of planar points.
        planar: usize,
        /// Number of pixel points.
        pixel: usize,
    },

    /// An input coordinate or an intermediate result is NaN or infinite.
    #[error("non-finite value in {0}")]
    NonFiniteInput(&'static str),

    /// The correspondences do not span the plane (collinear or coincident points).
    #[error("degenerate point configuration: {0}")]
    DegenerateConfiguration(&'static str),

    /// The solved homography cannot be normalised by its bottom-right entry.
    #[error("degenerate homography: bottom-right entry {0:e} is too close to zero")]
    DegenerateHomography(f64),

    /// A matrix that must be inverted or decomposed is numerically singular.
    #[error("singular {what}: determinant {det:e}")]
    SingularMatrix {
        /// Which matrix was found singular.
        what: &'static str,
        /// The offending determinant (or normalised determinant).
        det: f64,
    },

    /// The intrinsic matrix does not have the pinhole upper-triangular form.
    #[error("invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// The distortion coefficient vector has an unsupported length.
    #[error("distortion vector must have 0, 4, 5 or 8 coefficients, got {len}")]
    InvalidDistortion {
        /// Number of coefficients provided.
        len: usize,
    },
}

/// Errors raised while loading a pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for the expected schema.
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The camera section failed validation.
    #[error("invalid camera configuration: {0}")]
    Camera(#[from] PoseError),

    /// The marker section failed validation.
    #[error("invalid marker configuration: {0}")]
    Marker(#[source] PoseError),
}
