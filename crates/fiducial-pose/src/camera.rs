//! Pinhole camera intrinsics and lens distortion.
use glam::DMat3;

use crate::error::PoseError;
use crate::linalg;

/// Tolerance on the structural zeros of an intrinsic matrix.
const STRUCTURAL_ZERO_TOL: f64 = 1e-12;

/// Represents the intrinsic parameters of a pinhole camera.
///
/// The matrix form is upper triangular:
///
/// ```text
/// K = [fx  skew cx]
///     [0   fy   cy]
///     [0   0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsic {
    /// The focal length in the x direction
    pub fx: f64,
    /// The focal length in the y direction
    pub fy: f64,
    /// The x coordinate of the principal point
    pub cx: f64,
    /// The y coordinate of the principal point
    pub cy: f64,
    /// The axis skew, zero for square pixels
    pub skew: f64,
}

impl CameraIntrinsic {
    /// Create intrinsics from focal lengths and principal point, with zero skew.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Create intrinsics from a row-major 3x3 matrix.
    ///
    /// The matrix must be upper triangular with a unit bottom-right entry and
    /// finite, strictly positive focal lengths.
    pub fn from_matrix(k: &[[f64; 3]; 3]) -> Result<Self, PoseError> {
        if k.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PoseError::NonFiniteInput("intrinsic matrix"));
        }

        if k[1][0].abs() > STRUCTURAL_ZERO_TOL
            || k[2][0].abs() > STRUCTURAL_ZERO_TOL
            || k[2][1].abs() > STRUCTURAL_ZERO_TOL
            || (k[2][2] - 1.0).abs() > STRUCTURAL_ZERO_TOL
        {
            return Err(PoseError::InvalidIntrinsics(
                "matrix must have form [[fx, s, cx], [0, fy, cy], [0, 0, 1]]".to_string(),
            ));
        }

        let intrinsic = Self {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
            skew: k[0][1],
        };
        intrinsic.validate()?;
        Ok(intrinsic)
    }

    /// Check the focal lengths; a zero focal length makes K singular.
    pub fn validate(&self) -> Result<(), PoseError> {
        if !(self.fx.is_finite() && self.fy.is_finite() && self.cx.is_finite())
            || !(self.cy.is_finite() && self.skew.is_finite())
        {
            return Err(PoseError::NonFiniteInput("intrinsic parameters"));
        }
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(PoseError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                self.fx, self.fy
            )));
        }
        Ok(())
    }

    /// Return the row-major 3x3 intrinsic matrix.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, self.skew, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Determinant of K, `fx * fy`.
    pub fn determinant(&self) -> f64 {
        self.fx * self.fy
    }

    pub(crate) fn to_dmat3(self) -> DMat3 {
        linalg::array33_to_dmat3(&self.matrix())
    }

    /// Map normalized image coordinates to pixels.
    #[inline]
    pub fn denormalize(&self, xn: f64, yn: f64) -> [f64; 2] {
        [
            self.fx * xn + self.skew * yn + self.cx,
            self.fy * yn + self.cy,
        ]
    }
}

/// Represents the polynomial distortion parameters of a camera.
///
/// This is the rational Brown-Conrady model with six radial and two
/// tangential coefficients, applied to normalized image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolynomialDistortion {
    /// The first radial distortion coefficient
    pub k1: f64,
    /// The second radial distortion coefficient
    pub k2: f64,
    /// The third radial distortion coefficient
    pub k3: f64,
    /// The fourth radial distortion coefficient
    pub k4: f64,
    /// The fifth radial distortion coefficient
    pub k5: f64,
    /// The sixth radial distortion coefficient
    pub k6: f64,
    /// The first tangential distortion coefficient
    pub p1: f64,
    /// The second tangential distortion coefficient
    pub p2: f64,
}

impl PolynomialDistortion {
    /// No distortion, all coefficients zero.
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from a coefficient vector in the usual calibration ordering
    /// `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`.
    ///
    /// An empty vector means no distortion.
    pub fn from_coeffs(coeffs: &[f64]) -> Result<Self, PoseError> {
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(PoseError::NonFiniteInput("distortion coefficients"));
        }

        let c = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        match coeffs.len() {
            0 | 4 | 5 | 8 => Ok(Self {
                k1: c(0),
                k2: c(1),
                p1: c(2),
                p2: c(3),
                k3: c(4),
                k4: c(5),
                k5: c(6),
                k6: c(7),
            }),
            len => Err(PoseError::InvalidDistortion { len }),
        }
    }

    /// Return the coefficients in the same ordering accepted by [`Self::from_coeffs`].
    pub fn to_coeffs(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        self.to_coeffs().iter().any(|&c| c != 0.0)
    }

    /// Distort a point given in normalized image coordinates.
    pub fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        // radial distortion
        let kr = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);

        // tangential distortion
        let xd = x * kr + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * kr + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        (xd, yd)
    }
}

/// A calibrated camera: intrinsics plus lens distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    /// Camera intrinsics
    pub intrinsic: CameraIntrinsic,
    /// Distortion parameters, all zero for an ideal pinhole
    pub distortion: PolynomialDistortion,
}

impl CameraModel {
    /// Create a camera model without distortion.
    pub fn pinhole(intrinsic: CameraIntrinsic) -> Self {
        Self {
            intrinsic,
            distortion: PolynomialDistortion::none(),
        }
    }

    /// Create a camera model with distortion.
    pub fn with_distortion(intrinsic: CameraIntrinsic, distortion: PolynomialDistortion) -> Self {
        Self {
            intrinsic,
            distortion,
        }
    }

    /// Build and validate a camera from a 3x3 matrix and a coefficient vector.
    pub fn from_parts(k: &[[f64; 3]; 3], distortion: &[f64]) -> Result<Self, PoseError> {
        Ok(Self::with_distortion(
            CameraIntrinsic::from_matrix(k)?,
            PolynomialDistortion::from_coeffs(distortion)?,
        ))
    }

    /// Map normalized image coordinates to distorted pixel coordinates.
    pub fn normalized_to_pixel(&self, xn: f64, yn: f64) -> [f64; 2] {
        let (xd, yd) = if self.distortion.has_distortion() {
            self.distortion.distort_normalized(xn, yn)
        } else {
            (xn, yn)
        };
        self.intrinsic.denormalize(xd, yd)
    }
}
