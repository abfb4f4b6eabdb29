//! Direct linear transform (DLT) estimation of plane-to-image homographies.

use crate::error::PoseError;

/// Minimum number of correspondences needed to solve for a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Relative threshold on the eighth singular value of the DLT system.
const RANK_TOL: f64 = 1e-10;

/// Relative threshold on the triangle area spanned by three points.
const COLLINEAR_TOL: f64 = 1e-9;

/// Relative threshold on the bottom-right entry used for normalization.
const NORMALIZATION_TOL: f64 = 1e-12;

/// Relative threshold on the determinant of the normalized homography.
const DET_TOL: f64 = 1e-10;

/// A 3x3 plane-to-image homography, stored row-major.
///
/// The matrix is only defined up to scale. Homographies produced by
/// [`find_homography`] are normalized so that the bottom-right entry is one;
/// values built with [`Homography::new`] keep whatever scale they were given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    mat: [[f64; 3]; 3],
}

impl Homography {
    /// Wrap a row-major 3x3 matrix without rescaling it.
    pub fn new(mat: [[f64; 3]; 3]) -> Self {
        Self { mat }
    }

    /// The identity homography.
    pub fn identity() -> Self {
        Self::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// The underlying row-major matrix.
    pub fn matrix(&self) -> &[[f64; 3]; 3] {
        &self.mat
    }

    /// Return a copy scaled so the bottom-right entry is one.
    pub fn normalized(&self) -> Result<Self, PoseError> {
        let scale = self.mat[2][2];
        let max_abs = self
            .mat
            .iter()
            .flatten()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));

        if !scale.is_finite() || scale.abs() <= NORMALIZATION_TOL * max_abs || max_abs == 0.0 {
            return Err(PoseError::DegenerateHomography(scale));
        }

        Ok(self.scaled(1.0 / scale))
    }

    /// Return a copy with every entry multiplied by `s`.
    pub fn scaled(&self, s: f64) -> Self {
        let mut mat = self.mat;
        mat.iter_mut().flatten().for_each(|v| *v *= s);
        Self { mat }
    }

    /// Map a planar point through the homography.
    ///
    /// Returns `None` when the point maps to infinity.
    pub fn apply(&self, p: &[f64; 2]) -> Option<[f64; 2]> {
        let h = &self.mat;
        let x = h[0][0] * p[0] + h[0][1] * p[1] + h[0][2];
        let y = h[1][0] * p[0] + h[1][1] * p[1] + h[1][2];
        let w = h[2][0] * p[0] + h[2][1] * p[1] + h[2][2];
        // compared to its own terms so the test does not depend on the scale of H
        let w_mag = (h[2][0] * p[0]).abs() + (h[2][1] * p[1]).abs() + h[2][2].abs();
        if !w.is_finite() || w.abs() <= f64::EPSILON * w_mag {
            return None;
        }
        Some([x / w, y / w])
    }

    /// Determinant of the matrix divided by the product of its column norms.
    ///
    /// Lies in `[-1, 1]` and is invariant to the scale of the homography.
    pub fn relative_determinant(&self) -> f64 {
        let h = &self.mat;
        let det = h[0][0] * (h[1][1] * h[2][2] - h[1][2] * h[2][1])
            - h[0][1] * (h[1][0] * h[2][2] - h[1][2] * h[2][0])
            + h[0][2] * (h[1][0] * h[2][1] - h[1][1] * h[2][0]);
        let col_norm = |j: usize| (h[0][j] * h[0][j] + h[1][j] * h[1][j] + h[2][j] * h[2][j]).sqrt();
        let denom = col_norm(0) * col_norm(1) * col_norm(2);
        if denom == 0.0 {
            return 0.0;
        }
        det / denom
    }
}

/// Estimate the homography mapping planar marker points to pixel points.
///
/// * `planar` - points on the marker plane (z = 0) with shape (N, 2).
/// * `pixels` - the observed pixel coordinates with shape (N, 2).
///
/// Requires N >= 4 and no degenerate (collinear or coincident) configuration.
/// The returned homography is normalized so that its bottom-right entry is one.
///
/// Example:
///
/// ```
/// use fiducial_pose::homography::find_homography;
///
/// let planar = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];
/// let pixels = [[500.0, 500.0], [500.0, 700.0], [700.0, 700.0], [700.0, 500.0]];
/// let h = find_homography(&planar, &pixels)?;
/// let p = h.apply(&[0.5, 0.5]).unwrap();
/// assert!((p[0] - 600.0).abs() < 1e-6 && (p[1] - 600.0).abs() < 1e-6);
/// # Ok::<(), fiducial_pose::PoseError>(())
/// ```
pub fn find_homography(planar: &[[f64; 2]], pixels: &[[f64; 2]]) -> Result<Homography, PoseError> {
    let pixels_h = pixels.iter().map(|p| [p[0], p[1], 1.0]).collect::<Vec<_>>();
    find_homography_homogeneous(planar, &pixels_h)
}

/// Estimate a homography from pixel points given in homogeneous form `(u, v, w)`.
///
/// Each pixel point may carry an arbitrary non-zero scale; the result is the
/// same as for the dehomogenized points `(u / w, v / w)`.
pub fn find_homography_homogeneous(
    planar: &[[f64; 2]],
    pixels: &[[f64; 3]],
) -> Result<Homography, PoseError> {
    if planar.len() != pixels.len() {
        return Err(PoseError::MismatchedLengths {
            planar: planar.len(),
            pixel: pixels.len(),
        });
    }

    let n = planar.len();
    if n < MIN_CORRESPONDENCES {
        return Err(PoseError::InsufficientCorrespondences {
            required: MIN_CORRESPONDENCES,
            actual: n,
        });
    }

    if planar.iter().flatten().any(|v| !v.is_finite()) {
        return Err(PoseError::NonFiniteInput("planar points"));
    }
    if pixels.iter().flatten().any(|v| !v.is_finite()) {
        return Err(PoseError::NonFiniteInput("pixel points"));
    }

    let mut pixels_2d = Vec::with_capacity(n);
    for p in pixels {
        let mag = p[0].abs().max(p[1].abs()).max(p[2].abs());
        if p[2].abs() <= f64::EPSILON * mag {
            return Err(PoseError::DegenerateConfiguration("pixel point at infinity"));
        }
        pixels_2d.push([p[0] / p[2], p[1] / p[2]]);
    }

    // with the minimal set every triple has to span the plane
    if n == MIN_CORRESPONDENCES {
        if has_collinear_triple(planar) {
            return Err(PoseError::DegenerateConfiguration("collinear planar points"));
        }
        if has_collinear_triple(&pixels_2d) {
            return Err(PoseError::DegenerateConfiguration("collinear pixel points"));
        }
    }

    // construct matrix A, two rows per correspondence
    let mut mat_a = faer::Mat::<f64>::zeros(2 * n, 9);
    for (i, (pl, px)) in planar.iter().zip(pixels.iter()).enumerate() {
        let (x, y) = (pl[0], pl[1]);
        let (u, v, w) = (px[0], px[1], px[2]);

        mat_a.write(2 * i, 0, -w * x);
        mat_a.write(2 * i, 1, -w * y);
        mat_a.write(2 * i, 2, -w);
        mat_a.write(2 * i, 6, x * u);
        mat_a.write(2 * i, 7, y * u);
        mat_a.write(2 * i, 8, u);

        mat_a.write(2 * i + 1, 3, -w * x);
        mat_a.write(2 * i + 1, 4, -w * y);
        mat_a.write(2 * i + 1, 5, -w);
        mat_a.write(2 * i + 1, 6, x * v);
        mat_a.write(2 * i + 1, 7, y * v);
        mat_a.write(2 * i + 1, 8, v);
    }

    // solve A h = 0 and take the singular vector of the smallest singular value
    let svd = mat_a.svd();
    let s = svd.s_diagonal();
    let (s_max, s_8th) = (s.read(0), s.read(7));
    if s_max <= 0.0 || s_8th <= RANK_TOL * s_max {
        log::debug!("rank deficient DLT system: sigma_8 / sigma_1 = {:e}", s_8th / s_max);
        return Err(PoseError::DegenerateConfiguration(
            "correspondences do not determine a unique homography",
        ));
    }

    let h = svd.v().col(8);
    let homo = Homography::new([
        [h.read(0), h.read(1), h.read(2)],
        [h.read(3), h.read(4), h.read(5)],
        [h.read(6), h.read(7), h.read(8)],
    ])
    .normalized()?;

    // all pixels on one line give a rank-2 solution that still passes the rank test
    let rel_det = homo.relative_determinant();
    if rel_det.abs() < DET_TOL {
        log::debug!("singular homography: relative determinant {rel_det:e}");
        return Err(PoseError::DegenerateConfiguration("homography is singular"));
    }

    Ok(homo)
}

/// Check whether any three points of the set are collinear or coincident.
fn has_collinear_triple(points: &[[f64; 2]]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                if is_collinear(&points[i], &points[j], &points[k]) {
                    return true;
                }
            }
        }
    }
    false
}

fn is_collinear(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> bool {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ac = [c[0] - a[0], c[1] - a[1]];
    let cross = ab[0] * ac[1] - ab[1] * ac[0];
    let scale = ab[0].hypot(ab[1]) * ac[0].hypot(ac[1]);
    scale == 0.0 || cross.abs() <= COLLINEAR_TOL * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const UNIT_SQUARE: [[f64; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];

    fn assert_mat_eq(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3], epsilon: f64) {
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(a[i][j], b[i][j], epsilon = epsilon);
            }
        }
    }

    #[test]
    fn test_find_homography_identity() -> Result<(), PoseError> {
        let homo = find_homography(&UNIT_SQUARE, &UNIT_SQUARE)?;
        assert_mat_eq(homo.matrix(), Homography::identity().matrix(), 1e-9);
        Ok(())
    }

    #[test]
    fn test_find_homography_affine() -> Result<(), PoseError> {
        let expected = [[200.0, 0.0, 500.0], [0.0, 200.0, 500.0], [0.0, 0.0, 1.0]];
        let truth = Homography::new(expected);
        let pixels = UNIT_SQUARE.map(|p| truth.apply(&p).unwrap());

        let homo = find_homography(&UNIT_SQUARE, &pixels)?;
        assert_mat_eq(homo.matrix(), &expected, 1e-7);
        Ok(())
    }

    #[test]
    fn test_find_homography_perspective_roundtrip() -> Result<(), PoseError> {
        let truth = Homography::new([
            [180.0, -25.0, 640.0],
            [12.0, 210.0, 360.0],
            [0.05, -0.08, 1.0],
        ]);
        let pixels = UNIT_SQUARE.map(|p| truth.apply(&p).unwrap());

        let homo = find_homography(&UNIT_SQUARE, &pixels)?;
        assert_relative_eq!(homo.matrix()[2][2], 1.0);
        assert_mat_eq(homo.matrix(), truth.matrix(), 1e-6);

        for (pl, px) in UNIT_SQUARE.iter().zip(pixels.iter()) {
            let p = homo.apply(pl).unwrap();
            assert_relative_eq!(p[0], px[0], epsilon = 1e-8);
            assert_relative_eq!(p[1], px[1], epsilon = 1e-8);
        }
        Ok(())
    }

    #[test]
    fn test_find_homography_overdetermined() -> Result<(), PoseError> {
        let truth = Homography::new([
            [150.0, 20.0, 300.0],
            [-10.0, 160.0, 200.0],
            [0.02, 0.03, 1.0],
        ]);
        let planar = vec![
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [1.0, 0.0],
            [0.5, 0.5],
            [0.25, 0.75],
            [0.9, 0.1],
        ];
        let pixels = planar.iter().map(|p| truth.apply(p).unwrap()).collect::<Vec<_>>();

        let homo = find_homography(&planar, &pixels)?;
        assert_mat_eq(homo.matrix(), truth.matrix(), 1e-6);
        Ok(())
    }

    #[test]
    fn test_find_homography_homogeneous_scale_invariance() -> Result<(), PoseError> {
        let truth = Homography::new([
            [180.0, -25.0, 640.0],
            [12.0, 210.0, 360.0],
            [0.05, -0.08, 1.0],
        ]);
        let pixels = UNIT_SQUARE.map(|p| truth.apply(&p).unwrap());
        let reference = find_homography(&UNIT_SQUARE, &pixels)?;

        // same uniform scale on every point
        let uniform = pixels.map(|p| [3.5 * p[0], 3.5 * p[1], 3.5]);
        let homo = find_homography_homogeneous(&UNIT_SQUARE, &uniform)?;
        assert_mat_eq(homo.matrix(), reference.matrix(), 1e-8);

        // a different scale per point, including a negative one
        let scales = [0.5, 2.0, -1.5, 10.0];
        let mut mixed = [[0.0; 3]; 4];
        for (i, (p, s)) in pixels.iter().zip(scales).enumerate() {
            mixed[i] = [s * p[0], s * p[1], s];
        }
        let homo = find_homography_homogeneous(&UNIT_SQUARE, &mixed)?;
        assert_mat_eq(homo.matrix(), reference.matrix(), 1e-8);
        Ok(())
    }

    #[test]
    fn test_find_homography_insufficient() {
        let res = find_homography(&UNIT_SQUARE[..3], &UNIT_SQUARE[..3]);
        assert_eq!(
            res,
            Err(PoseError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_find_homography_mismatched() {
        let res = find_homography(&UNIT_SQUARE, &UNIT_SQUARE[..3]);
        assert_eq!(
            res,
            Err(PoseError::MismatchedLengths {
                planar: 4,
                pixel: 3
            })
        );
    }

    #[test]
    fn test_find_homography_duplicated_collinear_points() {
        // three collinear points with the last one duplicated
        let pixels = [[10.0, 10.0], [20.0, 20.0], [30.0, 30.0], [30.0, 30.0]];
        let res = find_homography(&UNIT_SQUARE, &pixels);
        assert!(matches!(res, Err(PoseError::DegenerateConfiguration(_))));

        let planar = [[0.0, 0.0], [0.5, 0.5], [1.0, 1.0], [1.0, 1.0]];
        let pixels = [[500.0, 500.0], [500.0, 700.0], [700.0, 700.0], [700.0, 500.0]];
        let res = find_homography(&planar, &pixels);
        assert!(matches!(res, Err(PoseError::DegenerateConfiguration(_))));
    }

    #[test]
    fn test_find_homography_all_pixels_on_a_line() {
        // five points so the minimal-set triple test does not apply
        let planar = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.5, 0.2]];
        let pixels = [[0.0, 5.0], [1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0]];
        let res = find_homography(&planar, &pixels);
        assert!(matches!(res, Err(PoseError::DegenerateConfiguration(_))));
    }

    #[test]
    fn test_find_homography_non_finite() {
        let pixels = [[500.0, 500.0], [500.0, f64::NAN], [700.0, 700.0], [700.0, 500.0]];
        assert_eq!(
            find_homography(&UNIT_SQUARE, &pixels),
            Err(PoseError::NonFiniteInput("pixel points"))
        );
    }

    #[test]
    fn test_normalized_rejects_vanishing_scale() {
        let homo = Homography::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        assert_eq!(homo.normalized(), Err(PoseError::DegenerateHomography(0.0)));
    }

    #[test]
    fn test_apply_point_at_infinity() {
        let homo = Homography::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]);
        assert!(homo.apply(&[0.0, 3.0]).is_none());
        assert!(homo.apply(&[2.0, 3.0]).is_some());
    }

    #[test]
    fn test_apply_independent_of_matrix_scale() {
        let homo = Homography::new([[2.0, 0.0, 1.0], [0.0, 2.0, 1.0], [1.0, -1.0, 1.0]]);
        let expected = homo.apply(&[0.5, 0.25]).unwrap();

        for s in [1e-20, 1e-8, 1e12] {
            let p = homo.scaled(s).apply(&[0.5, 0.25]).unwrap();
            assert_relative_eq!(p[0], expected[0], epsilon = 1e-12);
            assert_relative_eq!(p[1], expected[1], epsilon = 1e-12);

            // w = x - y + 1 cancels exactly at (1, 2)
            assert!(homo.scaled(s).apply(&[1.0, 2.0]).is_none());
        }
    }

    #[test]
    fn test_find_homography_tiny_uniform_scale() -> Result<(), PoseError> {
        let pixels = [[500.0, 500.0], [500.0, 700.0], [700.0, 700.0], [700.0, 500.0]];
        let reference = find_homography(&UNIT_SQUARE, &pixels)?;

        for s in [1e-17, 1e-30, 1e20] {
            let scaled = pixels.map(|p| [s * p[0], s * p[1], s]);
            let homo = find_homography_homogeneous(&UNIT_SQUARE, &scaled)?;
            assert_mat_eq(homo.matrix(), reference.matrix(), 1e-7);
        }
        Ok(())
    }

    #[test]
    fn test_find_homography_rejects_point_at_infinity() {
        let pixels = [[500.0, 500.0, 1.0], [500.0, 700.0, 0.0], [700.0, 700.0, 1.0], [700.0, 500.0, 1.0]];
        assert_eq!(
            find_homography_homogeneous(&UNIT_SQUARE, &pixels),
            Err(PoseError::DegenerateConfiguration("pixel point at infinity"))
        );
    }
}
