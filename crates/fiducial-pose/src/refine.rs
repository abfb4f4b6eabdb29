//! Levenberg-Marquardt refinement of a marker pose.
//!
//! The homography decomposition minimizes an algebraic error. Refinement
//! starts from that pose and minimizes the pixel reprojection error of the
//! marker corners over the six pose parameters `(rvec, t)`, lens distortion
//! included.

use faer::prelude::SpSolver;
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::error::PoseError;
use crate::pose::MarkerPose;
use crate::projection::project_point;

/// Three correspondences give six residuals for six unknowns.
const MIN_CORRESPONDENCES: usize = 3;

/// Finite difference step on the rotation vector, in radians.
const ROT_STEP: f64 = 1e-6;

/// Finite difference step on the translation, relative to its largest entry.
const TRANS_STEP: f64 = 1e-6;

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iters: usize,
    /// Convergence threshold on the squared reprojection error, in pixels².
    pub eps: f64,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_mul: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-10,
            lambda_init: 1e-3,
            lambda_mul: 10.0,
        }
    }
}

/// Outcome of a refinement run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineSummary {
    /// Reprojection RMSE of the initial pose, in pixels.
    pub initial_rmse: f64,
    /// Reprojection RMSE of the refined pose, in pixels.
    pub rmse: f64,
    /// Number of LM iterations run.
    pub iterations: usize,
    /// Whether the error stopped decreasing before `max_iters`.
    pub converged: bool,
}

/// Refine a marker pose with Levenberg-Marquardt to minimize pixel reprojection error.
///
/// * `planar` - points on the marker plane (z = 0) with shape (N, 2), N >= 3.
/// * `pixels` - the observed pixel coordinates with shape (N, 2).
/// * `initial` - starting pose, typically from [`crate::decompose::decompose_svd`].
/// * `camera` - intrinsics and distortion used for the projection.
///
/// Only steps that lower the error are accepted, so the refined pose is never
/// worse than `initial`. The rotation is parametrized by its Rodrigues vector
/// and is always a proper rotation.
pub fn refine_pose_lm(
    planar: &[[f64; 2]],
    pixels: &[[f64; 2]],
    initial: &MarkerPose,
    camera: &CameraModel,
    params: &LMParams,
) -> Result<(MarkerPose, RefineSummary), PoseError> {
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

    if planar.iter().chain(pixels.iter()).flatten().any(|v| !v.is_finite()) {
        return Err(PoseError::NonFiniteInput("refinement correspondences"));
    }

    let points = planar
        .iter()
        .map(|p| DVec3::new(p[0], p[1], 0.0))
        .collect::<Vec<_>>();

    // residuals are written in place, the return value is their squared sum
    let residuals_into = |x: &[f64; 6], out: &mut [f64]| -> f64 {
        let pose = pose_from_params(x);
        let (r_mat, t_vec) = (pose.rotation_mat(), pose.translation_vec());
        let mut sum_sq = 0.0;
        for (i, (p, uv)) in points.iter().zip(pixels.iter()).enumerate() {
            let [u, v] = project_point(&r_mat, t_vec, *p, camera);
            let du = u - uv[0];
            let dv = v - uv[1];
            out[2 * i] = du;
            out[2 * i + 1] = dv;
            sum_sq += du.mul_add(du, dv * dv);
        }
        sum_sq
    };

    let rvec = initial.rvec();
    let t0 = initial.translation;
    let mut x = [rvec[0], rvec[1], rvec[2], t0[0], t0[1], t0[2]];

    let mut residuals = vec![0.0; 2 * n];
    let mut residuals_p = vec![0.0; 2 * n];
    let mut residuals_m = vec![0.0; 2 * n];
    let mut trial = vec![0.0; 2 * n];
    let mut jac = vec![[0.0f64; 6]; 2 * n];

    let mut err_sq = residuals_into(&x, &mut residuals);
    if !err_sq.is_finite() {
        return Err(PoseError::NonFiniteInput("initial reprojection"));
    }
    let initial_rmse = (err_sq / n as f64).sqrt();

    let mut lambda = params.lambda_init;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iters {
        if err_sq < params.eps {
            converged = true;
            break;
        }
        iterations += 1;

        // central differences
        let t_scale = x[3].abs().max(x[4].abs()).max(x[5].abs()).max(1.0);
        for k in 0..6 {
            let h = if k < 3 { ROT_STEP } else { TRANS_STEP * t_scale };
            let mut x_plus = x;
            let mut x_minus = x;
            x_plus[k] += h;
            x_minus[k] -= h;
            residuals_into(&x_plus, &mut residuals_p);
            residuals_into(&x_minus, &mut residuals_m);
            for (row, (rp, rm)) in jac
                .iter_mut()
                .zip(residuals_p.iter().zip(residuals_m.iter()))
            {
                row[k] = (rp - rm) / (2.0 * h);
            }
        }

        // (J^T J + lambda I) delta = -J^T r
        let mut jtj = [[0.0; 6]; 6];
        let mut jtr = [0.0; 6];
        for (row, r) in jac.iter().zip(residuals.iter()) {
            for c in 0..6 {
                jtr[c] += row[c] * r;
                for d in 0..6 {
                    jtj[c][d] += row[c] * row[d];
                }
            }
        }
        let mat_a = faer::Mat::<f64>::from_fn(6, 6, |i, j| {
            if i == j {
                jtj[i][j] + lambda
            } else {
                jtj[i][j]
            }
        });
        let rhs = faer::Mat::<f64>::from_fn(6, 1, |i, _| -jtr[i]);
        let delta = mat_a.partial_piv_lu().solve(rhs);

        let mut x_new = x;
        for (i, xi) in x_new.iter_mut().enumerate() {
            *xi += delta.read(i, 0);
        }

        // a non-finite trial error compares false and is rejected
        let err_sq_new = residuals_into(&x_new, &mut trial);
        if err_sq_new < err_sq {
            let decrease = err_sq - err_sq_new;
            x = x_new;
            std::mem::swap(&mut residuals, &mut trial);
            err_sq = err_sq_new;
            if decrease < params.eps {
                converged = true;
                break;
            }
            lambda = (lambda / params.lambda_mul).max(1e-12);
        } else {
            lambda *= params.lambda_mul;
        }
    }

    let summary = RefineSummary {
        initial_rmse,
        rmse: (err_sq / n as f64).sqrt(),
        iterations,
        converged,
    };
    log::debug!(
        "lm refinement: rmse {:.6} -> {:.6} px in {} iterations (converged: {})",
        summary.initial_rmse,
        summary.rmse,
        summary.iterations,
        summary.converged
    );

    Ok((pose_from_params(&x), summary))
}

fn pose_from_params(x: &[f64; 6]) -> MarkerPose {
    MarkerPose::from_rvec([x[0], x[1], x[2]], [x[3], x[4], x[5]])
}
