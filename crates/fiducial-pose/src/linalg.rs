use glam::{DMat3, DVec3};

/// Convert a row-major 3x3 array into a glam matrix.
pub(crate) fn array33_to_dmat3(m: &[[f64; 3]; 3]) -> DMat3 {
    // glam stores columns, the arrays in the public API store rows
    DMat3::from_cols_array_2d(m).transpose()
}

/// Convert a glam matrix back into a row-major 3x3 array.
pub(crate) fn dmat3_to_array33(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Compute the full SVD of a 3x3 matrix, `m = u * diag(s) * v^T`.
///
/// Singular values are returned in non-increasing order.
pub(crate) fn svd3(m: &DMat3) -> (DMat3, DVec3, DMat3) {
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| m.col(j)[i]);
    let svd = mat.svd();
    let (u, v, s) = (svd.u(), svd.v(), svd.s_diagonal());

    let col = |m: faer::MatRef<'_, f64>, j: usize| DVec3::new(m.read(0, j), m.read(1, j), m.read(2, j));

    (
        DMat3::from_cols(col(u, 0), col(u, 1), col(u, 2)),
        DVec3::new(s.read(0), s.read(1), s.read(2)),
        DMat3::from_cols(col(v, 0), col(v, 1), col(v, 2)),
    )
}

/// Closest proper rotation to `m` in the Frobenius norm.
///
/// With `m = U S V^T` this is `U diag(1, 1, det(U V^T)) V^T`.
pub(crate) fn closest_rotation(m: &DMat3) -> DMat3 {
    let (u, _s, v) = svd3(m);
    let d = (u * v.transpose()).determinant();
    u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, d.signum())) * v.transpose()
}

/// Check that every entry of a matrix is finite.
pub(crate) fn is_finite_mat3(m: &DMat3) -> bool {
    m.x_axis.is_finite() && m.y_axis.is_finite() && m.z_axis.is_finite()
}
