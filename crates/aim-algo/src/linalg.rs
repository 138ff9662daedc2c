//! Dense linear-algebra helpers for the sensitivity reduction and QP
//! assembly.

use nalgebra::{DMatrix, DVector};

/// Moore-Penrose pseudo-inverse via SVD.
///
/// Singular values below `max(m, n) * eps * s_max` are treated as zero, so
/// rank-deficient inputs (degenerate active sets, singular Lyy blocks) are
/// handled without blowing up. Returns the zero matrix transpose-shaped for
/// an all-zero input.
pub fn pinv(a: &DMatrix<f64>) -> DMatrix<f64> {
    let (m, n) = a.shape();
    if m == 0 || n == 0 {
        return DMatrix::zeros(n, m);
    }
    let svd = a.clone().svd(true, true);
    let s_max = svd.singular_values.iter().cloned().fold(0.0f64, f64::max);
    let cutoff = (m.max(n) as f64) * f64::EPSILON * s_max;

    let u = svd.u.as_ref().expect("SVD requested with U");
    let v_t = svd.v_t.as_ref().expect("SVD requested with V^T");
    let k = svd.singular_values.len();

    // pinv(A) = V * S^+ * U^T, built column-block wise.
    let mut s_inv = DMatrix::zeros(k, k);
    for i in 0..k {
        let s = svd.singular_values[i];
        if s > cutoff {
            s_inv[(i, i)] = 1.0 / s;
        }
    }
    v_t.transpose() * s_inv * u.transpose()
}

/// Assemble a block-diagonal matrix from square dense blocks.
pub fn block_diag(blocks: &[DMatrix<f64>]) -> DMatrix<f64> {
    let total: usize = blocks.iter().map(|b| b.nrows()).sum();
    let mut out = DMatrix::zeros(total, total);
    let mut offset = 0;
    for b in blocks {
        debug_assert_eq!(b.nrows(), b.ncols());
        out.view_mut((offset, offset), (b.nrows(), b.ncols()))
            .copy_from(b);
        offset += b.nrows();
    }
    out
}

/// Concatenate vectors into one stacked vector.
pub fn stack(parts: &[DVector<f64>]) -> DVector<f64> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut out = DVector::zeros(total);
    let mut offset = 0;
    for p in parts {
        out.rows_mut(offset, p.len()).copy_from(p);
        offset += p.len();
    }
    out
}

/// A lower bound on the smallest eigenvalue of a symmetric matrix from
/// Gershgorin's circle theorem: min_i (a_ii - Σ_{j≠i} |a_ij|).
pub fn gershgorin_lower_bound(a: &DMatrix<f64>) -> f64 {
    let n = a.nrows();
    if n == 0 {
        return 0.0;
    }
    let mut bound = f64::INFINITY;
    for i in 0..n {
        let mut radius = 0.0;
        for j in 0..n {
            if j != i {
                radius += a[(i, j)].abs();
            }
        }
        bound = bound.min(a[(i, i)] - radius);
    }
    bound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinv_of_invertible_matrix_is_inverse() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 2.0, 3.0]);
        let p = pinv(&a);
        let id = &a * &p;
        for i in 0..2 {
            for j in 0..2 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((id[(i, j)] - expect).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_pinv_of_rank_deficient_matrix() {
        // Rank-1 matrix; pinv must satisfy A * A^+ * A = A.
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let p = pinv(&a);
        let reconstructed = &a * &p * &a;
        for i in 0..2 {
            for j in 0..2 {
                assert!((reconstructed[(i, j)] - a[(i, j)]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_pinv_of_zero_is_zero() {
        let a = DMatrix::zeros(3, 2);
        let p = pinv(&a);
        assert_eq!(p.shape(), (2, 3));
        assert!(p.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_block_diag_layout() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DMatrix::from_row_slice(1, 1, &[5.0]);
        let d = block_diag(&[a, b]);
        assert_eq!(d.shape(), (3, 3));
        assert_eq!(d[(0, 1)], 2.0);
        assert_eq!(d[(2, 2)], 5.0);
        assert_eq!(d[(2, 0)], 0.0);
        assert_eq!(d[(0, 2)], 0.0);
    }

    #[test]
    fn test_gershgorin_bound_on_diagonal_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 5.0]);
        assert!((gershgorin_lower_bound(&a) - 2.0).abs() < 1e-12);
        let zero = DMatrix::zeros(2, 2);
        assert_eq!(gershgorin_lower_bound(&zero), 0.0);
    }
}
