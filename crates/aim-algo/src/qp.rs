//! Equality-constrained quadratic programming via Clarabel.
//!
//! Solves
//!
//! ```text
//! minimize    (1/2) xᵀ H x + gᵀ x
//! subject to  A x = b
//! ```
//!
//! with [Clarabel](https://github.com/oxfordcontrol/Clarabel.rs), a
//! pure-Rust primal-dual interior-point solver for conic programs. The
//! equality rows are expressed as a zero cone (`Ax + s = b`, `s ∈ {0}`).
//!
//! Returned multipliers follow Clarabel's Lagrangian
//! `L = (1/2)xᵀHx + gᵀx + zᵀ(Ax − b)`, i.e. stationarity reads
//! `Hx + g + Aᵀz = 0`.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{DefaultSettingsBuilder, IPSolver, SupportedConeT};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Failure conditions of the QP backend.
#[derive(Debug, Error)]
pub enum QpError {
    #[error("Clarabel settings error: {0}")]
    Settings(String),

    #[error("Clarabel initialization failed: {0}")]
    Setup(String),

    #[error("QP not solved: Clarabel returned status {0}")]
    NotSolved(String),
}

/// Primal/dual result of an equality-constrained QP solve.
#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Primal minimizer.
    pub x: DVector<f64>,
    /// Multipliers on the equality rows, one per row of A.
    pub lam: DVector<f64>,
    /// Interior-point iterations.
    pub iterations: usize,
}

/// Convert the upper triangle (incl. diagonal) of a symmetric dense matrix
/// to CSC, dropping structural zeros. Clarabel reads only the upper
/// triangle of P.
fn upper_triangle_csc(h: &DMatrix<f64>) -> CscMatrix {
    let n = h.ncols();
    let mut col_ptr = Vec::with_capacity(n + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    let mut nnz = 0;
    for j in 0..n {
        col_ptr.push(nnz);
        for i in 0..=j {
            let v = h[(i, j)];
            if v != 0.0 {
                row_idx.push(i);
                values.push(v);
                nnz += 1;
            }
        }
    }
    col_ptr.push(nnz);
    CscMatrix::new(n, n, col_ptr, row_idx, values)
}

/// Convert a dense matrix to CSC, dropping structural zeros.
fn dense_csc(a: &DMatrix<f64>) -> CscMatrix {
    let (m, n) = a.shape();
    let mut col_ptr = Vec::with_capacity(n + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    let mut nnz = 0;
    for j in 0..n {
        col_ptr.push(nnz);
        for i in 0..m {
            let v = a[(i, j)];
            if v != 0.0 {
                row_idx.push(i);
                values.push(v);
                nnz += 1;
            }
        }
    }
    col_ptr.push(nnz);
    CscMatrix::new(m, n, col_ptr, row_idx, values)
}

/// Solve the equality-constrained QP `min ½xᵀHx + gᵀx s.t. Ax = b`.
///
/// `H` must be symmetric positive semidefinite (callers regularize their
/// Hessian blocks before assembly). Both bound vectors of the constraint
/// rows coincide with `b`, making every row a hard equality.
pub fn solve_equality_qp(
    h: &DMatrix<f64>,
    g: &DVector<f64>,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
) -> Result<QpSolution, QpError> {
    let n = h.ncols();
    let m = a.nrows();
    debug_assert_eq!(h.nrows(), n);
    debug_assert_eq!(g.len(), n);
    debug_assert_eq!(a.ncols(), n);
    debug_assert_eq!(b.len(), m);

    let p_mat = upper_triangle_csc(h);
    let a_mat = dense_csc(a);
    let q: Vec<f64> = g.iter().cloned().collect();
    let rhs: Vec<f64> = b.iter().cloned().collect();

    let cones = if m > 0 {
        vec![SupportedConeT::ZeroConeT(m)]
    } else {
        Vec::new()
    };

    let settings = DefaultSettingsBuilder::default()
        .verbose(false)
        .build()
        .map_err(|e| QpError::Settings(format!("{e:?}")))?;

    let mut solver = clarabel::solver::DefaultSolver::new(&p_mat, &q, &a_mat, &rhs, &cones, settings)
        .map_err(|e| QpError::Setup(format!("{e:?}")))?;

    solver.solve();

    let sol = solver.solution;
    if !matches!(
        sol.status,
        clarabel::solver::SolverStatus::Solved | clarabel::solver::SolverStatus::AlmostSolved
    ) {
        return Err(QpError::NotSolved(format!("{:?}", sol.status)));
    }

    Ok(QpSolution {
        x: DVector::from_vec(sol.x.clone()),
        lam: DVector::from_vec(sol.z.clone()),
        iterations: sol.iterations as usize,
    })
}
