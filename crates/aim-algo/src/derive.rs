//! Finite-difference differentiation of black-box scalar and vector
//! functions.
//!
//! The subsystem objectives and constraints are ordinary Rust closures over
//! `&[f64]`, so derivatives are obtained numerically rather than from a
//! symbolic expression graph. Central differences are used throughout: the
//! O(h²) truncation error matters for the second-order blocks consumed by
//! the sensitivity reduction.
//!
//! Step sizes follow the usual optimal-scaling rules for f64:
//! - gradient/Jacobian: h ≈ eps^(1/3) ≈ 6e-6
//! - Hessian: h ≈ eps^(1/4) ≈ 1.2e-4
//!
//! Hessians are symmetrized explicitly; the raw cross-difference stencil is
//! symmetric only up to roundoff.

use nalgebra::{DMatrix, DVector};

/// Central-difference step for first derivatives.
pub const GRADIENT_STEP: f64 = 6e-6;

/// Central-difference step for second derivatives.
pub const HESSIAN_STEP: f64 = 1.2e-4;

/// Gradient of `f` at `x` via central differences.
pub fn gradient<F>(f: F, x: &[f64]) -> DVector<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let h = GRADIENT_STEP;
    let mut grad = DVector::zeros(n);
    let mut xp = x.to_vec();
    for i in 0..n {
        let xi = x[i];
        xp[i] = xi + h;
        let fp = f(&xp);
        xp[i] = xi - h;
        let fm = f(&xp);
        xp[i] = xi;
        grad[i] = (fp - fm) / (2.0 * h);
    }
    grad
}

/// Jacobian of a vector function `g: R^n -> R^m` at `x` via central
/// differences. `m` is the output dimension; `g` must return a vector of
/// exactly that length at every point.
pub fn jacobian<G>(g: G, x: &[f64], m: usize) -> DMatrix<f64>
where
    G: Fn(&[f64]) -> Vec<f64>,
{
    let n = x.len();
    let h = GRADIENT_STEP;
    let mut jac = DMatrix::zeros(m, n);
    let mut xp = x.to_vec();
    for j in 0..n {
        let xj = x[j];
        xp[j] = xj + h;
        let gp = g(&xp);
        xp[j] = xj - h;
        let gm = g(&xp);
        xp[j] = xj;
        debug_assert_eq!(gp.len(), m);
        for i in 0..m {
            jac[(i, j)] = (gp[i] - gm[i]) / (2.0 * h);
        }
    }
    jac
}

/// Hessian of `f` at `x` via the central cross-difference stencil,
/// symmetrized.
pub fn hessian<F>(f: F, x: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let h = HESSIAN_STEP;
    let mut hess = DMatrix::zeros(n, n);
    let mut xp = x.to_vec();

    let f0 = f(x);
    // Diagonal: (f(x+h) - 2 f(x) + f(x-h)) / h^2
    for i in 0..n {
        let xi = x[i];
        xp[i] = xi + h;
        let fp = f(&xp);
        xp[i] = xi - h;
        let fm = f(&xp);
        xp[i] = xi;
        hess[(i, i)] = (fp - 2.0 * f0 + fm) / (h * h);
    }
    // Off-diagonal: four-point cross stencil, upper triangle then mirror.
    for i in 0..n {
        for j in (i + 1)..n {
            let (xi, xj) = (x[i], x[j]);
            xp[i] = xi + h;
            xp[j] = xj + h;
            let fpp = f(&xp);
            xp[j] = xj - h;
            let fpm = f(&xp);
            xp[i] = xi - h;
            xp[j] = xj + h;
            let fmp = f(&xp);
            xp[j] = xj - h;
            let fmm = f(&xp);
            xp[i] = xi;
            xp[j] = xj;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h * h);
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }
    hess
}
