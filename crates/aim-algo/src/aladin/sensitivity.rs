//! Step 3: reduction of each local value function to τ-space.
//!
//! At a local optimum the active constraints `h(τ, u) = 0` implicitly define
//! the controls as a function of the timing variables. Differentiating the
//! KKT stationarity of the Lagrangian `L = f + κᵀh` along that manifold
//! yields the sensitivities of the optimal controls and multipliers,
//!
//! ```text
//! dκ/dτ = (h_u L_uu⁺ h_uᵀ)⁺ (h_τ − h_u L_uu⁺ L_uτ)
//! du/dτ = −L_uu⁺ (h_uᵀ dκ/dτ + L_uτ)
//! ```
//!
//! from which the reduced gradient and Hessian of the value function follow:
//!
//! ```text
//! ∇V  = f_τ + (du/dτ)ᵀ f_u
//! ∇²V = L_ττ + L_τu du/dτ − (du/dτ)ᵀ h_uᵀ dκ/dτ
//! ```
//!
//! Pseudo-inverses keep degenerate active sets from blowing up; the reduced
//! Hessian is symmetrized before it reaches the QP.

use nalgebra::{DMatrix, DVector};

use crate::aladin::local_step::LocalSolution;
use crate::derive;
use crate::error::AladinError;
use crate::linalg::pinv;
use crate::subsystem::{AugmentedObjective, SubsystemSpec};

/// First- and second-order data of one subsystem at its local optimum,
/// partitioned into timing (x) and control (y) coordinates.
#[derive(Debug, Clone)]
pub struct SensitivityBlocks {
    pub fx: DVector<f64>,
    pub fy: DVector<f64>,
    pub lxx: DMatrix<f64>,
    pub lyy: DMatrix<f64>,
    pub lxy: DMatrix<f64>,
    pub lyx: DMatrix<f64>,
    pub hx: DMatrix<f64>,
    pub hy: DMatrix<f64>,
}

/// Eliminate the control coordinates from the blocks, returning the reduced
/// gradient and Hessian over the timing variables.
pub fn reduce(b: &SensitivityBlocks) -> (DVector<f64>, DMatrix<f64>) {
    let lyy_pinv = pinv(&b.lyy);

    let schur = &b.hy * &lyy_pinv * b.hy.transpose();
    let dkdx = pinv(&schur) * (&b.hx - &b.hy * &lyy_pinv * &b.lyx);
    let dydx = -(&lyy_pinv * (b.hy.transpose() * &dkdx + &b.lyx));

    let grad = &b.fx + dydx.transpose() * &b.fy;
    let hess_raw = &b.lxx + &b.lxy * &dydx - dydx.transpose() * b.hy.transpose() * &dkdx;
    let hess = 0.5 * (&hess_raw + hess_raw.transpose());
    (grad, hess)
}

/// Build the blocks of `spec` at its Step-1 optimum by finite differences
/// and reduce them.
///
/// Errors with [`AladinError::SingularSensitivity`] when the active set is
/// empty; the boundary pins guarantee it never is for a well-formed local
/// problem.
pub fn subsystem_sensitivity(
    spec: &SubsystemSpec,
    aug: &AugmentedObjective<'_>,
    sol: &LocalSolution,
) -> Result<(DVector<f64>, DMatrix<f64>), AladinError> {
    if sol.active.is_empty() {
        return Err(AladinError::SingularSensitivity {
            subsystem: spec.index,
        });
    }

    let nt = spec.tau_len();
    let nu = spec.horizon();
    let k = sol.active.len();

    let mut z = sol.tau.clone();
    z.extend_from_slice(&sol.u);

    let f = |x: &[f64]| aug.eval_stacked(x);
    let h = |x: &[f64]| {
        let (tau, u) = x.split_at(nt);
        sol.active.iter().map(|c| c.eval(spec, tau, u)).collect::<Vec<f64>>()
    };
    let duals = sol.active_duals.clone();
    let lagrangian = move |x: &[f64]| {
        let (tau, u) = x.split_at(nt);
        let mut v = aug.eval(tau, u);
        for (c, d) in sol.active.iter().zip(duals.iter()) {
            v += d * c.eval(spec, tau, u);
        }
        v
    };

    let grad_f = derive::gradient(f, &z);
    let hess_l = derive::hessian(lagrangian, &z);
    let jac_h = derive::jacobian(h, &z, k);

    let blocks = SensitivityBlocks {
        fx: grad_f.rows(0, nt).into_owned(),
        fy: grad_f.rows(nt, nu).into_owned(),
        lxx: hess_l.view((0, 0), (nt, nt)).into_owned(),
        lyy: hess_l.view((nt, nt), (nu, nu)).into_owned(),
        lxy: hess_l.view((0, nt), (nt, nu)).into_owned(),
        lyx: hess_l.view((nt, 0), (nu, nt)).into_owned(),
        hx: jac_h.columns(0, nt).into_owned(),
        hy: jac_h.columns(nt, nu).into_owned(),
    };

    Ok(reduce(&blocks))
}
