//! Augmented-Lagrangian NLP solver.
//!
//! Solves the bound- and constraint-bounded nonlinear program
//!
//! ```text
//! minimize    f(x)
//! subject to  lbg ≤ g(x) ≤ ubg
//!             lbx ≤  x   ≤ ubx
//! ```
//!
//! by a sequence of unconstrained subproblems handled with L-BFGS and a
//! Moré-Thuente line search. Constraints enter through the shifted-clip
//! augmented-Lagrangian term (the LANCELOT form, which covers equalities,
//! one-sided, and two-sided inequalities uniformly):
//!
//! ```text
//! φ_i(x) = (μ/2) · d_i(x)²,   d_i = (g_i + λ_i/μ) − clamp(g_i + λ_i/μ, lb_i, ub_i)
//! ```
//!
//! with the multiplier update `λ_i ← μ · d_i(x*)` after each inner solve.
//! Variable bounds are treated with the same machinery (their "constraint"
//! is the coordinate itself), which yields signed bound multipliers for
//! free: negative at an active lower bound, positive at an active upper
//! bound. The same sign convention applies to `lam_g`.
//!
//! The outer loop increases μ geometrically until the worst constraint
//! violation falls below tolerance; if the violation never reaches the
//! acceptance threshold the solve is reported as divergent.

use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use thiserror::Error;

/// A nonlinear program with box bounds on variables and constraints.
///
/// Implementations must be cheap to evaluate; derivatives are obtained by
/// finite differences, so `objective` is called O(n) times per inner
/// iteration.
pub trait NonlinearProgram: Sync {
    /// Number of decision variables.
    fn dim(&self) -> usize;

    /// Number of general constraints.
    fn num_constraints(&self) -> usize;

    /// Objective value at `x`.
    fn objective(&self, x: &[f64]) -> f64;

    /// General constraint values g(x), length [`Self::num_constraints`].
    fn constraints(&self, x: &[f64]) -> Vec<f64>;

    /// Variable bounds (lbx, ubx), each of length [`Self::dim`].
    fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>);

    /// Constraint bounds (lbg, ubg), each of length
    /// [`Self::num_constraints`]. Equalities use lbg = ubg.
    fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>);
}

/// Tuning knobs for the augmented-Lagrangian loop.
#[derive(Debug, Clone)]
pub struct NlpSettings {
    /// Maximum multiplier/penalty updates.
    pub max_outer_iter: usize,
    /// L-BFGS iterations per subproblem.
    pub max_inner_iter: u64,
    /// Constraint violation at which the outer loop stops early.
    pub constraint_tol: f64,
    /// Violation above which the final iterate is rejected as divergent.
    pub feasibility_tol: f64,
    /// Initial penalty μ.
    pub initial_penalty: f64,
    /// Geometric growth factor for μ.
    pub penalty_scale: f64,
    /// Cap on μ; beyond this conditioning degrades faster than feasibility
    /// improves.
    pub max_penalty: f64,
}

impl Default for NlpSettings {
    fn default() -> Self {
        Self {
            max_outer_iter: 10,
            max_inner_iter: 200,
            constraint_tol: 1e-8,
            feasibility_tol: 1e-5,
            initial_penalty: 10.0,
            penalty_scale: 10.0,
            max_penalty: 1e10,
        }
    }
}

/// Primal/dual result of a successful solve.
#[derive(Debug, Clone)]
pub struct NlpSolution {
    /// Primal minimizer (projected onto the variable bounds).
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub objective: f64,
    /// Constraint multipliers, signed: negative at an active lower bound,
    /// positive at an active upper bound, free sign for equalities.
    pub lam_g: Vec<f64>,
    /// Variable-bound multipliers, same sign convention.
    pub lam_x: Vec<f64>,
    /// Worst constraint/bound violation at the final iterate.
    pub violation: f64,
    /// Total inner (L-BFGS) iterations across all subproblems.
    pub inner_iterations: usize,
}

/// Failure conditions of the NLP solver.
#[derive(Debug, Error)]
pub enum NlpError {
    /// No iterate within the feasibility acceptance threshold was found.
    #[error("augmented-Lagrangian loop stalled with constraint violation {violation:.3e} (acceptance threshold {threshold:.1e})")]
    Divergence { violation: f64, threshold: f64 },
}

/// Shifted-clip residual `d = s − clamp(s, lb, ub)` with `s = g + λ/μ`.
///
/// Infinite bounds simply drop that side of the clamp.
fn shifted_residual(g: f64, lam: f64, mu: f64, lb: f64, ub: f64) -> f64 {
    let s = g + lam / mu;
    s - s.max(lb).min(ub)
}

/// Distance of `v` from the interval [lb, ub]; zero when inside.
fn interval_violation(v: f64, lb: f64, ub: f64) -> f64 {
    (lb - v).max(v - ub).max(0.0)
}

/// The unconstrained subproblem for a fixed (λ, μ).
struct AugLagProblem<'a, P: NonlinearProgram> {
    nlp: &'a P,
    penalty: f64,
    lam_g: &'a [f64],
    lam_x: &'a [f64],
    lbg: &'a [f64],
    ubg: &'a [f64],
    lbx: &'a [f64],
    ubx: &'a [f64],
}

impl<P: NonlinearProgram> AugLagProblem<'_, P> {
    fn eval(&self, x: &[f64]) -> f64 {
        let mut cost = self.nlp.objective(x);
        let g = self.nlp.constraints(x);
        for (i, gi) in g.iter().enumerate() {
            let d = shifted_residual(*gi, self.lam_g[i], self.penalty, self.lbg[i], self.ubg[i]);
            cost += 0.5 * self.penalty * d * d;
        }
        for (j, xj) in x.iter().enumerate() {
            let d = shifted_residual(*xj, self.lam_x[j], self.penalty, self.lbx[j], self.ubx[j]);
            cost += 0.5 * self.penalty * d * d;
        }
        cost
    }
}

impl<P: NonlinearProgram> CostFunction for AugLagProblem<'_, P> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.eval(x))
    }
}

impl<P: NonlinearProgram> Gradient for AugLagProblem<'_, P> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// Forward-difference gradient of the subproblem objective.
    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let eps = 1e-7;
        let f0 = self.eval(x);
        let mut grad = vec![0.0; x.len()];
        let mut xp = x.clone();
        for i in 0..x.len() {
            let xi = xp[i];
            xp[i] = xi + eps;
            grad[i] = (self.eval(&xp) - f0) / eps;
            xp[i] = xi;
        }
        Ok(grad)
    }
}

/// Project a point onto the box [lb, ub] componentwise.
fn project_onto_bounds(x: &mut [f64], lb: &[f64], ub: &[f64]) {
    for i in 0..x.len() {
        x[i] = x[i].max(lb[i]).min(ub[i]);
    }
}

/// Solve `problem` from the warm start `x0`.
///
/// Returns the primal solution together with constraint and bound
/// multipliers. Errors with [`NlpError::Divergence`] when the final iterate
/// is not acceptably feasible; no automatic retry is attempted.
pub fn solve<P: NonlinearProgram>(
    problem: &P,
    x0: &[f64],
    settings: &NlpSettings,
) -> Result<NlpSolution, NlpError> {
    let n = problem.dim();
    let m = problem.num_constraints();
    debug_assert_eq!(x0.len(), n);

    let (lbx, ubx) = problem.variable_bounds();
    let (lbg, ubg) = problem.constraint_bounds();
    debug_assert_eq!(lbg.len(), m);

    let mut x = x0.to_vec();
    let mut lam_g = vec![0.0; m];
    let mut lam_x = vec![0.0; n];
    let mut mu = settings.initial_penalty;
    let mut violation = f64::INFINITY;
    let mut inner_iterations = 0usize;

    for _outer in 0..settings.max_outer_iter {
        let subproblem = AugLagProblem {
            nlp: problem,
            penalty: mu,
            lam_g: &lam_g,
            lam_x: &lam_x,
            lbg: &lbg,
            ubg: &ubg,
            lbx: &lbx,
            ubx: &ubx,
        };

        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, 7);
        let executor = Executor::new(subproblem, solver)
            .configure(|state| state.param(x.clone()).max_iters(settings.max_inner_iter));

        match executor.run() {
            Ok(res) => {
                inner_iterations += res.state().get_iter() as usize;
                if let Some(best) = res.state().get_best_param() {
                    x = best.clone();
                }
            }
            Err(_) => {
                // Line search failure; keep the current iterate, a larger
                // penalty often recovers.
            }
        }

        // First-order multiplier update at the new iterate.
        let g = problem.constraints(&x);
        for i in 0..m {
            lam_g[i] = mu * shifted_residual(g[i], lam_g[i], mu, lbg[i], ubg[i]);
        }
        for j in 0..n {
            lam_x[j] = mu * shifted_residual(x[j], lam_x[j], mu, lbx[j], ubx[j]);
        }

        violation = 0.0f64;
        for i in 0..m {
            violation = violation.max(interval_violation(g[i], lbg[i], ubg[i]));
        }
        for j in 0..n {
            violation = violation.max(interval_violation(x[j], lbx[j], ubx[j]));
        }

        if violation < settings.constraint_tol {
            break;
        }
        mu = (mu * settings.penalty_scale).min(settings.max_penalty);
    }

    if violation > settings.feasibility_tol {
        return Err(NlpError::Divergence {
            violation,
            threshold: settings.feasibility_tol,
        });
    }

    // Small residual bound violations left by the finite penalty are
    // removed here; constraint violations stay as measured.
    project_onto_bounds(&mut x, &lbx, &ubx);

    let objective = problem.objective(&x);
    Ok(NlpSolution {
        x,
        objective,
        lam_g,
        lam_x,
        violation,
        inner_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// min (x0-1)^2 + (x1-2)^2  s.t.  x0 + x1 = 2.
    /// Solution (0.5, 1.5), multiplier +1 (from 2(x0-1) + λ = 0).
    struct EqualityQuadratic;

    impl NonlinearProgram for EqualityQuadratic {
        fn dim(&self) -> usize {
            2
        }
        fn num_constraints(&self) -> usize {
            1
        }
        fn objective(&self, x: &[f64]) -> f64 {
            (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2)
        }
        fn constraints(&self, x: &[f64]) -> Vec<f64> {
            vec![x[0] + x[1]]
        }
        fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![f64::NEG_INFINITY; 2], vec![f64::INFINITY; 2])
        }
        fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![2.0], vec![2.0])
        }
    }

    /// min (x-2)^2  s.t.  0 ≤ x ≤ 1. Solution x = 1 with a positive
    /// multiplier (+2) on the active upper bound.
    struct UpperBoundActive;

    impl NonlinearProgram for UpperBoundActive {
        fn dim(&self) -> usize {
            1
        }
        fn num_constraints(&self) -> usize {
            0
        }
        fn objective(&self, x: &[f64]) -> f64 {
            (x[0] - 2.0).powi(2)
        }
        fn constraints(&self, _x: &[f64]) -> Vec<f64> {
            Vec::new()
        }
        fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![0.0], vec![1.0])
        }
        fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (Vec::new(), Vec::new())
        }
    }

    /// g(x) = x^2 pinned to -1: infeasible by construction.
    struct Infeasible;

    impl NonlinearProgram for Infeasible {
        fn dim(&self) -> usize {
            1
        }
        fn num_constraints(&self) -> usize {
            1
        }
        fn objective(&self, x: &[f64]) -> f64 {
            x[0] * x[0]
        }
        fn constraints(&self, x: &[f64]) -> Vec<f64> {
            vec![x[0] * x[0]]
        }
        fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![f64::NEG_INFINITY], vec![f64::INFINITY])
        }
        fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![-1.0], vec![-1.0])
        }
    }

    #[test]
    fn test_equality_constrained_quadratic() {
        let sol = solve(&EqualityQuadratic, &[0.0, 0.0], &NlpSettings::default()).unwrap();
        assert!((sol.x[0] - 0.5).abs() < 1e-4, "x0 = {}", sol.x[0]);
        assert!((sol.x[1] - 1.5).abs() < 1e-4, "x1 = {}", sol.x[1]);
        assert!((sol.lam_g[0] - 1.0).abs() < 1e-3, "lam = {}", sol.lam_g[0]);
        assert!(sol.violation < 1e-5);
    }

    #[test]
    fn test_active_upper_bound_multiplier_sign() {
        let sol = solve(&UpperBoundActive, &[0.5], &NlpSettings::default()).unwrap();
        assert!((sol.x[0] - 1.0).abs() < 1e-4, "x = {}", sol.x[0]);
        // Upper bound active: positive multiplier near +2.
        assert!(sol.lam_x[0] > 1e-8);
        assert!((sol.lam_x[0] - 2.0).abs() < 1e-2, "lam_x = {}", sol.lam_x[0]);
    }

    #[test]
    fn test_infeasible_problem_reports_divergence() {
        let err = solve(&Infeasible, &[0.5], &NlpSettings::default()).unwrap_err();
        let NlpError::Divergence { violation, .. } = err;
        assert!(violation > 0.5);
    }

    #[test]
    fn test_inactive_bounds_leave_multipliers_zero() {
        let sol = solve(&EqualityQuadratic, &[0.0, 0.0], &NlpSettings::default()).unwrap();
        assert!(sol.lam_x[0].abs() < 1e-8);
        assert!(sol.lam_x[1].abs() < 1e-8);
    }
}
