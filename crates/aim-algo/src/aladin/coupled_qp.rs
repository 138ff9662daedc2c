//! Step 4: the coordinated consensus QP.
//!
//! The reduced per-subsystem curvature models are stacked block-diagonally
//! and minimized subject to the coupling rows from Step 2:
//!
//! ```text
//! min  (1/2) ΔτᵀH Δτ + gᵀΔτ    s.t.  A Δτ = b
//! ```
//!
//! Each Hessian block is regularized to strict positive definiteness before
//! assembly, so the QP has a unique minimizer (in particular, a zero model
//! with zero rhs yields Δτ = 0 exactly rather than an arbitrary point of a
//! flat objective). The equality multipliers come back as the fresh dual
//! prices for the next outer iteration.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::consensus::CouplingSystem;
use crate::error::AladinError;
use crate::linalg::{block_diag, gershgorin_lower_bound, stack};
use crate::qp;

/// Smallest admissible eigenvalue lower bound after regularization.
const MIN_CURVATURE: f64 = 1e-8;

/// The coordinated correction and the refreshed dual prices.
#[derive(Debug, Clone)]
pub struct ConsensusStep {
    /// Stacked timing correction Δτ.
    pub delta_tau: DVector<f64>,
    /// One multiplier per coupling row, in row order.
    pub prices: DVector<f64>,
}

/// Symmetrize a Hessian block and shift its diagonal until Gershgorin
/// certifies positive definiteness.
fn regularize(h: &DMatrix<f64>) -> DMatrix<f64> {
    let mut sym = 0.5 * (h + h.transpose());
    let bound = gershgorin_lower_bound(&sym);
    if bound < MIN_CURVATURE {
        let shift = MIN_CURVATURE - bound;
        for i in 0..sym.nrows() {
            sym[(i, i)] += shift;
        }
    }
    sym
}

/// Solve the consensus QP for the stacked correction.
pub fn solve_consensus_qp(
    gradients: &[DVector<f64>],
    hessians: &[DMatrix<f64>],
    system: &CouplingSystem,
    iteration: usize,
) -> Result<ConsensusStep, AladinError> {
    debug_assert_eq!(gradients.len(), hessians.len());

    let blocks: Vec<DMatrix<f64>> = hessians.iter().map(regularize).collect();
    let h = block_diag(&blocks);
    let g = stack(gradients);

    let sol = qp::solve_equality_qp(&h, &g, &system.a, &system.b)
        .map_err(|source| AladinError::QpFailure { iteration, source })?;

    debug!(
        iteration,
        rows = system.num_rows(),
        qp_iterations = sol.iterations,
        "consensus QP solved"
    );

    Ok(ConsensusStep {
        delta_tau: sol.x,
        prices: sol.lam,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_model_gives_zero_step() {
        // Flat local models with a satisfied coupling row: regularization
        // must pin the step at exactly the origin.
        let gradients = vec![DVector::zeros(3), DVector::zeros(2)];
        let hessians = vec![DMatrix::zeros(3, 3), DMatrix::zeros(2, 2)];
        let mut a = DMatrix::zeros(1, 5);
        a[(0, 2)] = 1.0;
        a[(0, 3)] = -1.0;
        let system = CouplingSystem {
            a,
            b: DVector::zeros(1),
        };
        let step = solve_consensus_qp(&gradients, &hessians, &system, 0).unwrap();
        assert_eq!(step.delta_tau.len(), 5);
        assert!(step.delta_tau.iter().all(|v| v.abs() < 1e-6));
        assert_eq!(step.prices.len(), 1);
    }

    #[test]
    fn test_coupled_correction_splits_evenly() {
        // min ½(x0² + x1²) s.t. x0 − x1 = 2  →  x = (1, −1).
        let gradients = vec![DVector::zeros(1), DVector::zeros(1)];
        let hessians = vec![DMatrix::identity(1, 1), DMatrix::identity(1, 1)];
        let a = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
        let system = CouplingSystem {
            a,
            b: DVector::from_vec(vec![2.0]),
        };
        let step = solve_consensus_qp(&gradients, &hessians, &system, 3).unwrap();
        assert!((step.delta_tau[0] - 1.0).abs() < 1e-5);
        assert!((step.delta_tau[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_indefinite_block_is_regularized() {
        let r = regularize(&DMatrix::from_row_slice(2, 2, &[-1.0, 0.5, 0.3, -2.0]));
        assert!(gershgorin_lower_bound(&r) >= MIN_CURVATURE - 1e-15);
        assert_eq!(r[(0, 1)], r[(1, 0)]);
    }
}
