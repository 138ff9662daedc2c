//! Step 2: coupling-system assembly and termination check.
//!
//! The stacked timing vector τ = [τ_0, …, τ_{m-1}] is coupled by two kinds
//! of linear rows:
//!
//! - **Pair rows**, one per consecutive vehicle pair `(i, i+1)`: the copy
//!   variable of vehicle `i` (the last component of its τ block) must agree
//!   with the entry time of vehicle `i+1` (the first component of its
//!   block). The right-hand side carries the current disagreement, so the
//!   row reads `Tc_i − Tin_{i+1} = Tc_i* − Tin_{i+1}*` relative to the
//!   *current* local optima; the QP step then corrects it.
//! - **Copy rows**, added only while a vehicle's copy variable sits within
//!   `copied_gap` of its true exit time: `Tout_i − Tc_i = 0` ties the two
//!   together in the coordinated step.
//!
//! Termination compares the worse of the coupling residual and the largest
//! proximal movement against the tolerance.

use nalgebra::{DMatrix, DVector};

use aim_core::{AladinParams, Orientation};

use super::{tau_offsets, tau_total};
use crate::aladin::local_step::LocalSolution;
use crate::subsystem::SubsystemSpec;

/// The linear consensus constraints `A τ = b` over the stacked τ vector.
#[derive(Debug, Clone)]
pub struct CouplingSystem {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl CouplingSystem {
    /// Number of coupling rows.
    pub fn num_rows(&self) -> usize {
        self.a.nrows()
    }
}

/// Step-2 output: the assembled system plus the termination decision.
#[derive(Debug, Clone)]
pub struct ConsensusCheck {
    pub system: CouplingSystem,
    /// |Σ(Aτ* − b)| over all rows.
    pub coupling_residual: f64,
    /// Largest ρ-scaled movement of any timing variable in Step 1.
    pub movement_residual: f64,
    /// max(coupling, movement).
    pub residual: f64,
    /// True when the residual is within tolerance (an exactly zero residual
    /// always terminates).
    pub should_terminate: bool,
}

/// Assemble the coupling system from the Step-1 solutions and evaluate the
/// termination residual.
pub fn check_consensus(
    specs: &[SubsystemSpec],
    solutions: &[LocalSolution],
    params: &AladinParams,
) -> ConsensusCheck {
    debug_assert_eq!(specs.len(), solutions.len());
    let m = specs.len();
    let offsets = tau_offsets(specs);
    let n = tau_total(specs);

    let mut rows: Vec<Vec<(usize, f64)>> = Vec::new();
    let mut rhs: Vec<f64> = Vec::new();

    // Pair rows between consecutive vehicles.
    for i in 0..m.saturating_sub(1) {
        let copy_col = offsets[i] + specs[i].tau_len() - 1;
        let entry_col = offsets[i + 1];
        rows.push(vec![(copy_col, 1.0), (entry_col, -1.0)]);
        let t_c = *solutions[i].tau.last().unwrap_or(&0.0);
        let t_in_next = solutions[i + 1].tau.first().copied().unwrap_or(0.0);
        rhs.push(t_in_next - t_c);
    }

    // Copy rows, gated on the current copy gap.
    for (i, spec) in specs.iter().enumerate() {
        if !spec.role.has_copy_variable() {
            continue;
        }
        let t_out = solutions[i].tau[1];
        let t_c = solutions[i].tau[2];
        let gap = match spec.orientation {
            Orientation::PrimalFavoring => t_c - t_out,
            Orientation::DualFavoring => t_out - t_c,
        };
        if gap <= params.copied_gap {
            rows.push(vec![(offsets[i] + 1, 1.0), (offsets[i] + 2, -1.0)]);
            rhs.push(0.0);
        }
    }

    let mut a = DMatrix::zeros(rows.len(), n);
    for (r, entries) in rows.iter().enumerate() {
        for &(c, v) in entries {
            a[(r, c)] = v;
        }
    }
    let b = DVector::from_vec(rhs);

    // Stack the Step-1 optima and measure the residuals.
    let mut tau_star = DVector::zeros(n);
    for (i, sol) in solutions.iter().enumerate() {
        for (k, &t) in sol.tau.iter().enumerate() {
            tau_star[offsets[i] + k] = t;
        }
    }
    let violation = &a * &tau_star - &b;
    let coupling_residual = violation.iter().sum::<f64>().abs();

    let movement_residual = solutions
        .iter()
        .flat_map(|s| s.opt_movement.iter())
        .fold(0.0f64, |acc, &v| acc.max(v));

    let residual = coupling_residual.max(movement_residual);
    let should_terminate = residual == 0.0 || residual <= params.tol;

    ConsensusCheck {
        system: CouplingSystem { a, b },
        coupling_residual,
        movement_residual,
        residual,
        should_terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_core::{ProblemConfig, Sampling, VehicleParams};

    fn specs(count: usize) -> Vec<SubsystemSpec> {
        let vehicle = VehicleParams {
            p0: 0.0,
            v0: 10.0,
            vref: 10.0,
            umin: -3.0,
            umax: 3.0,
            din: 50.0,
            dout: 80.0,
        };
        let config = ProblemConfig {
            vehicles: vec![vehicle; count],
            aladin: AladinParams::default(),
            sampling: Sampling { n1: 2, n2: 2 },
            workers: 0,
        };
        (0..count).map(|i| SubsystemSpec::build(&config, i)).collect()
    }

    fn solution(tau: &[f64]) -> LocalSolution {
        LocalSolution {
            tau: tau.to_vec(),
            u: Vec::new(),
            opt_movement: vec![0.0; tau.len()],
            active: Vec::new(),
            active_duals: Vec::new(),
        }
    }

    #[test]
    fn test_pair_row_structure_for_two_vehicles() {
        // Head (3 vars) + tail (2 vars): one pair row with +1 on the head's
        // copy column and -1 on the tail's entry column.
        let specs = specs(2);
        let sols = vec![solution(&[5.0, 8.0, 8.5]), solution(&[9.0, 12.0])];
        let check = check_consensus(&specs, &sols, &AladinParams::default());

        let pair_row: Vec<f64> = (0..5).map(|c| check.system.a[(0, c)]).collect();
        assert_eq!(pair_row, vec![0.0, 0.0, 1.0, -1.0, 0.0]);
        assert_eq!(check.system.b[0], 9.0 - 8.5);
    }

    #[test]
    fn test_copy_row_added_only_within_gap() {
        let specs = specs(2);
        let params = AladinParams::default();

        // Copy far above the exit time: no copy row, just the pair row.
        let sols = vec![solution(&[5.0, 8.0, 9.0]), solution(&[9.0, 12.0])];
        let check = check_consensus(&specs, &sols, &params);
        assert_eq!(check.system.num_rows(), 1);

        // Copy tight against the exit time: the copy row appears.
        let tight = 8.0 + params.copied_gap / 2.0;
        let sols = vec![solution(&[5.0, 8.0, tight]), solution(&[tight, 12.0])];
        let check = check_consensus(&specs, &sols, &params);
        assert_eq!(check.system.num_rows(), 2);
        let copy_row: Vec<f64> = (0..5).map(|c| check.system.a[(1, c)]).collect();
        assert_eq!(copy_row, vec![0.0, 1.0, -1.0, 0.0, 0.0]);
        assert_eq!(check.system.b[1], 0.0);
    }

    #[test]
    fn test_exact_agreement_terminates() {
        let specs = specs(2);
        let sols = vec![solution(&[5.0, 8.0, 9.0]), solution(&[9.0, 12.0])];
        let check = check_consensus(&specs, &sols, &AladinParams::default());
        assert_eq!(check.coupling_residual, 0.0);
        assert_eq!(check.residual, 0.0);
        assert!(check.should_terminate);
    }

    #[test]
    fn test_disagreement_and_movement_block_termination() {
        let specs = specs(2);
        let params = AladinParams::default();

        // Coupling residual from a mismatched handoff. The rhs absorbs the
        // current optima, so the measured violation is twice the mismatch.
        let sols = vec![solution(&[5.0, 8.0, 9.0]), solution(&[9.5, 12.0])];
        let check = check_consensus(&specs, &sols, &params);
        assert!((check.coupling_residual - 1.0).abs() < 1e-12);
        assert!(!check.should_terminate);

        // Pure movement residual with perfect coupling.
        let mut sols = vec![solution(&[5.0, 8.0, 9.0]), solution(&[9.0, 12.0])];
        sols[1].opt_movement = vec![0.0, 3.0e-3];
        let check = check_consensus(&specs, &sols, &params);
        assert_eq!(check.coupling_residual, 0.0);
        assert!((check.movement_residual - 3.0e-3).abs() < 1e-15);
        assert!(!check.should_terminate);
    }

    #[test]
    fn test_single_vehicle_has_no_rows() {
        let specs = specs(1);
        let sols = vec![solution(&[5.0, 8.0])];
        let check = check_consensus(&specs, &sols, &AladinParams::default());
        assert_eq!(check.system.num_rows(), 0);
        assert!(check.should_terminate);
    }
}
