//! Step 1: decoupled augmented NLP solves.
//!
//! Each subsystem minimizes its augmented objective (base cost + proximal
//! penalty around the current consensus iterate + dual-priced coupling
//! terms) subject to its own dynamics pins, copy inequality, and control
//! bounds. Besides the primal solution, this step extracts the *active set*
//! that Step 3 linearizes: the two boundary pins (always active, they are
//! equalities) plus every control sample whose bound multiplier is
//! nonnegligible.

use tracing::debug;

use crate::error::AladinError;
use crate::nlp::{self, NlpSettings};
use crate::subsystem::{ActiveConstraint, AugmentedObjective, LocalNlp, SubsystemSpec};

/// Bound multipliers below this magnitude are treated as inactive.
const ACTIVITY_THRESHOLD: f64 = 1e-8;

/// Outcome of one subsystem's Step-1 solve.
#[derive(Debug, Clone)]
pub struct LocalSolution {
    /// Optimal timing vector τ*.
    pub tau: Vec<f64>,
    /// Optimal control sequence u*.
    pub u: Vec<f64>,
    /// ρ·|τ* − τ_guess| componentwise; feeds the termination residual.
    pub opt_movement: Vec<f64>,
    /// Constraints binding at (τ*, u*), boundary pins first.
    pub active: Vec<ActiveConstraint>,
    /// Multipliers matching [`Self::active`] one-to-one.
    pub active_duals: Vec<f64>,
}

/// Solve the augmented local NLP of `spec`, warm-started at
/// (`tau_guess`, `u_guess`).
///
/// Returns the solution together with the augmented objective it minimized;
/// Step 3 re-evaluates that same objective when building the sensitivity
/// blocks.
pub fn solve_local_nlp<'a>(
    spec: &'a SubsystemSpec,
    iteration: usize,
    tau_guess: &[f64],
    u_guess: &[f64],
    lambda: &[f64],
    rho: f64,
    settings: &NlpSettings,
) -> Result<(LocalSolution, AugmentedObjective<'a>), AladinError> {
    let aug = AugmentedObjective::new(spec, tau_guess, lambda, rho);
    let problem = LocalNlp::new(&aug);

    let mut x0 = tau_guess.to_vec();
    x0.extend_from_slice(u_guess);

    let sol =
        nlp::solve(&problem, &x0, settings).map_err(|source| AladinError::SolverDivergence {
            iteration,
            subsystem: spec.index,
            source,
        })?;

    let nt = spec.tau_len();
    let tau = sol.x[..nt].to_vec();
    let u = sol.x[nt..].to_vec();

    let opt_movement: Vec<f64> = tau
        .iter()
        .zip(tau_guess.iter())
        .map(|(t, g)| rho * (t - g).abs())
        .collect();

    let (active, active_duals) = build_active_set(spec, &sol.lam_g, &sol.lam_x);

    debug!(
        subsystem = spec.index,
        iteration,
        active = active.len(),
        inner_iterations = sol.inner_iterations,
        violation = sol.violation,
        "local NLP solved"
    );

    Ok((
        LocalSolution {
            tau,
            u,
            opt_movement,
            active,
            active_duals,
        },
        aug,
    ))
}

/// Assemble the active constraint set from the solver's multipliers.
///
/// The entry and exit pins are equalities and therefore always active;
/// their multipliers are the final two entries of `lam_g` (the constraint
/// ordering guarantees this). A control bound counts as active when its
/// bound multiplier exceeds the activity threshold in magnitude.
pub fn build_active_set(
    spec: &SubsystemSpec,
    lam_g: &[f64],
    lam_x: &[f64],
) -> (Vec<ActiveConstraint>, Vec<f64>) {
    let m = lam_g.len();
    let mut active = vec![
        ActiveConstraint::EntryPosition,
        ActiveConstraint::ExitPosition,
    ];
    let mut duals = vec![lam_g[m - 2], lam_g[m - 1]];

    let nt = spec.tau_len();
    for (k, &d) in lam_x[nt..].iter().enumerate() {
        if d.abs() > ACTIVITY_THRESHOLD {
            active.push(ActiveConstraint::ControlBound { index: k });
            duals.push(d);
        }
    }
    (active, duals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_core::{AladinParams, ProblemConfig, Sampling, VehicleParams};

    fn spec() -> SubsystemSpec {
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
            vehicles: vec![vehicle],
            aladin: AladinParams::default(),
            sampling: Sampling { n1: 4, n2: 2 },
            workers: 0,
        };
        SubsystemSpec::build(&config, 0)
    }

    #[test]
    fn test_active_set_always_contains_boundary_pins() {
        let spec = spec();
        let lam_g = [0.3, -0.7];
        let lam_x = vec![0.0; spec.tau_len() + spec.horizon()];
        let (active, duals) = build_active_set(&spec, &lam_g, &lam_x);
        assert_eq!(
            active,
            vec![
                ActiveConstraint::EntryPosition,
                ActiveConstraint::ExitPosition
            ]
        );
        assert_eq!(duals, vec![0.3, -0.7]);
    }

    #[test]
    fn test_active_set_picks_up_binding_controls() {
        let spec = spec();
        let lam_g = [0.0, 1.0, 2.0];
        let mut lam_x = vec![0.0; spec.tau_len() + spec.horizon()];
        // Timing-variable bound duals must be ignored.
        lam_x[0] = 5.0;
        // Control 1 at a bound, control 3 numerically clean zero.
        lam_x[spec.tau_len() + 1] = -0.4;
        lam_x[spec.tau_len() + 3] = 1e-12;
        let (active, duals) = build_active_set(&spec, &lam_g, &lam_x);
        assert_eq!(active.len(), 3);
        assert_eq!(active[2], ActiveConstraint::ControlBound { index: 1 });
        assert_eq!(duals[2], -0.4);
        // Boundary duals come from the last two lam_g entries.
        assert_eq!(duals[0], 1.0);
        assert_eq!(duals[1], 2.0);
    }

    #[test]
    fn test_local_solve_pins_boundary_positions() {
        let spec = spec();
        // Constant-speed guess already feasible; the solve should stay close.
        let tau_guess = [5.0, 8.0];
        let u_guess = vec![0.0; spec.horizon()];
        let (sol, _aug) = solve_local_nlp(
            &spec,
            0,
            &tau_guess,
            &u_guess,
            &[],
            AladinParams::default().rho,
            &NlpSettings::default(),
        )
        .unwrap();

        let roll = spec.rollout(&sol.tau, &sol.u);
        assert!(
            (roll.entry_position - 50.0).abs() < 1e-3,
            "entry = {}",
            roll.entry_position
        );
        assert!(
            (roll.exit_position - 80.0).abs() < 1e-3,
            "exit = {}",
            roll.exit_position
        );
        assert_eq!(sol.opt_movement.len(), spec.tau_len());
    }
}
