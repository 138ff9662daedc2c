//! Per-vehicle optimal-control model.
//!
//! Each subsystem owns the decision variables of one vehicle:
//!
//! ```text
//! head / body:  x = [Tin, Tout, Tc, u_0 .. u_{N1+N2-1}]
//! tail / single: x = [Tin, Tout,     u_0 .. u_{N1+N2-1}]
//! ```
//!
//! The trajectory is a double integrator sampled on two phases: N1 steps of
//! length `Tin / N1` before the intersection entry and N2 steps of length
//! `(Tout − Tin) / N2` inside it. Hard equality constraints pin the position
//! to the entry distance at sample N1 and to the exit distance at sample
//! N1+N2. Head and body vehicles additionally carry a *copy* of their exit
//! time (the value their successor couples against) tied to the true exit
//! time by a strict inequality whose direction follows the configured
//! [`Orientation`].

use aim_core::{Orientation, ProblemConfig, SubsystemRole, VehicleParams};

use crate::nlp::NonlinearProgram;

/// Strict margin separating the copy variable from the exit time.
const COPY_MARGIN: f64 = f64::EPSILON;

/// Floor applied to the exit time in the cost normalization, so iterates
/// that stray below the time bounds during inner solver iterations cannot
/// flip the cost sign.
const TIME_FLOOR: f64 = 1e-6;

/// Result of simulating one trajectory.
#[derive(Debug, Clone, Copy)]
pub struct Rollout {
    /// Position at sample N1 (the intersection entry line).
    pub entry_position: f64,
    /// Position at sample N1 + N2 (the intersection exit line).
    pub exit_position: f64,
    /// Velocity-tracking + control-effort cost, normalized by the exit time.
    pub cost: f64,
}

/// Immutable description of one vehicle's local problem.
///
/// Built once before the outer loop; only evaluated afterwards.
#[derive(Debug, Clone)]
pub struct SubsystemSpec {
    /// Position of this vehicle in the crossing order.
    pub index: usize,
    /// Role derived from that position.
    pub role: SubsystemRole,
    /// Dual sign convention (shared across the whole problem).
    pub orientation: Orientation,
    /// Pre-entry sample count.
    pub n1: usize,
    /// In-intersection sample count.
    pub n2: usize,
    /// Physical data and limits.
    pub vehicle: VehicleParams,
}

impl SubsystemSpec {
    /// Build the spec for vehicle `index` of `config`.
    pub fn build(config: &ProblemConfig, index: usize) -> Self {
        Self {
            index,
            role: SubsystemRole::for_index(config.subsystem_count(), index),
            orientation: config.aladin.orientation,
            n1: config.sampling.n1,
            n2: config.sampling.n2,
            vehicle: config.vehicles[index].clone(),
        }
    }

    /// Number of timing variables (3 for head/body, 2 for tail/single).
    pub fn tau_len(&self) -> usize {
        self.role.tau_len()
    }

    /// Control horizon length N1 + N2.
    pub fn horizon(&self) -> usize {
        self.n1 + self.n2
    }

    /// Simulate the discretized dynamics and accumulate the cost.
    ///
    /// Per step: p⁺ = p + h·v + h²/2·u, v⁺ = v + h·u; the step length
    /// switches from `Tin/N1` to `(Tout−Tin)/N2` after sample N1.
    pub fn rollout(&self, tau: &[f64], u: &[f64]) -> Rollout {
        let t_in = tau[0];
        let t_out = tau[1];
        let v_ref = self.vehicle.vref;

        let mut p = self.vehicle.p0;
        let mut v = self.vehicle.v0;
        let mut cost = (v - v_ref) * (v - v_ref);
        let mut h = t_in / self.n1 as f64;

        let mut entry_position = 0.0;
        let mut exit_position = 0.0;

        for (k, &uk) in u.iter().enumerate().take(self.horizon()) {
            p += h * v + 0.5 * h * h * uk;
            v += h * uk;
            cost += (v - v_ref) * (v - v_ref) + uk * uk;

            if k + 1 == self.n1 {
                entry_position = p;
                h = (t_out - t_in) / self.n2 as f64;
            } else if k + 1 == self.horizon() {
                exit_position = p;
            }
        }

        Rollout {
            entry_position,
            exit_position,
            cost: cost / t_out.max(TIME_FLOOR),
        }
    }

    /// Base (unaugmented) cost.
    pub fn base_cost(&self, tau: &[f64], u: &[f64]) -> f64 {
        self.rollout(tau, u).cost
    }

    /// General constraint values, ordered copy inequality (head/body only),
    /// then entry equality, then exit equality. The boundary equalities are
    /// always the final two entries; Step 1 relies on this when reading the
    /// boundary duals.
    pub fn constraint_values(&self, tau: &[f64], u: &[f64]) -> Vec<f64> {
        let roll = self.rollout(tau, u);
        let mut g = Vec::with_capacity(self.num_general_constraints());
        if self.role.has_copy_variable() {
            let (t_out, t_c) = (tau[1], tau[2]);
            match self.orientation {
                Orientation::PrimalFavoring => g.push(t_out - t_c),
                Orientation::DualFavoring => g.push(t_c - t_out),
            }
        }
        g.push(roll.entry_position - self.vehicle.din);
        g.push(roll.exit_position - self.vehicle.dout);
        g
    }

    /// Bounds for [`Self::constraint_values`].
    pub fn constraint_value_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let mut lbg = Vec::with_capacity(self.num_general_constraints());
        let mut ubg = Vec::with_capacity(self.num_general_constraints());
        if self.role.has_copy_variable() {
            match self.orientation {
                Orientation::PrimalFavoring => {
                    lbg.push(f64::NEG_INFINITY);
                    ubg.push(-COPY_MARGIN);
                }
                Orientation::DualFavoring => {
                    lbg.push(COPY_MARGIN);
                    ubg.push(f64::INFINITY);
                }
            }
        }
        // Entry and exit pins.
        lbg.extend_from_slice(&[0.0, 0.0]);
        ubg.extend_from_slice(&[0.0, 0.0]);
        (lbg, ubg)
    }

    /// Number of general constraints (copy inequality + two boundary pins).
    pub fn num_general_constraints(&self) -> usize {
        if self.role.has_copy_variable() {
            3
        } else {
            2
        }
    }

    /// Bounds on the stacked variable vector [τ, u]: times are nonnegative,
    /// controls are boxed by the vehicle limits.
    pub fn stacked_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let nt = self.tau_len();
        let nu = self.horizon();
        let mut lb = vec![0.0; nt];
        let mut ub = vec![f64::INFINITY; nt];
        lb.extend(std::iter::repeat(self.vehicle.umin).take(nu));
        ub.extend(std::iter::repeat(self.vehicle.umax).take(nu));
        (lb, ub)
    }
}

/// One binding constraint at a subsystem's local optimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveConstraint {
    /// Position pinned to the entry distance at sample N1 (always active).
    EntryPosition,
    /// Position pinned to the exit distance at sample N1+N2 (always active).
    ExitPosition,
    /// Control sample `index` at one of its bounds.
    ControlBound { index: usize },
}

impl ActiveConstraint {
    /// Constraint value at (τ, u); zero when exactly binding (up to the
    /// bound offset for controls, which is constant and differentiates
    /// away).
    pub fn eval(&self, spec: &SubsystemSpec, tau: &[f64], u: &[f64]) -> f64 {
        match self {
            ActiveConstraint::EntryPosition => {
                spec.rollout(tau, u).entry_position - spec.vehicle.din
            }
            ActiveConstraint::ExitPosition => {
                spec.rollout(tau, u).exit_position - spec.vehicle.dout
            }
            ActiveConstraint::ControlBound { index } => u[*index],
        }
    }
}

/// The Step-1 objective kept *unevaluated* for the sensitivity computation:
///
/// ```text
/// f(τ, u) = cost(τ, u) + (ρ/2)‖τ − τ_ref‖² + copy_price·Tc + entry_price·Tin
/// ```
///
/// The price coefficients already carry the orientation sign and are zero
/// for boundaries this subsystem does not share with a neighbor.
#[derive(Debug, Clone)]
pub struct AugmentedObjective<'a> {
    spec: &'a SubsystemSpec,
    rho: f64,
    tau_ref: Vec<f64>,
    copy_price: f64,
    entry_price: f64,
}

impl<'a> AugmentedObjective<'a> {
    /// Assemble the augmented objective for `spec` given the current dual
    /// vector and proximal reference point.
    pub fn new(spec: &'a SubsystemSpec, tau_ref: &[f64], lambda: &[f64], rho: f64) -> Self {
        let sign = match spec.orientation {
            Orientation::PrimalFavoring => 1.0,
            Orientation::DualFavoring => -1.0,
        };
        let copy_price = if spec.role.has_copy_variable() {
            sign * lambda[spec.index]
        } else {
            0.0
        };
        let entry_price = if spec.role.has_predecessor() {
            -sign * lambda[spec.index - 1]
        } else {
            0.0
        };
        Self {
            spec,
            rho,
            tau_ref: tau_ref.to_vec(),
            copy_price,
            entry_price,
        }
    }

    /// The subsystem this objective belongs to.
    pub fn spec(&self) -> &SubsystemSpec {
        self.spec
    }

    /// Evaluate at (τ, u).
    pub fn eval(&self, tau: &[f64], u: &[f64]) -> f64 {
        let mut f = self.spec.base_cost(tau, u);
        let proximal: f64 = tau
            .iter()
            .zip(self.tau_ref.iter())
            .map(|(t, r)| (t - r) * (t - r))
            .sum();
        f += 0.5 * self.rho * proximal;
        if self.spec.role.has_copy_variable() {
            f += self.copy_price * tau[2];
        }
        f += self.entry_price * tau[0];
        f
    }

    /// Evaluate at a stacked point [τ, u].
    pub fn eval_stacked(&self, x: &[f64]) -> f64 {
        let (tau, u) = x.split_at(self.spec.tau_len());
        self.eval(tau, u)
    }
}

/// The full local NLP handed to the solver capability: augmented objective
/// over the stacked [τ, u] vector with the spec's bounds and constraints.
pub struct LocalNlp<'a> {
    aug: &'a AugmentedObjective<'a>,
}

impl<'a> LocalNlp<'a> {
    pub fn new(aug: &'a AugmentedObjective<'a>) -> Self {
        Self { aug }
    }
}

impl NonlinearProgram for LocalNlp<'_> {
    fn dim(&self) -> usize {
        let spec = self.aug.spec();
        spec.tau_len() + spec.horizon()
    }

    fn num_constraints(&self) -> usize {
        self.aug.spec().num_general_constraints()
    }

    fn objective(&self, x: &[f64]) -> f64 {
        self.aug.eval_stacked(x)
    }

    fn constraints(&self, x: &[f64]) -> Vec<f64> {
        let spec = self.aug.spec();
        let (tau, u) = x.split_at(spec.tau_len());
        spec.constraint_values(tau, u)
    }

    fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.aug.spec().stacked_bounds()
    }

    fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.aug.spec().constraint_value_bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_core::{AladinParams, Sampling};

    fn config(count: usize) -> ProblemConfig {
        let vehicle = VehicleParams {
            p0: 0.0,
            v0: 10.0,
            vref: 10.0,
            umin: -3.0,
            umax: 3.0,
            din: 50.0,
            dout: 80.0,
        };
        ProblemConfig {
            vehicles: vec![vehicle; count],
            aladin: AladinParams::default(),
            sampling: Sampling { n1: 5, n2: 3 },
            workers: 0,
        }
    }

    #[test]
    fn test_constant_velocity_rollout_hits_distances() {
        let spec = SubsystemSpec::build(&config(1), 0);
        // At constant 10 m/s: entry line (50 m) at t = 5, exit (80 m) at t = 8.
        let tau = [5.0, 8.0];
        let u = vec![0.0; spec.horizon()];
        let roll = spec.rollout(&tau, &u);
        assert!((roll.entry_position - 50.0).abs() < 1e-9);
        assert!((roll.exit_position - 80.0).abs() < 1e-9);
        // Perfect tracking with zero control: zero cost.
        assert!(roll.cost.abs() < 1e-12);
    }

    #[test]
    fn test_control_effort_enters_cost() {
        let spec = SubsystemSpec::build(&config(1), 0);
        let tau = [5.0, 8.0];
        let mut u = vec![0.0; spec.horizon()];
        u[0] = 1.0;
        assert!(spec.base_cost(&tau, &u) > 0.0);
    }

    #[test]
    fn test_constraint_layout_head_vs_tail() {
        let cfg = config(2);
        let head = SubsystemSpec::build(&cfg, 0);
        let tail = SubsystemSpec::build(&cfg, 1);
        assert_eq!(head.tau_len(), 3);
        assert_eq!(tail.tau_len(), 2);
        assert_eq!(head.num_general_constraints(), 3);
        assert_eq!(tail.num_general_constraints(), 2);

        // Boundary pins are the last two rows for both.
        let (lbg, ubg) = head.constraint_value_bounds();
        assert_eq!(&lbg[1..], &[0.0, 0.0]);
        assert_eq!(&ubg[1..], &[0.0, 0.0]);
    }

    #[test]
    fn test_copy_inequality_direction_per_orientation() {
        let mut cfg = config(2);
        cfg.aladin.orientation = Orientation::PrimalFavoring;
        let spec = SubsystemSpec::build(&cfg, 0);
        let u = vec![0.0; spec.horizon()];
        // Tc above Tout satisfies the primal-favoring constraint
        // (t_out - t_c strictly negative).
        let g = spec.constraint_values(&[5.0, 8.0, 8.5], &u);
        let (lbg, ubg) = spec.constraint_value_bounds();
        assert!(g[0] >= lbg[0] && g[0] <= ubg[0]);

        cfg.aladin.orientation = Orientation::DualFavoring;
        let spec = SubsystemSpec::build(&cfg, 0);
        let g = spec.constraint_values(&[5.0, 8.0, 8.5], &u);
        let (lbg, ubg) = spec.constraint_value_bounds();
        assert!(g[0] >= lbg[0] && g[0] <= ubg[0]);
        // And Tc below Tout now violates it.
        let g = spec.constraint_values(&[5.0, 8.0, 7.5], &u);
        assert!(g[0] < lbg[0]);
    }

    #[test]
    fn test_augmented_objective_prices_by_role() {
        let cfg = config(3);
        let lambda = [2.0, 5.0];
        let rho = 1.0;

        // Head: successor price on Tc only.
        let head = SubsystemSpec::build(&cfg, 0);
        let aug = AugmentedObjective::new(&head, &[5.0, 8.0, 8.0], &lambda, rho);
        let u = vec![0.0; head.horizon()];
        let base = aug.eval(&[5.0, 8.0, 8.0], &u);
        let shifted = aug.eval(&[5.0, 8.0, 9.0], &u);
        // Raising Tc by 1 adds lambda[0] = 2 plus the proximal quadratic 0.5.
        assert!((shifted - base - (2.0 + 0.5)).abs() < 1e-9);

        // Tail: predecessor price on Tin only, negative sign under the
        // primal-favoring orientation.
        let tail = SubsystemSpec::build(&cfg, 2);
        let aug = AugmentedObjective::new(&tail, &[5.0, 8.0], &lambda, rho);
        let u = vec![0.0; tail.horizon()];
        let f_ref = aug.eval(&[5.0, 8.0], &u);
        let f_up = aug.eval(&[6.0, 8.0], &u);
        let cost_ref = tail.base_cost(&[5.0, 8.0], &u);
        let cost_up = tail.base_cost(&[6.0, 8.0], &u);
        let expected = (cost_up - cost_ref) + 0.5 - 5.0;
        assert!((f_up - f_ref - expected).abs() < 1e-9);
    }

    #[test]
    fn test_control_bound_constraint_eval() {
        let spec = SubsystemSpec::build(&config(1), 0);
        let mut u = vec![0.0; spec.horizon()];
        u[3] = -3.0;
        let c = ActiveConstraint::ControlBound { index: 3 };
        assert_eq!(c.eval(&spec, &[5.0, 8.0], &u), -3.0);
    }
}
