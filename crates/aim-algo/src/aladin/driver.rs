//! The outer ALADIN loop.
//!
//! [`Driver`] owns the per-vehicle problem specs and an optional dedicated
//! worker pool; [`Driver::run`] advances through the phases of each
//! iteration, fanning the embarrassingly parallel steps (local NLP solves,
//! sensitivity reductions) across the pool and serializing the consensus
//! check, the coupled QP, and the variable update.

use std::fmt;

use nalgebra::DVector;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use aim_core::ProblemConfig;

use super::consensus::{self, ConsensusCheck};
use super::coupled_qp;
use super::local_step::{self, LocalSolution};
use super::sensitivity;
use super::tau_offsets;
use crate::error::AladinError;
use crate::nlp::NlpSettings;
use crate::subsystem::{AugmentedObjective, SubsystemSpec};

/// Where the driver currently is (or finally stopped) in the iteration
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    IteratingStep1,
    CheckingTermination,
    ComputingSensitivities,
    SolvingConsensusQP,
    UpdatingVariables,
    Converged,
    MaxIterationsReached,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::IteratingStep1 => "step1-local-nlp",
            Phase::CheckingTermination => "step2-termination",
            Phase::ComputingSensitivities => "step3-sensitivities",
            Phase::SolvingConsensusQP => "step4-consensus-qp",
            Phase::UpdatingVariables => "variable-update",
            Phase::Converged => "converged",
            Phase::MaxIterationsReached => "max-iterations-reached",
        };
        f.write_str(name)
    }
}

/// Warm start for [`Driver::run`]: one timing vector and one control
/// sequence per vehicle plus the dual prices (one per consecutive pair; an
/// empty vector means start from zero prices).
#[derive(Debug, Clone)]
pub struct IterateInit {
    pub tau: Vec<Vec<f64>>,
    pub u: Vec<Vec<f64>>,
    pub lambda: Vec<f64>,
}

impl IterateInit {
    /// A constant-speed warm start: entry and exit times from driving the
    /// reference distances at the initial velocity, copy variables a hair
    /// beyond the exit time, zero controls, zero prices.
    pub fn kinematic(config: &ProblemConfig) -> Self {
        let mut tau = Vec::with_capacity(config.subsystem_count());
        let mut u = Vec::with_capacity(config.subsystem_count());
        for (i, vehicle) in config.vehicles.iter().enumerate() {
            let v = vehicle.v0.max(0.1);
            let t_in = vehicle.din / v;
            let t_out = t_in + (vehicle.dout - vehicle.din) / v;
            let role = aim_core::SubsystemRole::for_index(config.subsystem_count(), i);
            if role.has_copy_variable() {
                tau.push(vec![t_in, t_out, t_out + 1e-6]);
            } else {
                tau.push(vec![t_in, t_out]);
            }
            u.push(vec![0.0; config.sampling.horizon()]);
        }
        Self {
            tau,
            u,
            lambda: Vec::new(),
        }
    }
}

/// Final state of a run that did not abort with an error.
#[derive(Debug, Clone)]
pub struct AladinOutcome {
    /// True when the termination residual fell within tolerance.
    pub converged: bool,
    /// Terminal phase, [`Phase::Converged`] or
    /// [`Phase::MaxIterationsReached`].
    pub phase: Phase,
    /// Outer iterations in which Step 1 ran.
    pub iterations: usize,
    /// Last measured termination residual (infinite when no iteration ran).
    pub residual: f64,
    /// Per-vehicle timing vectors.
    pub tau: Vec<Vec<f64>>,
    /// Per-vehicle control sequences.
    pub u: Vec<Vec<f64>>,
    /// Dual prices on the pair couplings.
    pub lambda: Vec<f64>,
}

/// The ALADIN coordinator.
pub struct Driver {
    config: ProblemConfig,
    specs: Vec<SubsystemSpec>,
    pool: Option<rayon::ThreadPool>,
    nlp_settings: NlpSettings,
}

impl Driver {
    /// Validate `config` and set up the subsystem specs and worker pool.
    ///
    /// `workers == 0` shares the global rayon pool; any other value builds
    /// a dedicated pool of that size.
    pub fn new(config: ProblemConfig) -> Result<Self, AladinError> {
        config.validate()?;
        let specs = (0..config.subsystem_count())
            .map(|i| SubsystemSpec::build(&config, i))
            .collect();
        let pool = if config.workers > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.workers)
                    .build()
                    .map_err(|e| AladinError::WorkerPool(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            config,
            specs,
            pool,
            nlp_settings: NlpSettings::default(),
        })
    }

    /// The validated problem this driver coordinates.
    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    /// Run the outer loop from `init` until convergence or the iteration
    /// cap.
    pub fn run(&self, init: IterateInit) -> Result<AladinOutcome, AladinError> {
        let m = self.specs.len();
        let params = &self.config.aladin;

        let mut tau = init.tau;
        let mut u = init.u;
        let mut lambda = if init.lambda.is_empty() {
            vec![0.0; m.saturating_sub(1)]
        } else {
            init.lambda
        };
        let mut residual = f64::INFINITY;
        debug!(phase = %Phase::Initializing, subsystems = m, "driver ready");

        for iteration in 0..params.max_iter {
            debug!(phase = %Phase::IteratingStep1, iteration, "starting outer iteration");
            let bundles: Vec<(LocalSolution, AugmentedObjective<'_>)> = {
                let tau_ref = &tau;
                let u_ref = &u;
                let lambda_ref = &lambda;
                self.install(|| {
                    self.specs
                        .par_iter()
                        .enumerate()
                        .map(|(i, spec)| {
                            local_step::solve_local_nlp(
                                spec,
                                iteration,
                                &tau_ref[i],
                                &u_ref[i],
                                lambda_ref,
                                params.rho,
                                &self.nlp_settings,
                            )
                        })
                        .collect::<Result<Vec<_>, AladinError>>()
                })?
            };
            let (solutions, objectives): (Vec<_>, Vec<_>) = bundles.into_iter().unzip();

            debug!(phase = %Phase::CheckingTermination, iteration, "checking consensus");
            let check: ConsensusCheck = consensus::check_consensus(&self.specs, &solutions, params);
            info!(
                iteration,
                residual = check.residual,
                coupling = check.coupling_residual,
                movement = check.movement_residual,
                "consensus residual"
            );
            if check.should_terminate {
                info!(iteration, residual = check.residual, "converged");
                return Ok(AladinOutcome {
                    converged: true,
                    phase: Phase::Converged,
                    iterations: iteration + 1,
                    residual: check.residual,
                    tau: solutions.iter().map(|s| s.tau.clone()).collect(),
                    u: solutions.iter().map(|s| s.u.clone()).collect(),
                    lambda,
                });
            }

            debug!(phase = %Phase::ComputingSensitivities, iteration, "reducing value functions");
            let reduced: Vec<(DVector<f64>, nalgebra::DMatrix<f64>)> = self.install(|| {
                self.specs
                    .par_iter()
                    .zip(objectives.par_iter())
                    .zip(solutions.par_iter())
                    .map(|((spec, aug), sol)| sensitivity::subsystem_sensitivity(spec, aug, sol))
                    .collect::<Result<Vec<_>, AladinError>>()
            })?;
            let (gradients, hessians): (Vec<_>, Vec<_>) = reduced.into_iter().unzip();

            debug!(phase = %Phase::SolvingConsensusQP, iteration, "solving coupled QP");
            let step = coupled_qp::solve_consensus_qp(&gradients, &hessians, &check.system, iteration)?;

            debug!(phase = %Phase::UpdatingVariables, iteration, "applying correction");
            let offsets = tau_offsets(&self.specs);
            for (i, spec) in self.specs.iter().enumerate() {
                let w = spec.tau_len();
                tau[i] = (0..w)
                    .map(|k| solutions[i].tau[k] + step.delta_tau[offsets[i] + k])
                    .collect();
                u[i] = solutions[i].u.clone();
            }
            if m > 1 {
                let rows = step.prices.len();
                lambda = step.prices.rows(rows - (m - 1), m - 1).iter().cloned().collect();
            }
            residual = check.residual;
        }

        warn!(
            max_iter = params.max_iter,
            residual, "stopping without convergence"
        );
        Ok(AladinOutcome {
            converged: false,
            phase: Phase::MaxIterationsReached,
            iterations: params.max_iter,
            residual,
            tau,
            u,
            lambda,
        })
    }
}
