//! Problem configuration: vehicles, ALADIN parameters, sampling grid.
//!
//! The configuration is assembled once at startup (from JSON/CSV inputs or
//! programmatically in tests), validated, and then passed *by reference* into
//! the driver — algorithmic components never reach into ambient global state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors detected while validating the problem configuration.
///
/// All of these are fatal at startup, before any iteration begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no vehicles configured")]
    NoVehicles,

    #[error("vehicle {index}: control bounds are empty (umin {umin} >= umax {umax})")]
    EmptyControlBounds { index: usize, umin: f64, umax: f64 },

    #[error("vehicle {index}: exit distance {dout} must exceed entry distance {din}")]
    DistancesOutOfOrder { index: usize, din: f64, dout: f64 },

    #[error("sampling counts must be positive (N1 = {n1}, N2 = {n2})")]
    EmptySampling { n1: usize, n2: usize },

    #[error("penalty rho must be positive, got {0}")]
    NonPositivePenalty(f64),

    #[error("tolerance must be positive, got {0}")]
    NonPositiveTolerance(f64),
}

/// Sign convention for the consensus dual price.
///
/// The copy-variable inequality can be written `t_out - t_c <= -eps` or
/// `t_c - t_out >= eps`; the choice flips the sign the coupling multiplier
/// carries through Step 1 and the direction of the copy-gap activity test in
/// Step 2. Both conventions are supported and must be self-consistent across
/// the model, the local solve, and the consensus check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// `t_out - t_c <= -eps`; Step 1 adds `+lambda*t_c` / `-lambda*t_in`.
    #[default]
    PrimalFavoring,
    /// `t_c - t_out >= eps`; Step 1 adds `-lambda*t_c` / `+lambda*t_in`.
    DualFavoring,
}

/// Per-vehicle physical data and limits.
///
/// Field names match the columns of the vehicle CSV table. Velocities are
/// stored in m/s; [`VehicleParams::from_kmph`] performs the conversion from
/// the km/h values used in input files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    /// Initial position (m), measured along the lane toward the intersection.
    #[serde(rename = "P0")]
    pub p0: f64,
    /// Initial velocity (m/s).
    #[serde(rename = "V0")]
    pub v0: f64,
    /// Reference (desired cruise) velocity (m/s).
    #[serde(rename = "Vref")]
    pub vref: f64,
    /// Lower control (acceleration) bound (m/s^2).
    #[serde(rename = "Umin")]
    pub umin: f64,
    /// Upper control (acceleration) bound (m/s^2).
    #[serde(rename = "Umax")]
    pub umax: f64,
    /// Distance of the intersection entry line (m).
    #[serde(rename = "Din")]
    pub din: f64,
    /// Distance of the intersection exit line (m).
    #[serde(rename = "Dout")]
    pub dout: f64,
}

impl VehicleParams {
    /// Convert the velocity fields from km/h (as read from input files) to m/s.
    pub fn from_kmph(mut self) -> Self {
        self.v0 = crate::units::kmph_to_mps(self.v0);
        self.vref = crate::units::kmph_to_mps(self.vref);
        self
    }
}

/// ALADIN outer-loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AladinParams {
    /// Maximum outer iterations before reporting non-convergence.
    pub max_iter: usize,
    /// Termination tolerance on the combined residual.
    pub tol: f64,
    /// Activity threshold for the copy-variable coupling row: the row is
    /// assembled only when the (orientation-directed) gap between copy and
    /// exit time is at or below this value. Deliberately a tunable policy,
    /// not an always-imposed equality.
    pub copied_gap: f64,
    /// Augmented-Lagrangian penalty coefficient rho (> 0).
    pub rho: f64,
    /// Dual-price sign convention.
    #[serde(default)]
    pub orientation: Orientation,
}

impl Default for AladinParams {
    fn default() -> Self {
        Self {
            max_iter: 30,
            tol: 1e-4,
            copied_gap: 1e-6,
            rho: 10.0,
            orientation: Orientation::default(),
        }
    }
}

/// Discretization sample counts for the two trajectory phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sampling {
    /// Samples before the intersection entry (step length t_in / N1).
    pub n1: usize,
    /// Samples inside the intersection (step length (t_out - t_in) / N2).
    pub n2: usize,
}

impl Sampling {
    /// Total control horizon length.
    pub fn horizon(&self) -> usize {
        self.n1 + self.n2
    }
}

/// Complete, validated problem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemConfig {
    /// Vehicles in crossing order (index 0 crosses first).
    pub vehicles: Vec<VehicleParams>,
    /// ALADIN parameters.
    pub aladin: AladinParams,
    /// Sampling grid.
    pub sampling: Sampling,
    /// Worker threads for the per-subsystem fan-out; 0 means "use the rayon
    /// default". Typically `available_parallelism / cpu_div`.
    #[serde(default)]
    pub workers: usize,
}

impl ProblemConfig {
    /// Number of subsystems.
    pub fn subsystem_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Check structural well-formedness. Called once at startup; algorithmic
    /// code may assume a validated configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vehicles.is_empty() {
            return Err(ConfigError::NoVehicles);
        }
        for (index, v) in self.vehicles.iter().enumerate() {
            if v.umin >= v.umax {
                return Err(ConfigError::EmptyControlBounds {
                    index,
                    umin: v.umin,
                    umax: v.umax,
                });
            }
            if v.dout <= v.din {
                return Err(ConfigError::DistancesOutOfOrder {
                    index,
                    din: v.din,
                    dout: v.dout,
                });
            }
        }
        if self.sampling.n1 == 0 || self.sampling.n2 == 0 {
            return Err(ConfigError::EmptySampling {
                n1: self.sampling.n1,
                n2: self.sampling.n2,
            });
        }
        if self.aladin.rho <= 0.0 {
            return Err(ConfigError::NonPositivePenalty(self.aladin.rho));
        }
        if self.aladin.tol <= 0.0 {
            return Err(ConfigError::NonPositiveTolerance(self.aladin.tol));
        }
        Ok(())
    }
}
