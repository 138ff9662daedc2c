//! # aim-core: Shared Types for Autonomous Intersection Management
//!
//! Domain types shared by the ALADIN intersection solver crates:
//!
//! - [`config`]: the immutable problem configuration (vehicles, ALADIN
//!   parameters, sampling grid, worker sizing) and its validation
//! - [`role`]: subsystem roles in the vehicle ordering (head/body/tail)
//! - [`units`]: unit conversions applied at input-load time
//!
//! No algorithmic code lives here; see `aim-algo` for the solver.

pub mod config;
pub mod role;
pub mod units;

pub use config::{
    AladinParams, ConfigError, Orientation, ProblemConfig, Sampling, VehicleParams,
};
pub use role::SubsystemRole;
pub use units::kmph_to_mps;
