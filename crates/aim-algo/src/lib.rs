//! # aim-algo: ALADIN Solver for Intersection Crossing Coordination
//!
//! This crate implements the Augmented Lagrangian Alternating Direction
//! Inexact Newton (ALADIN) method for coordinating the timing of multiple
//! vehicles across a shared intersection.
//!
//! ## Algorithm Overview
//!
//! Each vehicle `i` owns a local optimal-control problem over its timing
//! vector τ_i (entry, exit, and for non-last vehicles a consensus copy of the
//! exit time) and a discretized control sequence u_i. Vehicles interact only
//! through linear consensus constraints tying consecutive crossings together:
//!
//! ```text
//!   min  Σ_i f_i(τ_i, u_i)
//!   s.t. g_i(τ_i, u_i) ∈ [lbg_i, ubg_i]    (local dynamics/boundary)
//!        Σ_i A_i τ_i = b                   (crossing-order consensus)
//! ```
//!
//! ALADIN iterates four steps:
//! 1. **Local NLP** ([`aladin::local_step`]): each subsystem minimizes its
//!    augmented objective (cost + proximal penalty + dual-priced coupling
//!    terms) and reports its active constraint set.
//! 2. **Consensus check** ([`aladin::consensus`]): assemble the coupling
//!    system from the active sets and test the termination residual.
//! 3. **Sensitivities** ([`aladin::sensitivity`]): reduce each local value
//!    function to τ-space via implicit-function-theorem elimination of u.
//! 4. **Coupled QP** ([`aladin::coupled_qp`]): solve the block-diagonal
//!    equality-constrained QP for a coordinated step and fresh dual prices.
//!
//! The outer loop lives in [`aladin::driver`].
//!
//! ## Capabilities
//!
//! The numeric services the algorithm consumes are small, self-contained
//! modules with precise contracts:
//!
//! - [`nlp`]: augmented-Lagrangian NLP solver (L-BFGS inner iterations)
//! - [`qp`]: equality-constrained QP via the Clarabel interior-point solver
//! - [`derive`]: finite-difference gradients, Jacobians, and Hessians
//! - [`linalg`]: dense helpers (SVD pseudo-inverse, block-diagonal assembly)
//!
//! ## References
//!
//! - Houska, Frasch, Diehl, "An Augmented Lagrangian Based Algorithm for
//!   Distributed NonConvex Optimization", SIAM J. Optimization 26(2), 2016
//! - Boyd et al., "Distributed Optimization and Statistical Learning via
//!   ADMM" (the closely related consensus structure)

pub mod aladin;
pub mod derive;
pub mod error;
pub mod linalg;
pub mod nlp;
pub mod qp;
pub mod subsystem;

pub use aladin::consensus::CouplingSystem;
pub use aladin::driver::{AladinOutcome, Driver, IterateInit, Phase};
pub use aladin::local_step::LocalSolution;
pub use error::AladinError;
pub use subsystem::{ActiveConstraint, AugmentedObjective, SubsystemSpec};
