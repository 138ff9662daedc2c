//! Error types for the ALADIN solver.

use aim_core::ConfigError;
use thiserror::Error;

use crate::nlp::NlpError;
use crate::qp::QpError;

/// Errors that abort an ALADIN run.
///
/// Per-subsystem solver failures are not handled locally: they carry the
/// iteration number and subsystem index so the failure can be reproduced,
/// and they abort the whole iteration (partial consensus state would be
/// inconsistent). Reaching the iteration cap is *not* an error; it is
/// reported through [`crate::AladinOutcome`].
#[derive(Debug, Error)]
pub enum AladinError {
    /// The local NLP solver failed to reach a feasible stationary point.
    #[error("local NLP diverged at iteration {iteration}, subsystem {subsystem}: {source}")]
    SolverDivergence {
        iteration: usize,
        subsystem: usize,
        #[source]
        source: NlpError,
    },

    /// The coupled consensus QP was infeasible, unbounded, or numerically
    /// failed.
    #[error("consensus QP failed at iteration {iteration}: {source}")]
    QpFailure {
        iteration: usize,
        #[source]
        source: QpError,
    },

    /// Step 3 requires at least one active constraint per subsystem; an
    /// empty active set means the local problem was constructed wrongly.
    #[error("subsystem {subsystem} reported no active constraints; cannot reduce its value function")]
    SingularSensitivity { subsystem: usize },

    /// Malformed configuration, fatal before any iteration begins.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The dedicated worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}
