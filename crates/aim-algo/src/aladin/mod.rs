//! The four ALADIN steps plus the outer driver loop.
//!
//! Module layout mirrors the algorithm: [`local_step`] (Step 1),
//! [`consensus`] (Step 2), [`sensitivity`] (Step 3), [`coupled_qp`]
//! (Step 4), with [`driver`] orchestrating one phase after another.

pub mod consensus;
pub mod coupled_qp;
pub mod driver;
pub mod local_step;
pub mod sensitivity;

use crate::subsystem::SubsystemSpec;

/// Column offset of each subsystem's timing block in the stacked τ vector.
pub(crate) fn tau_offsets(specs: &[SubsystemSpec]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(specs.len());
    let mut acc = 0;
    for spec in specs {
        offsets.push(acc);
        acc += spec.tau_len();
    }
    offsets
}

/// Total length of the stacked τ vector.
pub(crate) fn tau_total(specs: &[SubsystemSpec]) -> usize {
    specs.iter().map(|s| s.tau_len()).sum()
}
