//! Subsystem roles in the vehicle ordering.
//!
//! The crossing order induces pairwise coupling between consecutive vehicles.
//! A vehicle's position in that order determines which coupling variables and
//! constraints its local problem carries.

use serde::{Deserialize, Serialize};

/// Role of a subsystem (vehicle) within the crossing order.
///
/// Head and body vehicles own a copy of their exit time (the consensus
/// variable their successor couples against), so their timing vector τ has
/// three components (entry, exit, copy). Tail and single vehicles have no
/// successor and carry only (entry, exit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemRole {
    /// Only vehicle in the problem; no neighbors, no coupling terms.
    Single,
    /// First vehicle; has a successor only.
    Head,
    /// Interior vehicle; has both neighbors.
    Body,
    /// Last vehicle; has a predecessor only.
    Tail,
}

impl SubsystemRole {
    /// Role of the subsystem at `index` in a problem of `count` vehicles.
    pub fn for_index(count: usize, index: usize) -> Self {
        if count <= 1 {
            SubsystemRole::Single
        } else if index == 0 {
            SubsystemRole::Head
        } else if index == count - 1 {
            SubsystemRole::Tail
        } else {
            SubsystemRole::Body
        }
    }

    /// Number of timing variables: entry, exit, and (head/body only) copy.
    pub fn tau_len(&self) -> usize {
        match self {
            SubsystemRole::Head | SubsystemRole::Body => 3,
            SubsystemRole::Tail | SubsystemRole::Single => 2,
        }
    }

    /// Whether this subsystem carries the copy-time consensus variable.
    pub fn has_copy_variable(&self) -> bool {
        matches!(self, SubsystemRole::Head | SubsystemRole::Body)
    }

    /// Whether a predecessor exists (entry-side coupling term in Step 1).
    pub fn has_predecessor(&self) -> bool {
        matches!(self, SubsystemRole::Body | SubsystemRole::Tail)
    }
}
