//! Unit conversions applied when loading input data.
//!
//! Vehicle tables specify speeds in km/h; the dynamics and all solver
//! internals work in m/s. Conversion happens exactly once, at load time.

/// Convert a speed in km/h to m/s.
pub fn kmph_to_mps(kmph: f64) -> f64 {
    kmph / 3.6
}
