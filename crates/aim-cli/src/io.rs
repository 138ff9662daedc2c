//! Input loading: JSON run configuration and CSV vehicle/warm-start tables.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use aim_algo::IterateInit;
use aim_core::{AladinParams, ProblemConfig, Sampling, VehicleParams};

/// The JSON run file: solver parameters plus the worker divisor.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub aladin: AladinParams,
    pub sampling: Sampling,
    /// Worker threads are `available_parallelism / cpu_div`; 0 shares the
    /// global pool instead of building a dedicated one.
    #[serde(default = "default_cpu_div")]
    pub cpu_div: usize,
}

fn default_cpu_div() -> usize {
    1
}

/// One row of the warm-start table. `Tc` is left empty for the last
/// vehicle, which has no copy variable.
#[derive(Debug, Deserialize)]
struct GuessRow {
    #[serde(rename = "Tin")]
    t_in: f64,
    #[serde(rename = "Tout")]
    t_out: f64,
    #[serde(rename = "Tc")]
    t_c: Option<f64>,
}

/// Load and parse the JSON run configuration.
pub fn load_run_config(path: &Path) -> anyhow::Result<RunConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading run config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing run config {}", path.display()))
}

/// Load the vehicle table. Velocity columns are in km/h on disk and
/// converted to m/s here.
pub fn load_vehicles(path: &Path) -> anyhow::Result<Vec<VehicleParams>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening vehicle table {}", path.display()))?;
    let mut vehicles = Vec::new();
    for (line, record) in reader.deserialize::<VehicleParams>().enumerate() {
        let vehicle =
            record.with_context(|| format!("vehicle table {}, row {}", path.display(), line + 1))?;
        vehicles.push(vehicle.from_kmph());
    }
    Ok(vehicles)
}

/// Assemble the full problem configuration from its two input files.
pub fn load_problem(config_path: &Path, cars_path: &Path) -> anyhow::Result<(ProblemConfig, usize)> {
    let run = load_run_config(config_path)?;
    let vehicles = load_vehicles(cars_path)?;
    let workers = if run.cpu_div == 0 {
        0
    } else {
        (num_cpus::get() / run.cpu_div).max(1)
    };
    let config = ProblemConfig {
        vehicles,
        aladin: run.aladin,
        sampling: run.sampling,
        workers,
    };
    Ok((config, run.cpu_div))
}

/// Load the timing warm start from CSV, with zero controls and zero dual
/// prices. Row order must match the vehicle table.
pub fn load_warm_start(path: &Path, config: &ProblemConfig) -> anyhow::Result<IterateInit> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening warm-start table {}", path.display()))?;
    let count = config.subsystem_count();
    let mut tau = Vec::with_capacity(count);
    for (line, record) in reader.deserialize::<GuessRow>().enumerate() {
        let row =
            record.with_context(|| format!("warm-start table {}, row {}", path.display(), line + 1))?;
        let role = aim_core::SubsystemRole::for_index(count, tau.len());
        if role.has_copy_variable() {
            let t_c = row.t_c.with_context(|| {
                format!("warm-start row {}: vehicle needs a Tc value", line + 1)
            })?;
            tau.push(vec![row.t_in, row.t_out, t_c]);
        } else {
            tau.push(vec![row.t_in, row.t_out]);
        }
    }
    anyhow::ensure!(
        tau.len() == count,
        "warm-start table has {} rows for {} vehicles",
        tau.len(),
        count
    );
    Ok(IterateInit {
        tau,
        u: vec![vec![0.0; config.sampling.horizon()]; count],
        lambda: Vec::new(),
    })
}
