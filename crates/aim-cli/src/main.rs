//! `aim` — coordinate vehicle crossings through a shared intersection.
//!
//! Loads the run configuration (JSON) and the vehicle table (CSV), runs the
//! ALADIN driver, reports the outcome, and optionally writes the final
//! iterate as JSON.
//!
//! Exit status: 0 on convergence, 2 when the iteration budget ran out, 1 on
//! any error.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use aim_algo::{AladinOutcome, Driver, IterateInit};

mod io;

#[derive(Parser)]
#[command(
    name = "aim",
    about = "ALADIN coordinator for intersection crossing timing",
    version
)]
struct Cli {
    /// Run configuration (JSON: aladin parameters, sampling grid, cpu_div)
    config: PathBuf,

    /// Vehicle table (CSV with P0,V0,Vref,Umin,Umax,Din,Dout; velocities in km/h)
    cars: PathBuf,

    /// Timing warm start (CSV with Tin,Tout,Tc); constant-speed guess when omitted
    #[arg(long)]
    t_guess: Option<PathBuf>,

    /// Write the final iterate as JSON to this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log level threshold
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

/// Serialized form of the final iterate.
#[derive(Serialize)]
struct Report {
    converged: bool,
    iterations: usize,
    residual: f64,
    tau: Vec<Vec<f64>>,
    u: Vec<Vec<f64>>,
    lambda: Vec<f64>,
}

impl From<&AladinOutcome> for Report {
    fn from(out: &AladinOutcome) -> Self {
        Self {
            converged: out.converged,
            iterations: out.iterations,
            residual: out.residual,
            tau: out.tau.clone(),
            u: out.u.clone(),
            lambda: out.lambda.clone(),
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<AladinOutcome> {
    let (config, cpu_div) = io::load_problem(&cli.config, &cli.cars)?;
    info!(
        vehicles = config.subsystem_count(),
        workers = config.workers,
        cpu_div,
        "problem loaded"
    );

    let driver = Driver::new(config)?;
    let init = match &cli.t_guess {
        Some(path) => io::load_warm_start(path, driver.config())?,
        None => IterateInit::kinematic(driver.config()),
    };

    let outcome = driver.run(init)?;

    if let Some(path) = &cli.output {
        let report = Report::from(&outcome);
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)?;
        info!(path = %path.display(), "final iterate written");
    }
    Ok(outcome)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install log subscriber");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(outcome) if outcome.converged => {
            info!(
                iterations = outcome.iterations,
                residual = outcome.residual,
                "crossing schedule agreed"
            );
            for (i, tau) in outcome.tau.iter().enumerate() {
                info!(vehicle = i, t_in = tau[0], t_out = tau[1], "crossing window");
            }
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            warn!(
                iterations = outcome.iterations,
                residual = outcome.residual,
                "iteration budget exhausted before consensus"
            );
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
