//! nnspec CLI: Unfold Nested Neutron Spectrometer measurements.
//!
//! Inputs are plain-text files (see `nnspec-io`); every scalar setting comes
//! from an optional `key=value` settings file and can be overridden on the
//! command line.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Args, Parser, Subcommand};
use nnspec_algorithms::poi::{dose_contributions, total_dose};
use nnspec_algorithms::{
    beta_values, correction_factors, poi_trajectory, trajectory_derivatives, trend,
    ConvergencePolicy, IterationSchedule, MapSolver, MapSweep, MlemSolver, PoiTarget,
    Reconstructor, UncertaintyEstimator,
};
use nnspec_core::{
    check_dimension, Measurements, MeasurementUnits, NormalizedResponse, PoiKind, PriorKind,
    ResponseMatrix, Spectrum, TrendType, UnfoldingSettings,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    NnspecIo(#[from] nnspec_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] nnspec_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Neutron spectrum unfolding for Nested Neutron Spectrometer measurements.
#[derive(Parser)]
#[command(name = "nnspec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Input files and setting overrides shared by every command.
#[derive(Args, Debug)]
struct Inputs {
    /// Measurement file (charge or count-rate readings)
    #[arg(short, long)]
    measurements: PathBuf,

    /// Detector response matrix (one row per measurement)
    #[arg(short, long)]
    response: PathBuf,

    /// Energy bin values (MeV), one per line
    #[arg(short, long)]
    energy_bins: PathBuf,

    /// Initial spectrum, one strictly positive value per bin
    #[arg(short, long)]
    initial: PathBuf,

    /// ICRP fluence-to-dose conversion factors (pSv cm²)
    #[arg(long)]
    icrp: Option<PathBuf>,

    /// Settings file (key=value)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Override the iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Override the ratio tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Override the measurement units (nc or cps)
    #[arg(long)]
    units: Option<MeasurementUnits>,

    /// Override the base seed for Poisson resampling
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Unfold with MLEM and estimate uncertainty by Poisson resampling
    Unfold {
        #[command(flatten)]
        inputs: Inputs,

        /// Dose table to append to
        #[arg(long, default_value = "output_dose.csv")]
        dose_output: PathBuf,

        /// Spectrum table to add columns to
        #[arg(long, default_value = "output_spectra.csv")]
        spectrum_output: PathBuf,

        /// Override the number of Poisson replicates
        #[arg(long)]
        samples: Option<usize>,

        /// Print a JSON summary to stdout
        #[arg(long)]
        json: bool,
    },

    /// Sample a parameter of interest along the iteration schedule
    Trajectory {
        #[command(flatten)]
        inputs: Inputs,

        /// Output table (rows are appended)
        #[arg(short, long)]
        output: PathBuf,

        /// Override the parameter of interest
        #[arg(long)]
        poi: Option<PoiKind>,

        /// Reference spectrum for rms, nrmsd and chi_squared_g
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Reconstruct with MAP at this beta instead of MLEM
        #[arg(long)]
        beta: Option<f64>,

        /// Override the MAP prior
        #[arg(long)]
        prior: Option<PriorKind>,

        /// Report derivatives with respect to iteration count
        #[arg(long)]
        derivatives: bool,
    },

    /// Sample a parameter of interest over a MAP beta range and the iteration schedule
    MapSweep {
        #[command(flatten)]
        inputs: Inputs,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,

        /// Override the parameter of interest
        #[arg(long)]
        poi: Option<PoiKind>,

        /// Reference spectrum for rms, nrmsd and chi_squared_g
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Override the MAP prior
        #[arg(long)]
        prior: Option<PriorKind>,
    },

    /// Reconstructed measurements (or ratios) along the iteration schedule
    Trend {
        #[command(flatten)]
        inputs: Inputs,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,

        /// Override the trend type (cps or ratio)
        #[arg(long)]
        trend_type: Option<TrendType>,
    },

    /// Backprojected correction factors along the iteration schedule
    CorrectionFactors {
        #[command(flatten)]
        inputs: Inputs,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Everything loaded for one run.
struct Session {
    settings: UnfoldingSettings,
    conditions: String,
    energy_bins: Vec<f64>,
    response: ResponseMatrix,
    normalized: NormalizedResponse,
    initial: Spectrum,
    measurements: Measurements,
    icrp: Option<Vec<f64>>,
}

impl Session {
    fn load(inputs: &Inputs) -> Result<Self> {
        let mut settings = match &inputs.settings {
            Some(path) => nnspec_io::read_settings(path)?,
            None => UnfoldingSettings::default(),
        };
        if let Some(max_iterations) = inputs.max_iterations {
            settings.max_iterations = max_iterations;
        }
        if let Some(tolerance) = inputs.tolerance {
            settings.error_tolerance = tolerance;
        }
        if let Some(units) = inputs.units {
            settings.measurement_units = units;
        }
        if let Some(seed) = inputs.seed {
            settings.seed = Some(seed);
        }

        let file = nnspec_io::read_measurement_file(&inputs.measurements, settings.measurement_units)?;
        let measurements = file.to_measurements(&settings)?;
        let energy_bins = nnspec_io::read_vector(&inputs.energy_bins)?;
        let response = nnspec_io::read_response(&inputs.response)?;
        let initial = Spectrum::initial(nnspec_io::read_vector(&inputs.initial)?)?;
        let icrp = inputs
            .icrp
            .as_deref()
            .map(nnspec_io::read_vector)
            .transpose()?;

        check_dimension("NNS response rows", measurements.len(), response.num_measurements())?;
        check_dimension("NNS response columns", energy_bins.len(), response.num_bins())?;
        check_dimension("initial spectrum", energy_bins.len(), initial.len())?;
        if let Some(icrp) = &icrp {
            check_dimension("ICRP factors", energy_bins.len(), icrp.len())?;
        }

        let normalized = response.normalize();
        Ok(Self {
            settings,
            conditions: file.conditions,
            energy_bins,
            response,
            normalized,
            initial,
            measurements,
            icrp,
        })
    }

    fn with_settings(mut self, apply: impl FnOnce(&mut UnfoldingSettings)) -> Result<Self> {
        apply(&mut self.settings);
        self.settings.validate()?;
        Ok(self)
    }

    fn icrp(&self) -> Result<&[f64]> {
        self.icrp
            .as_deref()
            .ok_or_else(|| nnspec_core::Error::configuration("--icrp is required").into())
    }

    fn schedule(&self) -> Result<IterationSchedule> {
        Ok(IterationSchedule::from_settings(&self.settings)?)
    }

    fn target<'a>(&'a self, kind: PoiKind, reference: Option<&'a [f64]>) -> PoiTarget<'a> {
        let mut target = PoiTarget::new(kind);
        if let Some(icrp) = self.icrp.as_deref() {
            target = target.with_icrp_factors(icrp);
        }
        if let Some(reference) = reference {
            target = target.with_reference(reference);
        }
        target
    }
}

fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    })
}

fn read_reference(path: Option<&Path>) -> Result<Option<Vec<f64>>> {
    Ok(path.map(nnspec_io::read_vector).transpose()?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Unfold {
            inputs,
            dose_output,
            spectrum_output,
            samples,
            json,
        } => {
            let session = Session::load(&inputs)?.with_settings(|s| {
                if let Some(samples) = samples {
                    s.num_poisson_samples = samples;
                }
            })?;
            let icrp = session.icrp()?;
            let policy = ConvergencePolicy::from_settings(&session.settings)?;
            let solver = MlemSolver::new(&session.response, &session.normalized)?;

            let start = Instant::now();
            let reference = solver.reconstruct(&session.initial, &session.measurements, &policy)?;
            if reference.termination.is_converged() {
                log::info!("MLEM converged after {} iteration(s)", reference.iterations);
            } else {
                log::warn!(
                    "MLEM reached the iteration cap ({}) without meeting tolerance {}",
                    reference.iterations,
                    policy.error_tolerance()
                );
            }

            let seed = resolve_seed(session.settings.seed);
            let estimator = UncertaintyEstimator::poisson(session.settings.num_poisson_samples, seed)?;
            let uncertainty = estimator.estimate(
                &solver,
                &policy,
                &session.initial,
                &session.measurements,
                &reference.spectrum,
                icrp,
            )?;
            let dose = total_dose(&reference.spectrum, icrp)?;
            let contributions = dose_contributions(&reference.spectrum, icrp)?;
            log::debug!("unfolding took {:.2?}", start.elapsed());

            nnspec_io::append_dose(&dose_output, &session.conditions, dose, uncertainty.dose_rms)?;
            nnspec_io::write_spectrum(
                &spectrum_output,
                &session.conditions,
                &session.energy_bins,
                &reference.spectrum,
                &uncertainty.spectrum_rms,
            )?;

            if json {
                let summary = json!({
                    "conditions": session.conditions,
                    "iterations": reference.iterations,
                    "converged": reference.termination.is_converged(),
                    "seed": seed,
                    "num_poisson_samples": uncertainty.num_samples,
                    "dose_msv_per_hr": dose,
                    "dose_rms_msv_per_hr": uncertainty.dose_rms,
                    "energy_bins_mev": session.energy_bins,
                    "spectrum": &reference.spectrum[..],
                    "spectrum_rms": uncertainty.spectrum_rms,
                    "dose_contributions": contributions,
                    "ratio": reference.ratio,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Conditions:  {}", session.conditions);
                println!("Iterations:  {} ({:?})", reference.iterations, reference.termination);
                println!("Dose rate:   {:.6e} ± {:.6e} mSv/hr", dose, uncertainty.dose_rms);
                println!("Wrote {} and {}", dose_output.display(), spectrum_output.display());
            }
        }

        Commands::Trajectory {
            inputs,
            output,
            poi,
            reference,
            beta,
            prior,
            derivatives,
        } => {
            let session = Session::load(&inputs)?.with_settings(|s| {
                if let Some(poi) = poi {
                    s.parameter_of_interest = poi;
                }
                if let Some(prior) = prior {
                    s.prior = prior;
                }
                s.derivatives |= derivatives;
            })?;
            let settings = &session.settings;
            let reference = read_reference(reference.as_deref())?;
            let target = session.target(settings.parameter_of_interest, reference.as_deref());
            let schedule = session.schedule()?;

            let solver: Box<dyn Reconstructor + '_> = match beta {
                Some(beta) => Box::new(MapSolver::new(
                    &session.response,
                    &session.normalized,
                    beta,
                    settings.prior,
                )?),
                None => Box::new(MlemSolver::new(&session.response, &session.normalized)?),
            };
            let trajectory = poi_trajectory(
                solver.as_ref(),
                &session.initial,
                &session.measurements,
                &schedule,
                settings.error_tolerance,
                &target,
            )?;

            let values = if settings.derivatives {
                trajectory_derivatives(&trajectory)?
            } else {
                trajectory.iter().map(|c| c.value).collect()
            };
            let label = if settings.parameter_of_interest == PoiKind::TotalDose {
                "Total dose"
            } else {
                session.conditions.as_str()
            };
            nnspec_io::append_poi_row(&output, label, schedule.checkpoints(), &values)?;
            println!(
                "Saved {}{} ({}) at {} checkpoint(s) to {}",
                if settings.derivatives { "derivatives of " } else { "" },
                settings.parameter_of_interest,
                solver.name(),
                values.len(),
                output.display()
            );
        }

        Commands::MapSweep {
            inputs,
            output,
            poi,
            reference,
            prior,
        } => {
            let session = Session::load(&inputs)?.with_settings(|s| {
                if let Some(poi) = poi {
                    s.parameter_of_interest = poi;
                }
                if let Some(prior) = prior {
                    s.prior = prior;
                }
            })?;
            let settings = &session.settings;
            let reference = read_reference(reference.as_deref())?;
            let target = session.target(settings.parameter_of_interest, reference.as_deref());
            let schedule = session.schedule()?;
            let betas = beta_values(settings.min_beta, settings.max_beta)?;

            let sweep = MapSweep::new(&session.response, &session.normalized, &schedule)
                .with_prior(settings.prior)
                .with_tolerance(settings.error_tolerance)
                .run(&betas, &session.initial, &session.measurements, &target)?;
            nnspec_io::write_sweep(&output, &sweep)?;
            println!(
                "Saved {} x {} matrix of {} values to {}",
                sweep.betas.len(),
                sweep.checkpoints.len(),
                settings.parameter_of_interest,
                output.display()
            );
        }

        Commands::Trend {
            inputs,
            output,
            trend_type,
        } => {
            let session = Session::load(&inputs)?.with_settings(|s| {
                if let Some(trend_type) = trend_type {
                    s.trend_type = trend_type;
                }
            })?;
            let solver = MlemSolver::new(&session.response, &session.normalized)?;
            let schedule = session.schedule()?;
            let rows = trend(
                &solver,
                &session.initial,
                &session.measurements,
                &schedule,
                session.settings.error_tolerance,
                session.settings.trend_type,
            )?;
            nnspec_io::write_trend(&output, session.settings.trend_type, &session.measurements, &rows)?;
            println!("Saved reconstructed measured data to {}", output.display());
        }

        Commands::CorrectionFactors { inputs, output } => {
            let session = Session::load(&inputs)?.with_settings(|_| {})?;
            let solver = MlemSolver::new(&session.response, &session.normalized)?;
            let schedule = session.schedule()?;
            let rows = correction_factors(
                &solver,
                &session.initial,
                &session.measurements,
                &schedule,
                session.settings.error_tolerance,
            )?;
            nnspec_io::write_correction_factors(&output, &session.energy_bins, &rows)?;
            println!("Saved correction factors to {}", output.display());
        }
    }

    Ok(())
}
