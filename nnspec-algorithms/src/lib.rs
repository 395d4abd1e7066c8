//! nnspec-algorithms: Iterative unfolding for Bonner-sphere style spectrometers.
//!
//! This crate provides the reconstruction engine:
//! - **MLEM** - multiplicative expectation-maximization update
//! - **MAP** - MLEM with a one-step-late smoothness prior, weighted by beta
//! - **POI** - scalar parameters of interest and their derivatives
//! - **Uncertainty** - parallel, seeded Poisson resampling
//! - **Trajectories and sweeps** - checkpointed runs over iteration count and beta
//!
#![warn(missing_docs)]

mod convergence;
mod derivative;
mod map;
mod mlem;
pub mod poi;
mod prior;
mod schedule;
mod solver;
mod state;
mod sweep;
mod trajectory;
mod uncertainty;

pub use convergence::{within_tolerance, ConvergencePolicy, Termination};
pub use derivative::finite_differences;
pub use map::MapSolver;
pub use mlem::MlemSolver;
pub use poi::{evaluate, PoiInputs};
pub use prior::{prior_for, EntropyPrior, Prior, QuadraticPrior};
pub use schedule::{beta_values, IterationSchedule};
pub use solver::Reconstructor;
pub use state::{IterationRun, ReconstructionState, RunSummary};
pub use sweep::{MapSweep, SweepResult};
pub use trajectory::{
    correction_factors, poi_trajectory, trajectory_derivatives, trend, walk, Checkpoint, PoiTarget,
};
pub use uncertainty::{
    MeasurementSampler, PoissonEnsemble, PoissonSampler, Replicate, UncertaintyEstimate,
    UncertaintyEstimator,
};

// Re-export the core model types
pub use nnspec_core::{Error, Measurements, NormalizedResponse, ResponseMatrix, Result, Spectrum};
