//! Reconstruction state and run results.

use crate::convergence::Termination;
use nnspec_core::{Measurements, ResponseMatrix, Spectrum};

/// Mutable state of one reconstruction.
///
/// Holds the spectrum being reconstructed and the per-iteration work vectors.
/// Calling a solver repeatedly on the same state resumes the reconstruction.
/// Every concurrent run owns its own state.
#[derive(Clone, Debug)]
pub struct ReconstructionState {
    pub(crate) spectrum: Spectrum,
    pub(crate) estimate: Vec<f64>,
    pub(crate) ratio: Vec<f64>,
    pub(crate) correction: Vec<f64>,
    pub(crate) energy_correction: Vec<f64>,
    pub(crate) iterations: usize,
}

impl ReconstructionState {
    /// Starts a reconstruction from an initial guess.
    #[must_use]
    pub fn new(initial: Spectrum, num_measurements: usize) -> Self {
        let num_bins = initial.len();
        Self {
            spectrum: initial,
            estimate: vec![0.0; num_measurements],
            ratio: vec![0.0; num_measurements],
            correction: vec![0.0; num_bins],
            energy_correction: vec![1.0; num_bins],
            iterations: 0,
        }
    }

    /// Starts a reconstruction sized for `response`.
    #[must_use]
    pub fn for_response(initial: Spectrum, response: &ResponseMatrix) -> Self {
        Self::new(initial, response.num_measurements())
    }

    /// Current spectrum estimate.
    #[must_use]
    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    /// Measured / estimated ratio from the last executed step.
    #[must_use]
    pub fn ratio(&self) -> &[f64] {
        &self.ratio
    }

    /// Forward projection computed in the last executed step.
    #[must_use]
    pub fn estimate(&self) -> &[f64] {
        &self.estimate
    }

    /// Backprojected correction from the last executed step.
    #[must_use]
    pub fn correction(&self) -> &[f64] {
        &self.correction
    }

    /// MAP energy correction from the last executed step (all ones for MLEM).
    #[must_use]
    pub fn energy_correction(&self) -> &[f64] {
        &self.energy_correction
    }

    /// Update steps executed over the lifetime of this state.
    #[must_use]
    pub fn total_iterations(&self) -> usize {
        self.iterations
    }

    /// Reconstructed measurements: `measured / ratio`.
    ///
    /// Channels whose ratio is zero (zero measured counts) report the stored
    /// forward projection instead.
    #[must_use]
    pub fn reconstructed_measurements(&self, measurements: &Measurements) -> Vec<f64> {
        measurements
            .iter()
            .zip(&self.ratio)
            .zip(&self.estimate)
            .map(|((m, r), e)| if *r > 0.0 { m / r } else { *e })
            .collect()
    }

    /// Converts the state into a finished run.
    #[must_use]
    pub fn finish(self, summary: RunSummary) -> IterationRun {
        IterationRun {
            iterations: summary.iterations,
            termination: summary.termination,
            spectrum: self.spectrum,
            ratio: self.ratio,
            correction: self.correction,
            energy_correction: self.energy_correction,
        }
    }
}

/// Outcome of one solver invocation on a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Update steps executed by this invocation.
    pub iterations: usize,
    /// How the invocation ended.
    pub termination: Termination,
}

impl RunSummary {
    /// True if the tolerance was reached before the budget ran out.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Final result of a reconstruction.
#[derive(Clone, Debug)]
pub struct IterationRun {
    /// Update steps executed.
    pub iterations: usize,
    /// How the run ended.
    pub termination: Termination,
    /// Final spectrum.
    pub spectrum: Spectrum,
    /// Final ratio vector.
    pub ratio: Vec<f64>,
    /// Correction vector of the last step.
    pub correction: Vec<f64>,
    /// Energy correction of the last step (all ones for MLEM).
    pub energy_correction: Vec<f64>,
}
