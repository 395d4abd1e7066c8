//! Solver trait and the shared expectation-maximization step.
//!
//! One step of the multiplicative update:
//! 1. `estimate = R · spectrum`
//! 2. `ratio = measurements / estimate`
//! 3. `correction = Rᵀ · ratio`
//! 4. `spectrum *= correction / (normalized * energy_correction)`
//!
//! `energy_correction` is identically one for MLEM and prior-derived for MAP.

use crate::convergence::{validate_tolerance, within_tolerance, ConvergencePolicy, Termination};
use crate::state::{IterationRun, ReconstructionState, RunSummary};
use nnspec_core::{check_dimension, Error, Measurements, NormalizedResponse, ResponseMatrix};
use nnspec_core::{Result, Spectrum};

/// Trait for iterative spectrum reconstructions.
pub trait Reconstructor: Send + Sync {
    /// Algorithm name.
    fn name(&self) -> &'static str;

    /// Response model the solver projects through.
    fn response(&self) -> &ResponseMatrix;

    /// Whether the solver applies a prior (and so fills the energy correction).
    fn regularized(&self) -> bool {
        false
    }

    /// Runs up to `steps` update steps on `state`, stopping early once every
    /// ratio is within `tolerance`.
    ///
    /// # Errors
    /// - [`Error::Dimension`] if the state or measurements do not match the
    ///   response, detected before any step runs.
    /// - [`Error::Divergence`] if a forward projection reaches zero.
    /// - [`Error::Configuration`] for invalid tolerances or a non-positive
    ///   energy correction.
    fn advance(
        &self,
        state: &mut ReconstructionState,
        measurements: &Measurements,
        steps: usize,
        tolerance: f64,
    ) -> Result<RunSummary>;

    /// Runs under a convergence policy (at most `max_iterations - 1` steps).
    ///
    /// # Errors
    /// See [`Reconstructor::advance`].
    fn run(
        &self,
        state: &mut ReconstructionState,
        measurements: &Measurements,
        policy: &ConvergencePolicy,
    ) -> Result<RunSummary> {
        self.advance(
            state,
            measurements,
            policy.step_budget(),
            policy.error_tolerance(),
        )
    }

    /// Reconstructs from a fresh copy of `initial`.
    ///
    /// # Errors
    /// See [`Reconstructor::advance`].
    fn reconstruct(
        &self,
        initial: &Spectrum,
        measurements: &Measurements,
        policy: &ConvergencePolicy,
    ) -> Result<IterationRun> {
        let mut state = ReconstructionState::for_response(initial.clone(), self.response());
        let summary = self.run(&mut state, measurements, policy)?;
        Ok(state.finish(summary))
    }
}

/// Produces the MAP energy correction for the current spectrum.
pub(crate) trait EnergyCorrection {
    fn fill(&self, spectrum: &[f64], normalized: &[f64], out: &mut [f64]);
}

/// Checks that the response, its normalization, the state and the
/// measurements agree in shape.
pub(crate) fn check_inputs(
    response: &ResponseMatrix,
    normalized: &NormalizedResponse,
    state: &ReconstructionState,
    measurements: &Measurements,
) -> Result<()> {
    check_dimension("normalized response", response.num_bins(), normalized.len())?;
    check_dimension("spectrum", response.num_bins(), state.spectrum.len())?;
    check_dimension("measurements", response.num_measurements(), measurements.len())?;
    check_dimension("ratio vector", response.num_measurements(), state.ratio.len())?;
    check_dimension("estimate vector", response.num_measurements(), state.estimate.len())?;
    check_dimension("correction vector", response.num_bins(), state.correction.len())?;
    check_dimension(
        "energy correction vector",
        response.num_bins(),
        state.energy_correction.len(),
    )
}

/// Work vectors of the step in progress. They are swapped into the state
/// only once the spectrum update has gone through, so a failed step leaves
/// the state exactly as the last completed step left it.
struct StepBuffers {
    estimate: Vec<f64>,
    ratio: Vec<f64>,
    correction: Vec<f64>,
    energy_correction: Vec<f64>,
}

impl StepBuffers {
    fn for_state(state: &ReconstructionState) -> Self {
        Self {
            estimate: vec![0.0; state.estimate.len()],
            ratio: vec![0.0; state.ratio.len()],
            correction: vec![0.0; state.correction.len()],
            energy_correction: vec![1.0; state.energy_correction.len()],
        }
    }

    fn commit(&mut self, state: &mut ReconstructionState) {
        std::mem::swap(&mut self.estimate, &mut state.estimate);
        std::mem::swap(&mut self.ratio, &mut state.ratio);
        std::mem::swap(&mut self.correction, &mut state.correction);
        std::mem::swap(&mut self.energy_correction, &mut state.energy_correction);
    }
}

/// Runs up to `steps` EM steps. Shared by the MLEM and MAP solvers.
///
/// On error the state keeps the spectrum, work vectors and iteration count
/// of the last completed step.
pub(crate) fn iterate(
    response: &ResponseMatrix,
    normalized: &NormalizedResponse,
    state: &mut ReconstructionState,
    measurements: &Measurements,
    steps: usize,
    tolerance: f64,
    penalty: Option<&dyn EnergyCorrection>,
) -> Result<RunSummary> {
    validate_tolerance(tolerance)?;
    check_inputs(response, normalized, state, measurements)?;

    let normalized = normalized.as_slice();
    let mut next = StepBuffers::for_state(state);

    for step in 1..=steps {
        let iteration = state.iterations + 1;

        response.forward_project(&state.spectrum, &mut next.estimate);
        for (m, ((r, &e), &measured)) in next
            .ratio
            .iter_mut()
            .zip(next.estimate.iter())
            .zip(measurements.iter())
            .enumerate()
        {
            if !(e > 0.0 && e.is_finite()) {
                return Err(Error::Divergence {
                    iteration,
                    detail: format!("estimate for measurement {m} is {e}"),
                });
            }
            *r = measured / e;
        }

        response.back_project(&next.ratio, &mut next.correction);

        match penalty {
            Some(penalty) => {
                penalty.fill(&state.spectrum, normalized, &mut next.energy_correction);
                if let Some((b, v)) = next
                    .energy_correction
                    .iter()
                    .enumerate()
                    .find(|(_, v)| !(**v > 0.0 && v.is_finite()))
                {
                    return Err(Error::configuration(format!(
                        "energy correction for bin {b} is {v} at iteration {iteration}; \
                         reduce beta or choose a milder prior"
                    )));
                }
            }
            None => next.energy_correction.fill(1.0),
        }

        for (((s, c), n), ec) in state
            .spectrum
            .values_mut()
            .iter_mut()
            .zip(next.correction.iter())
            .zip(normalized)
            .zip(next.energy_correction.iter())
        {
            *s *= c / (n * ec);
        }
        next.commit(state);
        state.iterations = iteration;

        log::trace!("iteration {iteration}: ratio = {:?}", state.ratio);

        if within_tolerance(&state.ratio, tolerance) {
            return Ok(RunSummary {
                iterations: step,
                termination: Termination::Converged,
            });
        }
    }

    Ok(RunSummary {
        iterations: steps,
        termination: Termination::Exhausted,
    })
}
