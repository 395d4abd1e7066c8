//! Sampling a reconstruction at scheduled iteration counts.
//!
//! A single state is advanced from checkpoint to checkpoint, executing only
//! the steps between consecutive checkpoints. The value recorded at a
//! checkpoint is therefore identical to what a fresh reconstruction with
//! that many steps would produce, without repeating earlier work.

use crate::derivative::finite_differences;
use crate::poi::{check_requirements, evaluate, PoiInputs};
use crate::schedule::IterationSchedule;
use crate::solver::Reconstructor;
use crate::state::ReconstructionState;
use nnspec_core::{Measurements, PoiKind, Result, Spectrum, TrendType};

/// Value observed at one checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint<T> {
    /// Iteration count requested by the schedule.
    pub scheduled: usize,
    /// Update steps actually executed so far. Smaller than `scheduled` when
    /// a segment converged early.
    pub executed: usize,
    /// Observed value.
    pub value: T,
}

/// Advances one reconstruction through `schedule`, calling `observe` at
/// every checkpoint.
///
/// # Errors
/// The first solver or observer error.
pub fn walk<R, T, F>(
    solver: &R,
    initial: &Spectrum,
    measurements: &Measurements,
    schedule: &IterationSchedule,
    tolerance: f64,
    mut observe: F,
) -> Result<Vec<Checkpoint<T>>>
where
    R: Reconstructor + ?Sized,
    F: FnMut(&ReconstructionState) -> Result<T>,
{
    let mut state = ReconstructionState::for_response(initial.clone(), solver.response());
    let mut checkpoints = Vec::with_capacity(schedule.len());
    for (&scheduled, steps) in schedule.checkpoints().iter().zip(schedule.increments()) {
        solver.advance(&mut state, measurements, steps, tolerance)?;
        checkpoints.push(Checkpoint {
            scheduled,
            executed: state.total_iterations(),
            value: observe(&state)?,
        });
    }
    log::debug!(
        "{}: sampled {} checkpoint(s), {} step(s) in total",
        solver.name(),
        checkpoints.len(),
        state.total_iterations()
    );
    Ok(checkpoints)
}

/// The POI to sample and the optional inputs it may need.
#[derive(Clone, Copy, Debug)]
pub struct PoiTarget<'a> {
    /// Parameter of interest.
    pub kind: PoiKind,
    /// ICRP conversion factors (required by `total_dose`).
    pub icrp_factors: Option<&'a [f64]>,
    /// Reference spectrum (required by the reference metrics).
    pub reference: Option<&'a [f64]>,
}

impl<'a> PoiTarget<'a> {
    /// Target with no optional inputs.
    #[must_use]
    pub fn new(kind: PoiKind) -> Self {
        Self {
            kind,
            icrp_factors: None,
            reference: None,
        }
    }

    /// Attach ICRP conversion factors.
    #[must_use]
    pub fn with_icrp_factors(mut self, icrp_factors: &'a [f64]) -> Self {
        self.icrp_factors = Some(icrp_factors);
        self
    }

    /// Attach a reference spectrum.
    #[must_use]
    pub fn with_reference(mut self, reference: &'a [f64]) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Checks the target against a solver before any iteration is spent.
    ///
    /// # Errors
    /// See [`check_requirements`].
    pub fn check<R: Reconstructor + ?Sized>(&self, solver: &R) -> Result<()> {
        check_requirements(
            self.kind,
            solver.regularized(),
            self.icrp_factors.is_some(),
            self.reference.is_some(),
        )
    }

    /// Evaluates the target on a state produced by `solver`.
    ///
    /// # Errors
    /// See [`evaluate`].
    pub fn evaluate_state<R: Reconstructor + ?Sized>(
        &self,
        solver: &R,
        measurements: &Measurements,
        state: &ReconstructionState,
    ) -> Result<f64> {
        let mut inputs = PoiInputs::from_state(measurements, state)
            .with_icrp_factors(self.icrp_factors)
            .with_reference(self.reference);
        if solver.regularized() {
            inputs = inputs.with_energy_correction(state.energy_correction());
        }
        evaluate(self.kind, &inputs)
    }
}

/// POI value at every checkpoint.
///
/// # Errors
/// - [`nnspec_core::Error::Configuration`] if the target lacks an input it
///   needs, or needs a regularized solver, detected before iterating.
/// - Any solver error.
pub fn poi_trajectory<R: Reconstructor + ?Sized>(
    solver: &R,
    initial: &Spectrum,
    measurements: &Measurements,
    schedule: &IterationSchedule,
    tolerance: f64,
    target: &PoiTarget<'_>,
) -> Result<Vec<Checkpoint<f64>>> {
    target.check(solver)?;
    walk(solver, initial, measurements, schedule, tolerance, |state| {
        target.evaluate_state(solver, measurements, state)
    })
}

/// Derivative of a POI trajectory with respect to the scheduled iteration
/// count.
///
/// # Errors
/// See [`finite_differences`].
pub fn trajectory_derivatives(trajectory: &[Checkpoint<f64>]) -> Result<Vec<f64>> {
    let iterations: Vec<usize> = trajectory.iter().map(|c| c.scheduled).collect();
    let values: Vec<f64> = trajectory.iter().map(|c| c.value).collect();
    finite_differences(&iterations, &values)
}

/// Per-checkpoint reconstructed measurements or ratios.
///
/// # Errors
/// Any solver error.
pub fn trend<R: Reconstructor + ?Sized>(
    solver: &R,
    initial: &Spectrum,
    measurements: &Measurements,
    schedule: &IterationSchedule,
    tolerance: f64,
    kind: TrendType,
) -> Result<Vec<Checkpoint<Vec<f64>>>> {
    walk(solver, initial, measurements, schedule, tolerance, |state| {
        Ok(match kind {
            TrendType::Cps => state.reconstructed_measurements(measurements),
            TrendType::Ratio => state.ratio().to_vec(),
        })
    })
}

/// Per-checkpoint backprojected correction vector.
///
/// # Errors
/// Any solver error.
pub fn correction_factors<R: Reconstructor + ?Sized>(
    solver: &R,
    initial: &Spectrum,
    measurements: &Measurements,
    schedule: &IterationSchedule,
    tolerance: f64,
) -> Result<Vec<Checkpoint<Vec<f64>>>> {
    walk(solver, initial, measurements, schedule, tolerance, |state| {
        Ok(state.correction().to_vec())
    })
}
