//! MAP regularization-strength sweeps.
//!
//! Every beta gets its own solver and its own copy of the initial spectrum;
//! only the response model is shared. Betas run in parallel.

use crate::map::MapSolver;
use crate::schedule::IterationSchedule;
use crate::trajectory::{poi_trajectory, PoiTarget};
use nnspec_core::{check_dimension, Measurements, NormalizedResponse, PriorKind, ResponseMatrix};
use nnspec_core::{Result, Spectrum};
use rayon::prelude::*;

/// POI matrix of a sweep: one row per beta, one column per checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepResult {
    /// Beta of each row.
    pub betas: Vec<f64>,
    /// Scheduled iteration count of each column.
    pub checkpoints: Vec<usize>,
    /// `values[i][j]` is the POI for `betas[i]` at `checkpoints[j]`.
    pub values: Vec<Vec<f64>>,
}

/// Sweep configuration over a shared response model.
#[derive(Clone, Debug)]
pub struct MapSweep<'a> {
    response: &'a ResponseMatrix,
    normalized: &'a NormalizedResponse,
    schedule: &'a IterationSchedule,
    prior: PriorKind,
    tolerance: f64,
}

impl<'a> MapSweep<'a> {
    /// Sweep with the default prior and a tolerance of 0.01.
    #[must_use]
    pub fn new(
        response: &'a ResponseMatrix,
        normalized: &'a NormalizedResponse,
        schedule: &'a IterationSchedule,
    ) -> Self {
        Self {
            response,
            normalized,
            schedule,
            prior: PriorKind::default(),
            tolerance: 0.01,
        }
    }

    /// Set the prior.
    #[must_use]
    pub fn with_prior(mut self, prior: PriorKind) -> Self {
        self.prior = prior;
        self
    }

    /// Set the convergence tolerance applied within each segment.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Runs the sweep.
    ///
    /// # Errors
    /// - [`nnspec_core::Error::Dimension`] for mismatched inputs.
    /// - [`nnspec_core::Error::Configuration`] for an invalid beta, a target
    ///   missing an input, or a beta large enough to drive the energy
    ///   correction non-positive.
    /// - Any solver error from any beta.
    pub fn run(
        &self,
        betas: &[f64],
        initial: &Spectrum,
        measurements: &Measurements,
        target: &PoiTarget<'_>,
    ) -> Result<SweepResult> {
        check_dimension("initial spectrum", self.response.num_bins(), initial.len())?;
        check_dimension(
            "measurements",
            self.response.num_measurements(),
            measurements.len(),
        )?;
        crate::poi::check_requirements(
            target.kind,
            true,
            target.icrp_factors.is_some(),
            target.reference.is_some(),
        )?;

        let values = betas
            .par_iter()
            .map(|&beta| {
                let solver = MapSolver::new(self.response, self.normalized, beta, self.prior)?;
                let trajectory = poi_trajectory(
                    &solver,
                    initial,
                    measurements,
                    self.schedule,
                    self.tolerance,
                    target,
                )?;
                Ok(trajectory.into_iter().map(|c| c.value).collect())
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        log::info!(
            "MAP sweep ({} prior): {} beta(s) x {} checkpoint(s) of {}",
            self.prior,
            betas.len(),
            self.schedule.len(),
            target.kind
        );
        Ok(SweepResult {
            betas: betas.to_vec(),
            checkpoints: self.schedule.checkpoints().to_vec(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlem::MlemSolver;
    use crate::trajectory::poi_trajectory;
    use approx::assert_relative_eq;
    use nnspec_core::{Error, PoiKind};

    fn model() -> (ResponseMatrix, NormalizedResponse, Measurements, Spectrum) {
        let r = ResponseMatrix::from_rows(vec![
            vec![1.0, 0.6, 0.2],
            vec![0.3, 1.0, 0.5],
            vec![0.1, 0.4, 1.0],
        ])
        .unwrap();
        let n = r.normalize();
        let m = Measurements::new(vec![4.0, 5.0, 3.0]).unwrap();
        let s = Spectrum::initial(vec![1.0, 1.0, 1.0]).unwrap();
        (r, n, m, s)
    }

    #[test]
    fn test_sweep_shape() {
        let (r, n, m, s) = model();
        let schedule = IterationSchedule::linear(2, 6, 2).unwrap();
        let sweep = MapSweep::new(&r, &n, &schedule).with_tolerance(1e-6);
        let target = PoiTarget::new(PoiKind::TotalEnergyCorrection);
        let result = sweep.run(&[0.0, 1e-3, 1e-2], &s, &m, &target).unwrap();
        assert_eq!(result.checkpoints, vec![2, 4, 6]);
        assert_eq!(result.values.len(), 3);
        assert!(result.values.iter().all(|row| row.len() == 3));
        // beta = 0: every energy correction is one.
        assert!(result.values[0].iter().all(|&v| (v - 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_zero_beta_row_matches_mlem() {
        let (r, n, m, s) = model();
        let schedule = IterationSchedule::linear(1, 5, 2).unwrap();
        let target = PoiTarget::new(PoiKind::TotalFluence);
        let result = MapSweep::new(&r, &n, &schedule)
            .with_tolerance(1e-6)
            .run(&[0.0], &s, &m, &target)
            .unwrap();
        let mlem = MlemSolver::new(&r, &n).unwrap();
        let expected = poi_trajectory(&mlem, &s, &m, &schedule, 1e-6, &target).unwrap();
        for (v, e) in result.values[0].iter().zip(&expected) {
            assert_relative_eq!(*v, e.value);
        }
    }

    #[test]
    fn test_missing_reference_rejected() {
        let (r, n, m, s) = model();
        let schedule = IterationSchedule::linear(1, 2, 1).unwrap();
        let target = PoiTarget::new(PoiKind::Rms);
        assert!(matches!(
            MapSweep::new(&r, &n, &schedule).run(&[0.1], &s, &m, &target),
            Err(Error::Configuration(_))
        ));
    }
}
