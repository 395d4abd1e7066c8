//! Maximum Likelihood Expectation Maximization.
//!
//! Maximizes the Poisson likelihood of the measurements under the linear
//! forward model. Every factor of the update is non-negative, so the spectrum
//! never goes negative.

use crate::solver::{iterate, Reconstructor};
use crate::state::{ReconstructionState, RunSummary};
use nnspec_core::{check_dimension, Measurements, NormalizedResponse, ResponseMatrix, Result};

/// MLEM solver over a shared, read-only response model.
#[derive(Clone, Copy, Debug)]
pub struct MlemSolver<'a> {
    response: &'a ResponseMatrix,
    normalized: &'a NormalizedResponse,
}

impl<'a> MlemSolver<'a> {
    /// Creates a solver.
    ///
    /// # Errors
    /// [`nnspec_core::Error::Dimension`] if `normalized` does not have one
    /// entry per bin.
    pub fn new(response: &'a ResponseMatrix, normalized: &'a NormalizedResponse) -> Result<Self> {
        check_dimension("normalized response", response.num_bins(), normalized.len())?;
        Ok(Self {
            response,
            normalized,
        })
    }

    /// Per-bin sensitivity used as the update denominator.
    #[must_use]
    pub fn normalized(&self) -> &'a NormalizedResponse {
        self.normalized
    }
}

impl Reconstructor for MlemSolver<'_> {
    fn name(&self) -> &'static str {
        "MLEM"
    }

    fn response(&self) -> &ResponseMatrix {
        self.response
    }

    fn advance(
        &self,
        state: &mut ReconstructionState,
        measurements: &Measurements,
        steps: usize,
        tolerance: f64,
    ) -> Result<RunSummary> {
        let summary = iterate(
            self.response,
            self.normalized,
            state,
            measurements,
            steps,
            tolerance,
            None,
        )?;
        log::debug!(
            "MLEM: {} step(s), {:?}, {} total",
            summary.iterations,
            summary.termination,
            state.total_iterations()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::{ConvergencePolicy, Termination};
    use approx::assert_relative_eq;
    use nnspec_core::{Error, Spectrum};

    fn identity() -> (ResponseMatrix, NormalizedResponse) {
        let r = ResponseMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let n = r.normalize();
        (r, n)
    }

    #[test]
    fn test_identity_response_converges_in_two_steps() {
        let (r, n) = identity();
        let solver = MlemSolver::new(&r, &n).unwrap();
        let policy = ConvergencePolicy::new(100, 0.01).unwrap();
        let measurements = Measurements::new(vec![2.0, 3.0]).unwrap();
        let initial = Spectrum::initial(vec![1.0, 1.0]).unwrap();

        let mut state = ReconstructionState::for_response(initial, &r);
        let summary = solver.advance(&mut state, &measurements, 1, 0.01).unwrap();
        assert_eq!(summary.termination, Termination::Exhausted);
        assert_eq!(state.estimate(), &[1.0, 1.0]);
        assert_eq!(state.ratio(), &[2.0, 3.0]);
        assert_eq!(&**state.spectrum(), &[2.0, 3.0]);

        let run = solver
            .reconstruct(&Spectrum::initial(vec![1.0, 1.0]).unwrap(), &measurements, &policy)
            .unwrap();
        assert_eq!(run.iterations, 2);
        assert_eq!(run.termination, Termination::Converged);
        assert_relative_eq!(run.spectrum[0], 2.0);
        assert_relative_eq!(run.spectrum[1], 3.0);
        assert_relative_eq!(run.ratio[0], 1.0);
    }

    #[test]
    fn test_normalized_length_checked() {
        let (r, _) = identity();
        let other = ResponseMatrix::from_rows(vec![vec![1.0, 1.0, 1.0]])
            .unwrap()
            .normalize();
        assert!(matches!(
            MlemSolver::new(&r, &other),
            Err(Error::Dimension { .. })
        ));
    }

    #[test]
    fn test_zero_steps_is_a_no_op() {
        let (r, n) = identity();
        let solver = MlemSolver::new(&r, &n).unwrap();
        let mut state =
            ReconstructionState::for_response(Spectrum::initial(vec![1.0, 1.0]).unwrap(), &r);
        let m = Measurements::new(vec![2.0, 3.0]).unwrap();
        let summary = solver.advance(&mut state, &m, 0, 0.1).unwrap();
        assert_eq!(summary.iterations, 0);
        assert_eq!(&**state.spectrum(), &[1.0, 1.0]);
    }

    #[test]
    fn test_collapsed_spectrum_diverges() {
        let (r, n) = identity();
        let solver = MlemSolver::new(&r, &n).unwrap();
        // First step drives bin 0 to zero; second step cannot project it.
        let m = Measurements::new(vec![0.0, 3.0]).unwrap();
        let mut state =
            ReconstructionState::for_response(Spectrum::initial(vec![1.0, 1.0]).unwrap(), &r);
        let err = solver.advance(&mut state, &m, 10, 0.01).unwrap_err();
        assert!(matches!(err, Error::Divergence { iteration: 2, .. }));
    }
}
