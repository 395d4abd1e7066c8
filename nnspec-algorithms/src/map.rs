//! Maximum A Posteriori reconstruction (one-step-late MAP-EM).
//!
//! The MLEM update denominator is multiplied by an energy correction
//! `1 + beta * ∂U/∂f_b / normalized_b`, evaluated at the current spectrum.
//! With `beta = 0` the correction is exactly one and MAP reduces to MLEM.

use crate::prior::{prior_for, Prior};
use crate::solver::{iterate, EnergyCorrection, Reconstructor};
use crate::state::{ReconstructionState, RunSummary};
use nnspec_core::{check_dimension, Error, Measurements, NormalizedResponse, PriorKind};
use nnspec_core::{ResponseMatrix, Result};

/// MAP solver with a pluggable prior.
pub struct MapSolver<'a> {
    response: &'a ResponseMatrix,
    normalized: &'a NormalizedResponse,
    beta: f64,
    prior: Box<dyn Prior>,
}

impl<'a> MapSolver<'a> {
    /// Creates a solver with the prior named by `kind`.
    ///
    /// # Errors
    /// - [`Error::Dimension`] if `normalized` does not match the response.
    /// - [`Error::Configuration`] if `beta` is negative or non-finite.
    pub fn new(
        response: &'a ResponseMatrix,
        normalized: &'a NormalizedResponse,
        beta: f64,
        kind: PriorKind,
    ) -> Result<Self> {
        Self::with_prior(response, normalized, beta, prior_for(kind))
    }

    /// Creates a solver with a custom prior.
    ///
    /// # Errors
    /// Same as [`Self::new`].
    pub fn with_prior(
        response: &'a ResponseMatrix,
        normalized: &'a NormalizedResponse,
        beta: f64,
        prior: Box<dyn Prior>,
    ) -> Result<Self> {
        check_dimension("normalized response", response.num_bins(), normalized.len())?;
        if !(beta.is_finite() && beta >= 0.0) {
            return Err(Error::configuration(format!(
                "beta must be finite and non-negative, got {beta}"
            )));
        }
        Ok(Self {
            response,
            normalized,
            beta,
            prior,
        })
    }

    /// Regularization strength.
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Name of the prior in use.
    #[must_use]
    pub fn prior_name(&self) -> &'static str {
        self.prior.name()
    }
}

impl std::fmt::Debug for MapSolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSolver")
            .field("beta", &self.beta)
            .field("prior", &self.prior.name())
            .finish_non_exhaustive()
    }
}

impl EnergyCorrection for MapSolver<'_> {
    fn fill(&self, spectrum: &[f64], normalized: &[f64], out: &mut [f64]) {
        for (b, (ec, n)) in out.iter_mut().zip(normalized).enumerate() {
            *ec = 1.0 + self.beta * self.prior.gradient(spectrum, b) / n;
        }
    }
}

impl Reconstructor for MapSolver<'_> {
    fn name(&self) -> &'static str {
        "MAP"
    }

    fn response(&self) -> &ResponseMatrix {
        self.response
    }

    fn regularized(&self) -> bool {
        true
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
            Some(self as &dyn EnergyCorrection),
        )?;
        log::debug!(
            "MAP (beta = {}, prior = {}): {} step(s), {:?}",
            self.beta,
            self.prior.name(),
            summary.iterations,
            summary.termination
        );
        Ok(summary)
    }
}
