//! Stopping rules shared by the MLEM and MAP solvers.

use nnspec_core::{Error, Result, UnfoldingSettings};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a solver invocation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Termination {
    /// Every ratio was within tolerance.
    Converged,
    /// The step budget ran out first. Not an error.
    Exhausted,
}

impl Termination {
    /// True for [`Termination::Converged`].
    #[must_use]
    pub fn is_converged(self) -> bool {
        self == Self::Converged
    }
}

/// Iteration cap and ratio tolerance.
///
/// Iteration indices start at 1, so a cap of `max_iterations` allows at most
/// `max_iterations - 1` update steps.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvergencePolicy {
    max_iterations: usize,
    error_tolerance: f64,
}

impl ConvergencePolicy {
    /// Creates a validated policy.
    ///
    /// # Errors
    /// [`Error::Configuration`] if `max_iterations < 2` or the tolerance is
    /// outside `(0, 1)`.
    pub fn new(max_iterations: usize, error_tolerance: f64) -> Result<Self> {
        if max_iterations < 2 {
            return Err(Error::configuration(format!(
                "max_iterations must be at least 2, got {max_iterations}"
            )));
        }
        validate_tolerance(error_tolerance)?;
        Ok(Self {
            max_iterations,
            error_tolerance,
        })
    }

    /// Builds the policy from session settings.
    ///
    /// # Errors
    /// Same as [`Self::new`].
    pub fn from_settings(settings: &UnfoldingSettings) -> Result<Self> {
        Self::new(settings.max_iterations, settings.error_tolerance)
    }

    /// Hard iteration cap.
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Ratio tolerance.
    #[must_use]
    pub fn error_tolerance(&self) -> f64 {
        self.error_tolerance
    }

    /// Maximum number of update steps a single run may execute.
    #[must_use]
    pub fn step_budget(&self) -> usize {
        self.max_iterations - 1
    }

    /// True when every ratio lies in `[1 - tol, 1 + tol]`.
    #[must_use]
    pub fn is_converged(&self, ratio: &[f64]) -> bool {
        within_tolerance(ratio, self.error_tolerance)
    }
}

/// True when every ratio lies in `[1 - tolerance, 1 + tolerance]`.
///
/// A single outlying channel blocks convergence; NaN never converges.
#[must_use]
pub fn within_tolerance(ratio: &[f64], tolerance: f64) -> bool {
    let range = (1.0 - tolerance)..=(1.0 + tolerance);
    ratio.iter().all(|r| range.contains(r))
}

pub(crate) fn validate_tolerance(tolerance: f64) -> Result<()> {
    if tolerance > 0.0 && tolerance < 1.0 {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "error_tolerance must lie in (0, 1), got {tolerance}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_validation() {
        assert!(ConvergencePolicy::new(2, 0.1).is_ok());
        assert!(ConvergencePolicy::new(1, 0.1).is_err());
        assert!(ConvergencePolicy::new(0, 0.1).is_err());
        assert!(ConvergencePolicy::new(10, 0.0).is_err());
        assert!(ConvergencePolicy::new(10, 1.0).is_err());
        assert!(ConvergencePolicy::new(10, f64::NAN).is_err());
    }

    #[test]
    fn test_step_budget() {
        let policy = ConvergencePolicy::new(100, 0.01).unwrap();
        assert_eq!(policy.step_budget(), 99);
        assert_eq!(policy.max_iterations(), 100);
    }

    #[test]
    fn test_all_channels_must_agree() {
        let policy = ConvergencePolicy::new(10, 0.1).unwrap();
        assert!(policy.is_converged(&[1.0, 0.95, 1.05]));
        assert!(policy.is_converged(&[1.0]));
        assert!(!policy.is_converged(&[1.0, 1.0, 1.2]));
        assert!(!policy.is_converged(&[f64::NAN]));
    }

    #[test]
    fn test_tolerance_bounds_are_inclusive() {
        let policy = ConvergencePolicy::new(10, 0.5).unwrap();
        assert!(policy.is_converged(&[0.5, 1.5]));
        assert!(!policy.is_converged(&[0.499_999, 1.0]));
        assert!(!policy.is_converged(&[1.0, 1.500_001]));
    }

    #[test]
    fn test_from_settings() {
        let settings = UnfoldingSettings::default()
            .with_max_iterations(50)
            .with_error_tolerance(0.2);
        let policy = ConvergencePolicy::from_settings(&settings).unwrap();
        assert_eq!(policy.max_iterations(), 50);
        assert!((policy.error_tolerance() - 0.2).abs() < f64::EPSILON);
    }
}
