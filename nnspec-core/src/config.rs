//! Unfolding settings and named selectors.
#![allow(clippy::doc_markdown, clippy::struct_excessive_bools)]

use crate::error::{Error, Result};
use crate::measurement::MeasurementUnits;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smoothness prior used by the MAP solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PriorKind {
    /// Quadratic (Gaussian) penalty on neighbouring-bin differences.
    #[default]
    Quadratic,
    /// Cross-entropy of each bin against the mean of its neighbours.
    Entropy,
}

impl PriorKind {
    /// Canonical selector name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Quadratic => "quadratic",
            Self::Entropy => "entropy",
        }
    }
}

impl FromStr for PriorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quadratic" | "gaussian" => Ok(Self::Quadratic),
            "entropy" => Ok(Self::Entropy),
            other => Err(Error::configuration(format!("unrecognized prior: {other}"))),
        }
    }
}

impl fmt::Display for PriorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar parameter of interest reported along a reconstruction trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PoiKind {
    /// Sum of the spectrum.
    TotalFluence,
    /// Ambient dose equivalent rate (mSv/hr).
    #[default]
    TotalDose,
    /// Sum of the MAP energy-correction vector.
    TotalEnergyCorrection,
    /// Worst-case |1 - ratio| over measurements.
    MaxMlemRatio,
    /// Mean |1 - ratio| over measurements.
    AvgMlemRatio,
    /// Relative squared residual of the forward model.
    JFactor,
    /// Reduced chi-squared of measured vs. estimated data.
    ReducedChiSquared,
    /// RMS deviation from a reference spectrum.
    Rms,
    /// RMS deviation normalized by the reference mean.
    Nrmsd,
    /// Chi-squared of the spectrum against a reference spectrum.
    ChiSquaredG,
}

impl PoiKind {
    /// All selectors, in documentation order.
    pub const ALL: [Self; 10] = [
        Self::TotalFluence,
        Self::TotalDose,
        Self::TotalEnergyCorrection,
        Self::MaxMlemRatio,
        Self::AvgMlemRatio,
        Self::JFactor,
        Self::ReducedChiSquared,
        Self::Rms,
        Self::Nrmsd,
        Self::ChiSquaredG,
    ];

    /// Canonical selector name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TotalFluence => "total_fluence",
            Self::TotalDose => "total_dose",
            Self::TotalEnergyCorrection => "total_energy_correction",
            Self::MaxMlemRatio => "max_mlem_ratio",
            Self::AvgMlemRatio => "avg_mlem_ratio",
            Self::JFactor => "j_factor",
            Self::ReducedChiSquared => "reduced_chi_squared",
            Self::Rms => "rms",
            Self::Nrmsd => "nrmsd",
            Self::ChiSquaredG => "chi_squared_g",
        }
    }

    /// Whether the POI needs a reference spectrum.
    #[must_use]
    pub fn needs_reference(self) -> bool {
        matches!(self, Self::Rms | Self::Nrmsd | Self::ChiSquaredG)
    }

    /// Whether the POI is only defined for MAP reconstructions.
    #[must_use]
    pub fn map_only(self) -> bool {
        matches!(self, Self::TotalEnergyCorrection)
    }
}

impl FromStr for PoiKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| Error::configuration(format!("unrecognized parameter of interest: {name}")))
    }
}

impl fmt::Display for PoiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the trend output reports per checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrendType {
    /// Reconstructed measurements (measured / ratio).
    Cps,
    /// The ratio vector itself.
    #[default]
    Ratio,
}

impl FromStr for TrendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cps" => Ok(Self::Cps),
            "ratio" => Ok(Self::Ratio),
            other => Err(Error::configuration(format!("unrecognized trend type: {other}"))),
        }
    }
}

/// All scalar settings of an unfolding session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UnfoldingSettings {
    /// Iteration cap; at most `max_iterations - 1` update steps are run.
    pub max_iterations: usize,
    /// Ratio tolerance for early termination, in (0, 1).
    pub error_tolerance: f64,
    /// Number of Poisson replicates for uncertainty estimation.
    pub num_poisson_samples: usize,
    /// Base seed for replicate generators (`None` seeds from the clock).
    pub seed: Option<u64>,
    /// Vendor normalization factor.
    pub norm: f64,
    /// Charge calibration (fA/cps).
    pub f_factor: f64,
    /// Units of the raw readings.
    pub measurement_units: MeasurementUnits,
    /// First checkpoint of a trajectory.
    pub min_iterations: usize,
    /// Last checkpoint of a trajectory.
    pub max_schedule_iterations: usize,
    /// Spacing between checkpoints.
    pub iteration_increment: usize,
    /// Lower end of a MAP beta sweep.
    pub min_beta: f64,
    /// Upper end of a MAP beta sweep.
    pub max_beta: f64,
    /// MAP prior.
    pub prior: PriorKind,
    /// POI evaluated along trajectories.
    pub parameter_of_interest: PoiKind,
    /// Report finite-difference derivatives instead of raw POI values.
    pub derivatives: bool,
    /// Trend output type.
    pub trend_type: TrendType,
}

impl Default for UnfoldingSettings {
    fn default() -> Self {
        Self {
            max_iterations: 15_000,
            error_tolerance: 0.01,
            num_poisson_samples: 1000,
            seed: None,
            norm: 1.0,
            f_factor: 8.0,
            measurement_units: MeasurementUnits::Nc,
            min_iterations: 100,
            max_schedule_iterations: 5000,
            iteration_increment: 100,
            min_beta: 1e-3,
            max_beta: 1e1,
            prior: PriorKind::Quadratic,
            parameter_of_interest: PoiKind::TotalDose,
            derivatives: false,
            trend_type: TrendType::Ratio,
        }
    }
}

impl UnfoldingSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the ratio tolerance.
    #[must_use]
    pub fn with_error_tolerance(mut self, tolerance: f64) -> Self {
        self.error_tolerance = tolerance;
        self
    }

    /// Set the number of Poisson replicates.
    #[must_use]
    pub fn with_num_poisson_samples(mut self, samples: usize) -> Self {
        self.num_poisson_samples = samples;
        self
    }

    /// Set the base seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the checkpoint schedule.
    #[must_use]
    pub fn with_schedule(mut self, min: usize, max: usize, increment: usize) -> Self {
        self.min_iterations = min;
        self.max_schedule_iterations = max;
        self.iteration_increment = increment;
        self
    }

    /// Set the beta sweep range.
    #[must_use]
    pub fn with_beta_range(mut self, min_beta: f64, max_beta: f64) -> Self {
        self.min_beta = min_beta;
        self.max_beta = max_beta;
        self
    }

    /// Set the MAP prior.
    #[must_use]
    pub fn with_prior(mut self, prior: PriorKind) -> Self {
        self.prior = prior;
        self
    }

    /// Set the parameter of interest.
    #[must_use]
    pub fn with_parameter_of_interest(mut self, poi: PoiKind) -> Self {
        self.parameter_of_interest = poi;
        self
    }

    /// Checks every setting.
    ///
    /// # Errors
    /// [`Error::Configuration`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations < 2 {
            return Err(Error::configuration(format!(
                "max_iterations must be at least 2, got {}",
                self.max_iterations
            )));
        }
        if !(self.error_tolerance > 0.0 && self.error_tolerance < 1.0) {
            return Err(Error::configuration(format!(
                "error_tolerance must lie in (0, 1), got {}",
                self.error_tolerance
            )));
        }
        if self.num_poisson_samples == 0 {
            return Err(Error::configuration("num_poisson_samples must be positive"));
        }
        if !(self.norm.is_finite() && self.norm > 0.0) {
            return Err(Error::configuration("norm must be positive"));
        }
        if !(self.f_factor.is_finite() && self.f_factor > 0.0) {
            return Err(Error::configuration("f_factor must be positive"));
        }
        if self.iteration_increment == 0 {
            return Err(Error::configuration("iteration_increment must be positive"));
        }
        if self.min_iterations == 0 || self.min_iterations > self.max_schedule_iterations {
            return Err(Error::configuration(format!(
                "iteration schedule must satisfy 1 <= min <= max, got {}..{}",
                self.min_iterations, self.max_schedule_iterations
            )));
        }
        if !(self.min_beta.is_finite() && self.min_beta > 0.0 && self.max_beta >= self.min_beta)
            || !self.max_beta.is_finite()
        {
            return Err(Error::configuration(format!(
                "beta range must satisfy 0 < min <= max, got {}..{}",
                self.min_beta, self.max_beta
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(UnfoldingSettings::default().validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let s = UnfoldingSettings::new()
            .with_max_iterations(500)
            .with_error_tolerance(0.05)
            .with_num_poisson_samples(10)
            .with_seed(7)
            .with_schedule(10, 100, 10)
            .with_beta_range(0.1, 10.0)
            .with_prior(PriorKind::Entropy)
            .with_parameter_of_interest(PoiKind::Rms);
        assert_eq!(s.max_iterations, 500);
        assert_eq!(s.seed, Some(7));
        assert_eq!(s.prior, PriorKind::Entropy);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        let base = UnfoldingSettings::default();
        assert!(base.clone().with_max_iterations(1).validate().is_err());
        assert!(base.clone().with_error_tolerance(0.0).validate().is_err());
        assert!(base.clone().with_error_tolerance(1.0).validate().is_err());
        assert!(base.clone().with_num_poisson_samples(0).validate().is_err());
        assert!(base.clone().with_schedule(10, 5, 1).validate().is_err());
        assert!(base.clone().with_schedule(1, 5, 0).validate().is_err());
        assert!(base.with_beta_range(0.0, 1.0).validate().is_err());
    }

    #[test]
    fn test_selectors_parse() {
        assert_eq!("gaussian".parse::<PriorKind>().unwrap(), PriorKind::Quadratic);
        assert_eq!("Entropy".parse::<PriorKind>().unwrap(), PriorKind::Entropy);
        assert!(matches!(
            "tikhonov".parse::<PriorKind>(),
            Err(Error::Configuration(_))
        ));

        for kind in PoiKind::ALL {
            assert_eq!(kind.name().parse::<PoiKind>().unwrap(), kind);
        }
        assert!("median".parse::<PoiKind>().is_err());
        assert!(PoiKind::Nrmsd.needs_reference());
        assert!(PoiKind::TotalEnergyCorrection.map_only());
        assert_eq!("cps".parse::<TrendType>().unwrap(), TrendType::Cps);
    }
}
