//! Spectrum and measurement vectors.

use crate::error::{Error, Result};
use std::ops::Deref;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Neutron fluence rate per energy bin (n cm⁻² s⁻¹).
///
/// A spectrum built with [`Spectrum::initial`] is strictly positive: a bin at
/// zero can never become non-zero under a multiplicative update. Solvers
/// mutate the values in place through [`Spectrum::values_mut`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spectrum(Vec<f64>);

impl Spectrum {
    /// Creates an initial guess.
    ///
    /// # Errors
    /// - [`Error::Dimension`] if `values` is empty.
    /// - [`Error::Configuration`] if any bin is not strictly positive and finite.
    pub fn initial(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::dimension("initial spectrum", 1, 0));
        }
        if let Some((b, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v <= 0.0)
        {
            return Err(Error::configuration(format!(
                "initial spectrum bin {b} must be strictly positive, got {v}"
            )));
        }
        Ok(Self(values))
    }

    /// Wraps values without the positivity check (e.g. a reference spectrum
    /// or a reconstructed result that may contain zeros).
    #[must_use]
    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Mutable access for solvers.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }

    /// Consumes the spectrum.
    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for Spectrum {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

/// Measured count rates, one per detector configuration (counts/s).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurements(Vec<f64>);

impl Measurements {
    /// Wraps measured values.
    ///
    /// # Errors
    /// - [`Error::Dimension`] if `values` is empty.
    /// - [`Error::Configuration`] if any value is negative or non-finite.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::dimension("measurements", 1, 0));
        }
        if let Some((m, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(Error::configuration(format!(
                "measurement {m} must be finite and non-negative, got {v}"
            )));
        }
        Ok(Self(values))
    }

    /// Consumes the measurements.
    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for Measurements {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_requires_positive_bins() {
        assert!(Spectrum::initial(vec![1.0, 2.0]).is_ok());
        assert!(matches!(
            Spectrum::initial(vec![1.0, 0.0]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Spectrum::initial(vec![f64::NAN]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Spectrum::initial(vec![]),
            Err(Error::Dimension { .. })
        ));
    }

    #[test]
    fn test_measurements_allow_zero() {
        let m = Measurements::new(vec![0.0, 3.5]).unwrap();
        assert_eq!(m.len(), 2);
        assert!(Measurements::new(vec![-1.0]).is_err());
    }

    #[test]
    fn test_values_mut() {
        let mut s = Spectrum::initial(vec![1.0, 2.0]).unwrap();
        s.values_mut()[1] = 4.0;
        assert_eq!(&*s, &[1.0, 4.0]);
        assert_eq!(s.into_inner(), vec![1.0, 4.0]);
    }
}
