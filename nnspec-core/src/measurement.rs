//! Conversion of raw spectrometer readings to count rates.
//!
//! Readings are recorded from the most-moderated configuration down to the
//! bare detector; the response matrix is ordered the other way round, so
//! every conversion reverses the order.

use crate::error::{Error, Result};
use crate::spectrum::Measurements;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Units of the raw readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MeasurementUnits {
    /// Integrated charge in nC.
    #[default]
    Nc,
    /// Count rate.
    Cps,
}

impl FromStr for MeasurementUnits {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nc" => Ok(Self::Nc),
            "cps" => Ok(Self::Cps),
            other => Err(Error::configuration(format!(
                "unrecognized measurement units: {other}"
            ))),
        }
    }
}

impl fmt::Display for MeasurementUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nc => write!(f, "nc"),
            Self::Cps => write!(f, "cps"),
        }
    }
}

/// Delivered beam for a charge measurement (linac monitor units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamDelivery {
    /// Delivered dose (MU).
    pub dose_mu: f64,
    /// Delivery rate (MU/min).
    pub doserate_mu: f64,
}

/// Calibration of a charge-integrating spectrometer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeCalibration {
    /// Vendor normalization factor for the spectrometer.
    pub norm: f64,
    /// Charge-to-count calibration (fA/cps).
    pub f_factor_fa_per_cps: f64,
    /// Acquisition time (s).
    pub duration_s: f64,
    /// Optional beam delivery scaling.
    pub delivery: Option<BeamDelivery>,
}

impl ChargeCalibration {
    fn validate(&self) -> Result<()> {
        if !(self.norm.is_finite() && self.norm > 0.0) {
            return Err(Error::configuration("norm must be positive"));
        }
        if !(self.f_factor_fa_per_cps.is_finite() && self.f_factor_fa_per_cps > 0.0) {
            return Err(Error::configuration("f_factor must be positive"));
        }
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            return Err(Error::configuration("measurement duration must be positive"));
        }
        if let Some(delivery) = self.delivery {
            if !(delivery.dose_mu.is_finite() && delivery.dose_mu > 0.0) {
                return Err(Error::configuration("delivered dose (MU) must be positive"));
            }
            if !(delivery.doserate_mu.is_finite() && delivery.doserate_mu > 0.0) {
                return Err(Error::configuration("dose rate (MU/min) must be positive"));
            }
        }
        Ok(())
    }
}

/// Converts charge readings (nC) to count rates in response-matrix order.
///
/// `cps[i] = nc[M-1-i] * norm / (f_factor / 1e6) / duration`, times
/// `dose_mu / doserate_mu` when a delivery is given.
///
/// # Errors
/// [`Error::Configuration`] for invalid calibration values or readings.
pub fn charge_to_cps(readings_nc: &[f64], calibration: &ChargeCalibration) -> Result<Measurements> {
    calibration.validate()?;
    // fA/cps -> nA/cps
    let f_factor = calibration.f_factor_fa_per_cps / 1e6;
    let delivery_scale = calibration
        .delivery
        .map_or(1.0, |d| d.dose_mu / d.doserate_mu);

    let values = readings_nc
        .iter()
        .rev()
        .map(|nc| nc * calibration.norm / f_factor / calibration.duration_s * delivery_scale)
        .collect();
    Measurements::new(values)
}

/// Reorders count-rate readings into response-matrix order.
///
/// # Errors
/// [`Error::Configuration`] for negative or non-finite readings.
pub fn cps_readings(readings_cps: &[f64]) -> Result<Measurements> {
    Measurements::new(readings_cps.iter().rev().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_charge_conversion_reverses_and_scales() {
        let calibration = ChargeCalibration {
            norm: 2.0,
            f_factor_fa_per_cps: 1e6, // 1 nA/cps
            duration_s: 10.0,
            delivery: None,
        };
        let m = charge_to_cps(&[10.0, 20.0, 30.0], &calibration).unwrap();
        assert_relative_eq!(m[0], 6.0);
        assert_relative_eq!(m[1], 4.0);
        assert_relative_eq!(m[2], 2.0);
    }

    #[test]
    fn test_charge_conversion_with_delivery() {
        let calibration = ChargeCalibration {
            norm: 1.0,
            f_factor_fa_per_cps: 1e6,
            duration_s: 1.0,
            delivery: Some(BeamDelivery {
                dose_mu: 200.0,
                doserate_mu: 400.0,
            }),
        };
        let m = charge_to_cps(&[4.0], &calibration).unwrap();
        assert_relative_eq!(m[0], 2.0);
    }

    #[test]
    fn test_invalid_calibration() {
        let calibration = ChargeCalibration {
            norm: 1.0,
            f_factor_fa_per_cps: 0.0,
            duration_s: 1.0,
            delivery: None,
        };
        assert!(matches!(
            charge_to_cps(&[1.0], &calibration),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_delivered_dose() {
        for dose_mu in [-100.0, f64::NAN, 0.0] {
            let calibration = ChargeCalibration {
                norm: 1.0,
                f_factor_fa_per_cps: 1e6,
                duration_s: 1.0,
                delivery: Some(BeamDelivery {
                    dose_mu,
                    doserate_mu: 400.0,
                }),
            };
            assert!(
                matches!(charge_to_cps(&[4.0], &calibration), Err(Error::Configuration(_))),
                "dose_mu = {dose_mu}"
            );
        }
    }

    #[test]
    fn test_units_parse() {
        assert_eq!("CPS".parse::<MeasurementUnits>().unwrap(), MeasurementUnits::Cps);
        assert_eq!("nc".parse::<MeasurementUnits>().unwrap(), MeasurementUnits::Nc);
        assert!("amps".parse::<MeasurementUnits>().is_err());
        assert_eq!(cps_readings(&[1.0, 2.0]).unwrap().into_inner(), vec![2.0, 1.0]);
    }
}
