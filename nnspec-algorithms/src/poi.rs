//! Parameters of interest: scalar reductions of a reconstruction.
//!
//! All functions are pure and never mutate their inputs. Length mismatches
//! surface as [`Error::Dimension`]; otherwise every function is total.
#![allow(clippy::cast_precision_loss, clippy::doc_markdown)]

use crate::state::ReconstructionState;
use nnspec_core::{check_dimension, Error, PoiKind, Result};

/// pSv/s to mSv/hr.
pub const DOSE_CONVERSION: f64 = 3600.0 * 1e-9;

/// `Σ_b spectrum[b]`.
#[must_use]
pub fn total_fluence(spectrum: &[f64]) -> f64 {
    spectrum.iter().sum()
}

/// Ambient dose equivalent rate in mSv/hr.
///
/// `icrp_factors` are fluence-to-dose conversion coefficients in pSv·cm².
///
/// # Errors
/// [`Error::Dimension`] if `icrp_factors` does not have one entry per bin.
pub fn total_dose(spectrum: &[f64], icrp_factors: &[f64]) -> Result<f64> {
    check_dimension("ICRP factors", spectrum.len(), icrp_factors.len())?;
    let picosievert: f64 = spectrum.iter().zip(icrp_factors).map(|(s, h)| s * h).sum();
    Ok(picosievert * DOSE_CONVERSION)
}

/// Per-bin contribution to [`total_dose`], in mSv/hr.
///
/// # Errors
/// [`Error::Dimension`] if the lengths differ.
pub fn dose_contributions(spectrum: &[f64], icrp_factors: &[f64]) -> Result<Vec<f64>> {
    check_dimension("ICRP factors", spectrum.len(), icrp_factors.len())?;
    Ok(spectrum
        .iter()
        .zip(icrp_factors)
        .map(|(s, h)| s * h * DOSE_CONVERSION)
        .collect())
}

/// Worst-case channel disagreement: `max_m |1 - ratio[m]|`.
#[must_use]
pub fn max_ratio(ratio: &[f64]) -> f64 {
    ratio.iter().map(|r| (1.0 - r).abs()).fold(0.0, f64::max)
}

/// Mean channel disagreement: `mean_m |1 - ratio[m]|`.
#[must_use]
pub fn avg_ratio(ratio: &[f64]) -> f64 {
    if ratio.is_empty() {
        return 0.0;
    }
    ratio.iter().map(|r| (1.0 - r).abs()).sum::<f64>() / ratio.len() as f64
}

/// Root-mean-square deviation of `spectrum` from `reference`.
///
/// # Errors
/// [`Error::Dimension`] if the lengths differ.
pub fn rms_estimator(reference: &[f64], spectrum: &[f64]) -> Result<f64> {
    check_dimension("spectrum", reference.len(), spectrum.len())?;
    if reference.is_empty() {
        return Ok(0.0);
    }
    let sum_sq: f64 = reference
        .iter()
        .zip(spectrum)
        .map(|(r, s)| (s - r) * (s - r))
        .sum();
    Ok((sum_sq / reference.len() as f64).sqrt())
}

/// RMS deviation normalized by the mean of `reference`.
///
/// A reference with zero mean leaves the RMS unnormalized.
///
/// # Errors
/// [`Error::Dimension`] if the lengths differ.
pub fn nrmsd(reference: &[f64], spectrum: &[f64]) -> Result<f64> {
    let rms = rms_estimator(reference, spectrum)?;
    let mean = if reference.is_empty() {
        0.0
    } else {
        total_fluence(reference) / reference.len() as f64
    };
    Ok(if mean == 0.0 { rms } else { rms / mean })
}

/// Reduced chi-squared of the measurements against the estimate the ratio
/// was computed from, `ŷ_m = y_m / ratio_m`:
/// `Σ_m (y_m - ŷ_m)² / ŷ_m` divided by `min(M - 1, iteration)`.
///
/// `iteration` is the number of update steps behind `ratio`. With a single
/// measurement the unreduced sum is returned. A channel with zero counts
/// contributes nothing; a non-positive ratio against a non-zero measurement
/// contributes infinity.
///
/// # Errors
/// - [`Error::Dimension`] if `ratio` and `measurements` differ in length.
/// - [`Error::InsufficientData`] if `iteration` is zero: no ratio exists yet.
pub fn reduced_chi_squared(measurements: &[f64], ratio: &[f64], iteration: usize) -> Result<f64> {
    check_dimension("ratio", measurements.len(), ratio.len())?;
    if iteration == 0 {
        return Err(Error::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    let sum: f64 = measurements
        .iter()
        .zip(ratio)
        .map(|(&y, &r)| chi_term(y, r))
        .sum();
    let dof = measurements.len().saturating_sub(1).min(iteration);
    Ok(if dof == 0 { sum } else { sum / dof as f64 })
}

/// Chi-squared of `spectrum` against `reference`, over bins where the
/// reference is positive: `Σ_b (s_b - r_b)² / r_b`.
///
/// # Errors
/// [`Error::Dimension`] if the lengths differ.
pub fn chi_squared_g(reference: &[f64], spectrum: &[f64]) -> Result<f64> {
    check_dimension("spectrum", reference.len(), spectrum.len())?;
    Ok(reference
        .iter()
        .zip(spectrum)
        .filter(|(r, _)| **r > 0.0)
        .map(|(r, s)| (s - r) * (s - r) / r)
        .sum())
}

/// Relative squared residual of the estimate behind `ratio`:
/// `Σ_m (y_m - ŷ_m)² / Σ_m y_m²` with `ŷ_m = y_m / ratio_m`. Zero when all
/// measurements are zero.
///
/// # Errors
/// [`Error::Dimension`] if the lengths differ.
pub fn j_factor(measurements: &[f64], ratio: &[f64]) -> Result<f64> {
    check_dimension("ratio", measurements.len(), ratio.len())?;
    let residual: f64 = measurements
        .iter()
        .zip(ratio)
        .map(|(&y, &r)| {
            let diff = y - estimate_from_ratio(y, r);
            diff * diff
        })
        .sum();
    let scale: f64 = measurements.iter().map(|y| y * y).sum();
    Ok(if scale == 0.0 { 0.0 } else { residual / scale })
}

/// `Σ_b energy_correction[b]`.
#[must_use]
pub fn total_energy_correction(energy_correction: &[f64]) -> f64 {
    energy_correction.iter().sum()
}

fn estimate_from_ratio(measured: f64, ratio: f64) -> f64 {
    if measured == 0.0 {
        0.0
    } else if ratio > 0.0 {
        measured / ratio
    } else {
        f64::INFINITY
    }
}

/// `(y - ŷ)² / ŷ`, rewritten in terms of the ratio as `y (r - 1)² / r`.
fn chi_term(measured: f64, ratio: f64) -> f64 {
    if measured == 0.0 {
        0.0
    } else if ratio > 0.0 && ratio.is_finite() {
        measured * (ratio - 1.0) * (ratio - 1.0) / ratio
    } else {
        f64::INFINITY
    }
}

/// Everything a POI may be computed from.
#[derive(Clone, Copy, Debug)]
pub struct PoiInputs<'a> {
    /// Measured count rates.
    pub measurements: &'a [f64],
    /// Current spectrum.
    pub spectrum: &'a [f64],
    /// Current ratio vector.
    pub ratio: &'a [f64],
    /// Update steps executed to reach `spectrum` and `ratio`.
    pub iteration: usize,
    /// MAP energy correction, if the reconstruction is regularized.
    pub energy_correction: Option<&'a [f64]>,
    /// Fluence-to-dose conversion coefficients.
    pub icrp_factors: Option<&'a [f64]>,
    /// Known reference spectrum.
    pub reference: Option<&'a [f64]>,
}

impl<'a> PoiInputs<'a> {
    /// Inputs read off a reconstruction state.
    #[must_use]
    pub fn from_state(measurements: &'a [f64], state: &'a ReconstructionState) -> Self {
        Self {
            measurements,
            spectrum: state.spectrum(),
            ratio: state.ratio(),
            iteration: state.total_iterations(),
            energy_correction: None,
            icrp_factors: None,
            reference: None,
        }
    }

    /// Attach the MAP energy correction.
    #[must_use]
    pub fn with_energy_correction(mut self, energy_correction: &'a [f64]) -> Self {
        self.energy_correction = Some(energy_correction);
        self
    }

    /// Attach ICRP conversion factors.
    #[must_use]
    pub fn with_icrp_factors(mut self, icrp_factors: Option<&'a [f64]>) -> Self {
        self.icrp_factors = icrp_factors;
        self
    }

    /// Attach a reference spectrum.
    #[must_use]
    pub fn with_reference(mut self, reference: Option<&'a [f64]>) -> Self {
        self.reference = reference;
        self
    }
}

/// Checks that the optional inputs `kind` depends on are present, before
/// any iteration is spent.
///
/// # Errors
/// [`Error::Configuration`] naming the missing input.
pub fn check_requirements(
    kind: PoiKind,
    regularized: bool,
    has_icrp_factors: bool,
    has_reference: bool,
) -> Result<()> {
    if kind == PoiKind::TotalDose && !has_icrp_factors {
        return Err(Error::configuration("total_dose requires ICRP factors"));
    }
    if kind.needs_reference() && !has_reference {
        return Err(Error::configuration(format!(
            "{kind} requires a reference spectrum"
        )));
    }
    if kind.map_only() && !regularized {
        return Err(Error::configuration(format!(
            "{kind} is only defined for MAP reconstructions"
        )));
    }
    Ok(())
}

/// Evaluates the POI named by `kind`.
///
/// # Errors
/// - [`Error::Configuration`] if a required optional input is missing.
/// - [`Error::Dimension`] on length mismatches.
pub fn evaluate(kind: PoiKind, inputs: &PoiInputs<'_>) -> Result<f64> {
    check_requirements(
        kind,
        inputs.energy_correction.is_some(),
        inputs.icrp_factors.is_some(),
        inputs.reference.is_some(),
    )?;
    let missing = || Error::configuration(format!("missing input for {kind}"));

    match kind {
        PoiKind::TotalFluence => Ok(total_fluence(inputs.spectrum)),
        PoiKind::TotalDose => total_dose(inputs.spectrum, inputs.icrp_factors.ok_or_else(missing)?),
        PoiKind::TotalEnergyCorrection => Ok(total_energy_correction(
            inputs.energy_correction.ok_or_else(missing)?,
        )),
        PoiKind::MaxMlemRatio => Ok(max_ratio(inputs.ratio)),
        PoiKind::AvgMlemRatio => Ok(avg_ratio(inputs.ratio)),
        PoiKind::JFactor => j_factor(inputs.measurements, inputs.ratio),
        PoiKind::ReducedChiSquared => {
            reduced_chi_squared(inputs.measurements, inputs.ratio, inputs.iteration)
        }
        PoiKind::Rms => rms_estimator(inputs.reference.ok_or_else(missing)?, inputs.spectrum),
        PoiKind::Nrmsd => nrmsd(inputs.reference.ok_or_else(missing)?, inputs.spectrum),
        PoiKind::ChiSquaredG => chi_squared_g(inputs.reference.ok_or_else(missing)?, inputs.spectrum),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_total_fluence() {
        assert_relative_eq!(total_fluence(&[1.0, 2.5, 0.5]), 4.0);
        assert_eq!(total_fluence(&[]), 0.0);
    }

    #[test]
    fn test_total_dose_units() {
        // 1000 n/cm²/s at 100 pSv·cm² = 1e5 pSv/s = 0.36 mSv/hr
        let dose = total_dose(&[1000.0], &[100.0]).unwrap();
        assert_relative_eq!(dose, 0.36, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_spectrum_has_zero_dose() {
        assert_eq!(total_dose(&[0.0; 4], &[1.0, 5.0, 1e6, 3.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_dose_dimension_mismatch() {
        assert!(matches!(
            total_dose(&[1.0, 2.0], &[1.0]),
            Err(Error::Dimension { .. })
        ));
    }

    #[test]
    fn test_dose_contributions_sum_to_total() {
        let s = [10.0, 20.0, 30.0];
        let h = [1.0, 2.0, 3.0];
        let parts = dose_contributions(&s, &h).unwrap();
        assert_relative_eq!(parts.iter().sum::<f64>(), total_dose(&s, &h).unwrap());
    }

    #[test]
    fn test_ratio_metrics() {
        let ratio = [1.1, 0.8, 1.0];
        assert_relative_eq!(max_ratio(&ratio), 0.2, epsilon = 1e-12);
        assert_relative_eq!(avg_ratio(&ratio), 0.1, epsilon = 1e-12);
        assert_eq!(avg_ratio(&[]), 0.0);
    }

    #[test]
    fn test_rms_and_nrmsd() {
        let reference = [2.0, 2.0, 2.0, 2.0];
        let spectrum = [3.0, 1.0, 3.0, 1.0];
        assert_relative_eq!(rms_estimator(&reference, &spectrum).unwrap(), 1.0);
        assert_relative_eq!(nrmsd(&reference, &spectrum).unwrap(), 0.5);
        assert!(rms_estimator(&reference, &spectrum[..3]).is_err());
        assert_relative_eq!(nrmsd(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_chi_squared_g_skips_empty_reference_bins() {
        let reference = [4.0, 0.0, 1.0];
        let spectrum = [2.0, 5.0, 2.0];
        assert_relative_eq!(chi_squared_g(&reference, &spectrum).unwrap(), 2.0);
    }

    #[test]
    fn test_reduced_chi_squared_uses_ratio() {
        // Identity response, flat start, y = [2, 3]: one step gives
        // spectrum [2, 3] and ratio [2, 3]. Re-projecting the spectrum would
        // match y exactly; the ratio-based estimate [1, 1] does not.
        let measured = [2.0, 3.0];
        let chi = reduced_chi_squared(&measured, &[2.0, 3.0], 1).unwrap();
        // 2·1²/2 + 3·2²/3
        assert_relative_eq!(chi, 5.0);
        assert_eq!(reduced_chi_squared(&measured, &[1.0, 1.0], 1).unwrap(), 0.0);
    }

    #[test]
    fn test_reduced_chi_squared_degrees_of_freedom() {
        let measured = [1.0, 1.0, 1.0, 1.0];
        let ratio = [2.0, 1.0, 1.0, 1.0];
        // dof limited by the iteration index early on, then by M - 1
        assert_relative_eq!(reduced_chi_squared(&measured, &ratio, 1).unwrap(), 0.5);
        assert_relative_eq!(reduced_chi_squared(&measured, &ratio, 2).unwrap(), 0.25);
        assert_relative_eq!(
            reduced_chi_squared(&measured, &ratio, 50).unwrap(),
            0.5 / 3.0
        );
        assert!(matches!(
            reduced_chi_squared(&measured, &ratio, 0),
            Err(Error::InsufficientData { .. })
        ));
        assert_relative_eq!(reduced_chi_squared(&[4.0], &[2.0], 7).unwrap(), 2.0);
    }

    #[test]
    fn test_reduced_chi_squared_edge_channels() {
        assert_eq!(reduced_chi_squared(&[0.0, 2.0], &[0.0, 1.0], 3).unwrap(), 0.0);
        assert!(reduced_chi_squared(&[1.0, 2.0], &[0.0, 1.0], 3)
            .unwrap()
            .is_infinite());
        assert!(matches!(
            reduced_chi_squared(&[1.0, 2.0], &[1.0], 3),
            Err(Error::Dimension { .. })
        ));
    }

    #[test]
    fn test_j_factor() {
        assert_relative_eq!(j_factor(&[3.0, 4.0], &[1.0, 1.0]).unwrap(), 0.0);
        // estimate [2, 4]: residual 1 + 0, scale 9 + 16
        assert_relative_eq!(j_factor(&[3.0, 4.0], &[1.5, 1.0]).unwrap(), 1.0 / 25.0);
        assert_eq!(j_factor(&[0.0, 0.0], &[0.0, 0.0]).unwrap(), 0.0);
        assert!(j_factor(&[3.0, 4.0], &[1.0]).is_err());
    }

    #[test]
    fn test_evaluate_requires_inputs() {
        let inputs = PoiInputs {
            measurements: &[2.0],
            spectrum: &[1.0, 1.0],
            ratio: &[1.0],
            iteration: 1,
            energy_correction: None,
            icrp_factors: None,
            reference: None,
        };
        assert_relative_eq!(evaluate(PoiKind::TotalFluence, &inputs).unwrap(), 2.0);
        assert!(matches!(
            evaluate(PoiKind::TotalDose, &inputs),
            Err(Error::Configuration(_))
        ));
        assert!(evaluate(PoiKind::Rms, &inputs).is_err());
        assert!(evaluate(PoiKind::TotalEnergyCorrection, &inputs).is_err());

        let reference = [1.0, 3.0];
        let with_reference = inputs.with_reference(Some(&reference[..]));
        assert_relative_eq!(
            evaluate(PoiKind::Rms, &with_reference).unwrap(),
            2.0_f64.sqrt()
        );
        let with_ec = inputs.with_energy_correction(&[0.5, 1.5]);
        assert_relative_eq!(
            evaluate(PoiKind::TotalEnergyCorrection, &with_ec).unwrap(),
            2.0
        );
    }
}
