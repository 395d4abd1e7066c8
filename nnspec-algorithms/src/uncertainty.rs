//! Uncertainty estimation by Poisson resampling.
//!
//! Each replicate draws every measurement channel from a Poisson
//! distribution with the measured value as mean, then reconstructs from the
//! same initial spectrum under the same policy. The reported uncertainty of
//! a bin is the RMS deviation of the replicates from the *reference*
//! reconstruction:
//!
//! `sqrt( (1/N) * Σ_k (replicate_k[b] - reference[b])² )`
//!
//! This is not a sample standard deviation about the replicate mean.
//!
//! Replicates share nothing mutable and run in parallel with rayon. Each one
//! seeds its own generator from `seed + replicate_index`, so results do not
//! depend on scheduling.
#![allow(clippy::cast_precision_loss)]

use crate::convergence::ConvergencePolicy;
use crate::poi::total_dose;
use crate::solver::Reconstructor;
use nnspec_core::{check_dimension, Error, Measurements, Result, Spectrum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;

/// Produces the perturbed measurements of one replicate.
pub trait MeasurementSampler: Send + Sync {
    /// Draws replicate `replicate` from `measurements`.
    ///
    /// # Errors
    /// Implementation-specific; the Poisson sampler rejects invalid means.
    fn sample(&self, measurements: &Measurements, replicate: usize) -> Result<Measurements>;
}

/// Poisson counting-statistics sampler.
#[derive(Clone, Copy, Debug)]
pub struct PoissonSampler {
    seed: u64,
}

impl PoissonSampler {
    /// Creates a sampler with a base seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Base seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl MeasurementSampler for PoissonSampler {
    fn sample(&self, measurements: &Measurements, replicate: usize) -> Result<Measurements> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(replicate as u64));
        let values = measurements
            .iter()
            .map(|&mean| poisson_draw(mean, &mut rng))
            .collect::<Result<Vec<_>>>()?;
        Measurements::new(values)
    }
}

fn poisson_draw(mean: f64, rng: &mut StdRng) -> Result<f64> {
    // A channel with no counts stays at zero.
    if mean == 0.0 {
        return Ok(0.0);
    }
    let distribution = Poisson::new(mean).map_err(|e| {
        Error::configuration(format!("cannot sample Poisson with mean {mean}: {e}"))
    })?;
    Ok(distribution.sample(rng))
}

/// One reconstructed replicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Replicate {
    /// Final spectrum of the replicate.
    pub spectrum: Vec<f64>,
    /// Dose of that spectrum (mSv/hr).
    pub dose: f64,
    /// Update steps the replicate executed.
    pub iterations: usize,
}

/// All replicates of an estimate, indexed by replicate number.
#[derive(Clone, Debug, Default)]
pub struct PoissonEnsemble {
    /// Replicates in index order.
    pub replicates: Vec<Replicate>,
}

impl PoissonEnsemble {
    /// Number of replicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replicates.len()
    }

    /// True when there are no replicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replicates.is_empty()
    }

    /// Reduces the ensemble to RMS deviations from the reference.
    ///
    /// # Errors
    /// - [`Error::InsufficientData`] for an empty ensemble.
    /// - [`Error::Dimension`] if a replicate length differs from the reference.
    pub fn aggregate(&self, reference: &[f64], reference_dose: f64) -> Result<UncertaintyEstimate> {
        if self.replicates.is_empty() {
            return Err(Error::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        let mut sums = DeviationSums::new(reference.len());
        for replicate in &self.replicates {
            sums.add(replicate, reference, reference_dose)?;
        }
        Ok(sums.finish(reference_dose))
    }
}

/// Aggregated uncertainty.
#[derive(Clone, Debug, PartialEq)]
pub struct UncertaintyEstimate {
    /// Per-bin RMS deviation from the reference spectrum.
    pub spectrum_rms: Vec<f64>,
    /// Dose of the reference spectrum (mSv/hr).
    pub dose: f64,
    /// RMS deviation of replicate doses from the reference dose.
    pub dose_rms: f64,
    /// Number of replicates aggregated.
    pub num_samples: usize,
}

#[derive(Clone, Debug)]
struct DeviationSums {
    bins: Vec<f64>,
    dose: f64,
    count: usize,
}

impl DeviationSums {
    fn new(num_bins: usize) -> Self {
        Self {
            bins: vec![0.0; num_bins],
            dose: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, replicate: &Replicate, reference: &[f64], reference_dose: f64) -> Result<()> {
        check_dimension("replicate spectrum", reference.len(), replicate.spectrum.len())?;
        for ((sum, value), r) in self.bins.iter_mut().zip(&replicate.spectrum).zip(reference) {
            *sum += (value - r) * (value - r);
        }
        self.dose += (replicate.dose - reference_dose) * (replicate.dose - reference_dose);
        self.count += 1;
        Ok(())
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.bins.iter_mut().zip(other.bins) {
            *a += b;
        }
        self.dose += other.dose;
        self.count += other.count;
        self
    }

    fn finish(self, reference_dose: f64) -> UncertaintyEstimate {
        let n = self.count as f64;
        UncertaintyEstimate {
            spectrum_rms: self.bins.into_iter().map(|s| (s / n).sqrt()).collect(),
            dose: reference_dose,
            dose_rms: (self.dose / n).sqrt(),
            num_samples: self.count,
        }
    }
}

/// Drives the replicate reconstructions.
#[derive(Clone, Debug)]
pub struct UncertaintyEstimator<S = PoissonSampler> {
    num_samples: usize,
    sampler: S,
}

impl UncertaintyEstimator<PoissonSampler> {
    /// Poisson resampling with `num_samples` replicates.
    ///
    /// # Errors
    /// [`Error::Configuration`] if `num_samples` is zero.
    pub fn poisson(num_samples: usize, seed: u64) -> Result<Self> {
        Self::with_sampler(num_samples, PoissonSampler::new(seed))
    }
}

impl<S: MeasurementSampler> UncertaintyEstimator<S> {
    /// Resampling with a custom sampler.
    ///
    /// # Errors
    /// [`Error::Configuration`] if `num_samples` is zero.
    pub fn with_sampler(num_samples: usize, sampler: S) -> Result<Self> {
        if num_samples == 0 {
            return Err(Error::configuration("num_poisson_samples must be positive"));
        }
        Ok(Self {
            num_samples,
            sampler,
        })
    }

    /// Number of replicates.
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Reconstructs replicate `index`.
    ///
    /// # Errors
    /// Sampling errors and any solver error of the replicate.
    pub fn replicate<R: Reconstructor + ?Sized>(
        &self,
        solver: &R,
        policy: &ConvergencePolicy,
        initial: &Spectrum,
        measurements: &Measurements,
        icrp_factors: &[f64],
        index: usize,
    ) -> Result<Replicate> {
        let perturbed = self.sampler.sample(measurements, index)?;
        let run = solver.reconstruct(initial, &perturbed, policy)?;
        let dose = total_dose(&run.spectrum, icrp_factors)?;
        log::trace!("replicate {index}: {} step(s), dose {dose}", run.iterations);
        Ok(Replicate {
            spectrum: run.spectrum.into_inner(),
            dose,
            iterations: run.iterations,
        })
    }

    /// Reconstructs every replicate and keeps them all.
    ///
    /// # Errors
    /// The first replicate error encountered.
    pub fn ensemble<R: Reconstructor + ?Sized>(
        &self,
        solver: &R,
        policy: &ConvergencePolicy,
        initial: &Spectrum,
        measurements: &Measurements,
        icrp_factors: &[f64],
    ) -> Result<PoissonEnsemble> {
        check_inputs(solver, initial, measurements, icrp_factors)?;
        let replicates = (0..self.num_samples)
            .into_par_iter()
            .map(|k| self.replicate(solver, policy, initial, measurements, icrp_factors, k))
            .collect::<Result<Vec<_>>>()?;
        Ok(PoissonEnsemble { replicates })
    }

    /// Estimates per-bin and dose uncertainty around `reference`.
    ///
    /// `reference` must be the reconstruction of the unperturbed
    /// measurements from `initial` under `policy`. Replicates are reduced on
    /// the fly; no ensemble is retained.
    ///
    /// # Errors
    /// - [`Error::Dimension`] for mismatched inputs, before any replicate runs.
    /// - The first replicate error encountered.
    pub fn estimate<R: Reconstructor + ?Sized>(
        &self,
        solver: &R,
        policy: &ConvergencePolicy,
        initial: &Spectrum,
        measurements: &Measurements,
        reference: &Spectrum,
        icrp_factors: &[f64],
    ) -> Result<UncertaintyEstimate> {
        check_inputs(solver, initial, measurements, icrp_factors)?;
        check_dimension("reference spectrum", initial.len(), reference.len())?;
        let reference_dose = total_dose(reference, icrp_factors)?;
        let num_bins = reference.len();

        let sums = (0..self.num_samples)
            .into_par_iter()
            .map(|k| self.replicate(solver, policy, initial, measurements, icrp_factors, k))
            .try_fold(
                || DeviationSums::new(num_bins),
                |mut acc, replicate| {
                    acc.add(&replicate?, reference, reference_dose)?;
                    Ok::<_, Error>(acc)
                },
            )
            .try_reduce(|| DeviationSums::new(num_bins), |a, b| Ok(a.merge(b)))?;

        let estimate = sums.finish(reference_dose);
        log::info!(
            "{} replicate(s): dose {:.6e} ± {:.6e} mSv/hr",
            estimate.num_samples,
            estimate.dose,
            estimate.dose_rms
        );
        Ok(estimate)
    }
}

fn check_inputs<R: Reconstructor + ?Sized>(
    solver: &R,
    initial: &Spectrum,
    measurements: &Measurements,
    icrp_factors: &[f64],
) -> Result<()> {
    let response = solver.response();
    check_dimension("initial spectrum", response.num_bins(), initial.len())?;
    check_dimension("measurements", response.num_measurements(), measurements.len())?;
    check_dimension("ICRP factors", response.num_bins(), icrp_factors.len())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_poisson_sampler_is_deterministic_per_replicate() {
        let sampler = PoissonSampler::new(42);
        let m = Measurements::new(vec![100.0, 2500.0, 0.0]).unwrap();
        let a = sampler.sample(&m, 3).unwrap();
        let b = sampler.sample(&m, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[2], 0.0);
        assert!(a.iter().all(|v| v.fract() == 0.0 && *v >= 0.0));
    }

    #[test]
    fn test_poisson_sampler_mean() {
        let sampler = PoissonSampler::new(7);
        let m = Measurements::new(vec![50.0]).unwrap();
        let n = 2000;
        let mean = (0..n).map(|k| sampler.sample(&m, k).unwrap()[0]).sum::<f64>() / n as f64;
        assert!((mean - 50.0).abs() < 1.5, "sample mean {mean}");
    }

    #[test]
    fn test_ensemble_aggregate() {
        let ensemble = PoissonEnsemble {
            replicates: vec![
                Replicate {
                    spectrum: vec![1.0, 4.0],
                    dose: 2.0,
                    iterations: 5,
                },
                Replicate {
                    spectrum: vec![3.0, 4.0],
                    dose: 4.0,
                    iterations: 5,
                },
            ],
        };
        let estimate = ensemble.aggregate(&[2.0, 4.0], 3.0).unwrap();
        assert_relative_eq!(estimate.spectrum_rms[0], 1.0);
        assert_relative_eq!(estimate.spectrum_rms[1], 0.0);
        assert_relative_eq!(estimate.dose_rms, 1.0);
        assert_eq!(estimate.num_samples, 2);
    }

    #[test]
    fn test_aggregate_measures_distance_to_reference() {
        // Replicates agree with each other but not with the reference.
        let replicate = Replicate {
            spectrum: vec![1.0, 5.0],
            dose: 0.5,
            iterations: 3,
        };
        let ensemble = PoissonEnsemble {
            replicates: vec![replicate.clone(), replicate],
        };
        let estimate = ensemble.aggregate(&[2.0, 5.0], 2.0).unwrap();
        assert_eq!(estimate.spectrum_rms, vec![1.0, 0.0]);
        assert_eq!(estimate.dose_rms, 1.5);
        assert_eq!(estimate.dose, 2.0);
    }

    #[test]
    fn test_empty_ensemble() {
        assert!(matches!(
            PoissonEnsemble::default().aggregate(&[1.0], 0.0),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_zero_samples_rejected() {
        assert!(UncertaintyEstimator::poisson(0, 1).is_err());
    }
}
