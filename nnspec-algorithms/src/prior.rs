//! Smoothness priors for MAP reconstruction.
//!
//! A prior contributes the gradient of its penalty `U(f)` with respect to
//! each bin. Neighbours are the adjacent energy bins; edge bins have one.

use nnspec_core::PriorKind;

/// Penalty over neighbouring energy bins.
pub trait Prior: Send + Sync {
    /// Prior name.
    fn name(&self) -> &'static str;

    /// `∂U/∂f_b` evaluated at `spectrum`.
    fn gradient(&self, spectrum: &[f64], bin: usize) -> f64;
}

/// Quadratic (Gaussian) prior: `U = Σ_b (f_b - f_{b+1})²`.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuadraticPrior;

impl Prior for QuadraticPrior {
    fn name(&self) -> &'static str {
        "quadratic"
    }

    fn gradient(&self, spectrum: &[f64], bin: usize) -> f64 {
        let f = spectrum[bin];
        neighbours(spectrum.len(), bin)
            .map(|n| 2.0 * (f - spectrum[n]))
            .sum()
    }
}

/// Cross-entropy prior: each bin is pulled towards the mean of its
/// neighbours with gradient `ln(f_b / m_b)`.
///
/// Bins that are already zero (or whose neighbours are) get no gradient.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntropyPrior;

impl Prior for EntropyPrior {
    fn name(&self) -> &'static str {
        "entropy"
    }

    #[allow(clippy::cast_precision_loss)]
    fn gradient(&self, spectrum: &[f64], bin: usize) -> f64 {
        let (sum, count) = neighbours(spectrum.len(), bin)
            .fold((0.0, 0usize), |(sum, count), n| (sum + spectrum[n], count + 1));
        if count == 0 {
            return 0.0;
        }
        let mean = sum / count as f64;
        let f = spectrum[bin];
        if f > 0.0 && mean > 0.0 {
            (f / mean).ln()
        } else {
            0.0
        }
    }
}

/// Looks up the prior for a selector.
#[must_use]
pub fn prior_for(kind: PriorKind) -> Box<dyn Prior> {
    match kind {
        PriorKind::Quadratic => Box::new(QuadraticPrior),
        PriorKind::Entropy => Box::new(EntropyPrior),
    }
}

fn neighbours(len: usize, bin: usize) -> impl Iterator<Item = usize> {
    let left = bin.checked_sub(1);
    let right = (bin + 1 < len).then_some(bin + 1);
    left.into_iter().chain(right)
}
