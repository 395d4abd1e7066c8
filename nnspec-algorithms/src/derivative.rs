//! Finite-difference derivatives of a POI trajectory.
#![allow(clippy::cast_precision_loss)]

use nnspec_core::{check_dimension, Error, Result};

/// Derivative of `values` with respect to iteration count.
///
/// The first point uses a forward difference, the last a backward
/// difference, and interior points a central difference over their two
/// neighbours. Spacing need not be uniform.
///
/// # Errors
/// - [`Error::InsufficientData`] with fewer than two samples.
/// - [`Error::Dimension`] if the two slices differ in length.
/// - [`Error::Configuration`] if the iteration counts are not strictly increasing.
pub fn finite_differences(iterations: &[usize], values: &[f64]) -> Result<Vec<f64>> {
    if iterations.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            actual: iterations.len(),
        });
    }
    check_dimension("POI values", iterations.len(), values.len())?;
    if let Some(pair) = iterations.windows(2).find(|w| w[1] <= w[0]) {
        return Err(Error::configuration(format!(
            "iteration counts must be strictly increasing, got {} then {}",
            pair[0], pair[1]
        )));
    }

    let x: Vec<f64> = iterations.iter().map(|&n| n as f64).collect();
    let last = x.len() - 1;
    let slope = |lo: usize, hi: usize| (values[hi] - values[lo]) / (x[hi] - x[lo]);

    Ok((0..=last)
        .map(|i| match i {
            0 => slope(0, 1),
            i if i == last => slope(last - 1, last),
            i => slope(i - 1, i + 1),
        })
        .collect())
}
