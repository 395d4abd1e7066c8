//! Detector response model.
//!
//! The response matrix maps an energy spectrum (one value per bin) to the
//! expected reading of each detector configuration. Rows are measurements,
//! columns are energy bins, units are cm².
#![allow(clippy::doc_markdown)]

use crate::error::{Error, Result};

/// Immutable response matrix of shape `[num_measurements][num_bins]`.
///
/// Stored row-major in a single contiguous buffer. The transposed view used
/// for backprojection is an index remap over the same storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMatrix {
    data: Vec<f64>,
    num_measurements: usize,
    num_bins: usize,
}

impl ResponseMatrix {
    /// Builds a response matrix from nested rows.
    ///
    /// # Errors
    /// - [`Error::Dimension`] if there are no rows, no columns, or the rows are jagged.
    /// - [`Error::Configuration`] if an entry is negative or non-finite, or if a
    ///   row or column is entirely zero (that measurement or bin cannot be
    ///   reconstructed).
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let num_measurements = rows.len();
        if num_measurements == 0 {
            return Err(Error::dimension("response matrix rows", 1, 0));
        }
        let num_bins = rows[0].len();
        if num_bins == 0 {
            return Err(Error::dimension("response matrix columns", 1, 0));
        }

        let mut data = Vec::with_capacity(num_measurements * num_bins);
        for (m, row) in rows.into_iter().enumerate() {
            if row.len() != num_bins {
                return Err(Error::dimension(
                    format!("response matrix row {m}"),
                    num_bins,
                    row.len(),
                ));
            }
            data.extend(row);
        }

        Self::from_flat(data, num_measurements, num_bins)
    }

    /// Builds a response matrix from a row-major buffer.
    ///
    /// # Errors
    /// Same conditions as [`Self::from_rows`].
    pub fn from_flat(data: Vec<f64>, num_measurements: usize, num_bins: usize) -> Result<Self> {
        if num_measurements == 0 || num_bins == 0 {
            return Err(Error::dimension(
                "response matrix shape",
                1,
                num_measurements.min(num_bins),
            ));
        }
        if data.len() != num_measurements * num_bins {
            return Err(Error::dimension(
                "response matrix buffer",
                num_measurements * num_bins,
                data.len(),
            ));
        }
        if let Some(idx) = data.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::configuration(format!(
                "response entry ({}, {}) must be finite and non-negative, got {}",
                idx / num_bins,
                idx % num_bins,
                data[idx]
            )));
        }

        let matrix = Self {
            data,
            num_measurements,
            num_bins,
        };

        if let Some(m) = (0..num_measurements).find(|&m| matrix.row(m).iter().all(|&v| v == 0.0)) {
            return Err(Error::configuration(format!(
                "measurement {m} has zero response in every energy bin"
            )));
        }
        if let Some(b) =
            (0..num_bins).find(|&b| (0..num_measurements).all(|m| matrix.get(m, b) == 0.0))
        {
            return Err(Error::configuration(format!(
                "energy bin {b} has zero response in every measurement"
            )));
        }

        Ok(matrix)
    }

    /// Number of measurements (rows).
    #[inline]
    #[must_use]
    pub fn num_measurements(&self) -> usize {
        self.num_measurements
    }

    /// Number of energy bins (columns).
    #[inline]
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Response of measurement `m` to bin `b`.
    #[inline]
    #[must_use]
    pub fn get(&self, m: usize, b: usize) -> f64 {
        self.data[m * self.num_bins + b]
    }

    /// Transposed access: entry `[b][m]` of the transpose.
    #[inline]
    #[must_use]
    pub fn transposed(&self, b: usize, m: usize) -> f64 {
        self.get(m, b)
    }

    /// Row `m` of the matrix.
    #[inline]
    #[must_use]
    pub fn row(&self, m: usize) -> &[f64] {
        let start = m * self.num_bins;
        &self.data[start..start + self.num_bins]
    }

    /// Iterates over the rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.num_bins)
    }

    /// Forward projection: `out[m] = Σ_b R[m][b] * spectrum[b]`.
    ///
    /// Callers are responsible for passing slices of the right length.
    pub fn forward_project(&self, spectrum: &[f64], out: &mut [f64]) {
        debug_assert_eq!(spectrum.len(), self.num_bins);
        debug_assert_eq!(out.len(), self.num_measurements);
        for (estimate, row) in out.iter_mut().zip(self.rows()) {
            *estimate = row.iter().zip(spectrum).map(|(r, s)| r * s).sum();
        }
    }

    /// Backprojection through the transpose: `out[b] = Σ_m R[m][b] * values[m]`.
    pub fn back_project(&self, values: &[f64], out: &mut [f64]) {
        debug_assert_eq!(values.len(), self.num_measurements);
        debug_assert_eq!(out.len(), self.num_bins);
        for (b, correction) in out.iter_mut().enumerate() {
            *correction = values
                .iter()
                .enumerate()
                .map(|(m, v)| self.transposed(b, m) * v)
                .sum();
        }
    }

    /// Column sums of the matrix (the per-bin sensitivity).
    #[must_use]
    pub fn normalize(&self) -> NormalizedResponse {
        let mut sums = vec![0.0; self.num_bins];
        for row in self.rows() {
            for (sum, value) in sums.iter_mut().zip(row) {
                *sum += value;
            }
        }
        NormalizedResponse(sums)
    }

    /// Returns the matrix as nested rows.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }
}

/// Column sums of a [`ResponseMatrix`], the MLEM normalization denominator.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse(Vec<f64>);

impl NormalizedResponse {
    /// Per-bin sensitivities.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of bins.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no bins.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Computes the normalized response of nested rows.
///
/// Entry `b` is the sum over measurements of `response[m][b]`.
///
/// # Errors
/// [`Error::Dimension`] if the matrix is empty or jagged, plus the
/// validation errors of [`ResponseMatrix::from_rows`].
pub fn normalize(response: &[Vec<f64>]) -> Result<NormalizedResponse> {
    Ok(ResponseMatrix::from_rows(response.to_vec())?.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> ResponseMatrix {
        ResponseMatrix::from_rows(vec![vec![1.0, 2.0, 0.5], vec![0.0, 3.0, 1.5]]).unwrap()
    }

    #[test]
    fn test_shape_and_access() {
        let r = sample();
        assert_eq!(r.num_measurements(), 2);
        assert_eq!(r.num_bins(), 3);
        assert_relative_eq!(r.get(1, 2), 1.5);
        assert_relative_eq!(r.transposed(2, 1), 1.5);
        assert_eq!(r.row(0), &[1.0, 2.0, 0.5]);
        assert_eq!(r.to_rows(), vec![vec![1.0, 2.0, 0.5], vec![0.0, 3.0, 1.5]]);
    }

    #[test]
    fn test_normalize_is_column_sum() {
        let n = sample().normalize();
        assert_eq!(n.len(), 3);
        assert_relative_eq!(n.as_slice()[0], 1.0);
        assert_relative_eq!(n.as_slice()[1], 5.0);
        assert_relative_eq!(n.as_slice()[2], 2.0);
    }

    #[test]
    fn test_projections() {
        let r = sample();
        let mut estimate = vec![0.0; 2];
        r.forward_project(&[1.0, 1.0, 2.0], &mut estimate);
        assert_relative_eq!(estimate[0], 4.0);
        assert_relative_eq!(estimate[1], 6.0);

        let mut correction = vec![0.0; 3];
        r.back_project(&[1.0, 2.0], &mut correction);
        assert_relative_eq!(correction[0], 1.0);
        assert_relative_eq!(correction[1], 8.0);
        assert_relative_eq!(correction[2], 3.5);
    }

    #[test]
    fn test_jagged_rows_rejected() {
        let err = ResponseMatrix::from_rows(vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, Error::Dimension { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            ResponseMatrix::from_rows(vec![]),
            Err(Error::Dimension { .. })
        ));
        assert!(matches!(
            normalize(&[vec![]]),
            Err(Error::Dimension { .. })
        ));
    }

    #[test]
    fn test_zero_column_rejected() {
        let err = ResponseMatrix::from_rows(vec![vec![1.0, 0.0], vec![2.0, 0.0]]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_negative_entry_rejected() {
        let err = ResponseMatrix::from_rows(vec![vec![1.0, -0.1]]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
