//! Checkpoint schedules over iteration count and regularization strength.
#![allow(clippy::cast_precision_loss)]

use nnspec_core::{Error, Result, UnfoldingSettings};

/// Strictly increasing iteration counts at which a trajectory is sampled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IterationSchedule {
    checkpoints: Vec<usize>,
}

impl IterationSchedule {
    /// `min, min + increment, ...` up to and including `max` when it lands
    /// on the grid.
    ///
    /// # Errors
    /// [`Error::Configuration`] if `increment` is zero or `min` is outside
    /// `1..=max`.
    pub fn linear(min: usize, max: usize, increment: usize) -> Result<Self> {
        if increment == 0 {
            return Err(Error::configuration("iteration_increment must be positive"));
        }
        if min == 0 || min > max {
            return Err(Error::configuration(format!(
                "iteration range must satisfy 1 <= min <= max, got {min}..{max}"
            )));
        }
        Ok(Self {
            checkpoints: (min..=max).step_by(increment).collect(),
        })
    }

    /// Schedule from the `min_iterations`, `max_schedule_iterations` and
    /// `iteration_increment` settings.
    ///
    /// # Errors
    /// See [`Self::linear`].
    pub fn from_settings(settings: &UnfoldingSettings) -> Result<Self> {
        Self::linear(
            settings.min_iterations,
            settings.max_schedule_iterations,
            settings.iteration_increment,
        )
    }

    /// Schedule from explicit checkpoints.
    ///
    /// # Errors
    /// - [`Error::InsufficientData`] if `checkpoints` is empty.
    /// - [`Error::Configuration`] if a checkpoint is zero or the list is not
    ///   strictly increasing.
    pub fn from_checkpoints(checkpoints: Vec<usize>) -> Result<Self> {
        if checkpoints.is_empty() {
            return Err(Error::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if checkpoints[0] == 0 || checkpoints.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::configuration(
                "checkpoints must be positive and strictly increasing",
            ));
        }
        Ok(Self { checkpoints })
    }

    /// Checkpoint iteration counts.
    #[must_use]
    pub fn checkpoints(&self) -> &[usize] {
        &self.checkpoints
    }

    /// Number of checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Always false for a constructed schedule.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Steps to execute before each checkpoint: the first checkpoint itself,
    /// then the gap since the previous one.
    pub fn increments(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(0)
            .chain(self.checkpoints.iter().copied())
            .zip(&self.checkpoints)
            .map(|(previous, &next)| next - previous)
    }
}

/// Beta values for a MAP sweep.
///
/// Each whole decade from `min_beta` is split into ten linearly spaced values
/// (`b, 2b, ..., 10b`); a decade's upper bound is the next decade's lower
/// bound and appears once. When `max_beta / min_beta` spans less than one
/// decade, ten linearly spaced values cover `[min_beta, max_beta]`.
///
/// # Errors
/// [`Error::Configuration`] unless `0 < min_beta <= max_beta` and both are
/// finite.
pub fn beta_values(min_beta: f64, max_beta: f64) -> Result<Vec<f64>> {
    if !(min_beta.is_finite() && max_beta.is_finite() && min_beta > 0.0 && min_beta <= max_beta) {
        return Err(Error::configuration(format!(
            "beta range must satisfy 0 < min <= max, got {min_beta}..{max_beta}"
        )));
    }
    if min_beta == max_beta {
        return Ok(vec![min_beta]);
    }

    // Rounding guard so that e.g. 1e-3..1e1 counts four decades.
    let decades = ((max_beta / min_beta).log10() + 1e-9).floor() as usize;
    if decades == 0 {
        return Ok(linspace(min_beta, max_beta, 10));
    }

    let mut betas = Vec::with_capacity(decades * 9 + 1);
    betas.push(min_beta);
    let mut lower = min_beta;
    for _ in 0..decades {
        betas.extend((2..=10).map(|k| lower * k as f64));
        lower *= 10.0;
    }
    Ok(betas)
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    let step = (end - start) / (count - 1) as f64;
    (0..count)
        .map(|i| if i + 1 == count { end } else { start + step * i as f64 })
        .collect()
}
