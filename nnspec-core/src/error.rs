//! Error types for nnspec-core.

use thiserror::Error;

/// Result type alias for nnspec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for unfolding operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Mismatch between expected and actual vector or matrix lengths.
    #[error("dimension mismatch: {context} has length {actual}, expected {expected}")]
    Dimension {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// An estimate or denominator reached zero (or went negative) during iteration.
    #[error("divergence at iteration {iteration}: {detail}")]
    Divergence { iteration: usize, detail: String },

    /// Invalid settings or selector.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Not enough samples for the requested calculation.
    #[error("insufficient data: need at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },
}

impl Error {
    /// Shorthand for [`Error::Dimension`].
    pub fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::Dimension {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Shorthand for [`Error::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Fails with [`Error::Dimension`] when `actual != expected`.
///
/// # Errors
/// Returns [`Error::Dimension`] on mismatch.
pub fn check_dimension(context: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::dimension(context, expected, actual))
    }
}
