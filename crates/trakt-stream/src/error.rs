//! Error types for streamline processing.
//!
//! Configuration errors abort a run; per-streamline errors are recovered by
//! the batch pipeline, which logs and skips the failing streamline.

use thiserror::Error;
use trakt_core::ResampleError;

/// Main error type for streamline operations.
#[derive(Error, Debug)]
pub enum TractError {
    /// Invalid configuration (step size, shapes, options).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A streamline contains a NaN or infinite coordinate.
    #[error("Streamline {index}: point {point} is not finite")]
    NonFinitePoint { index: usize, point: usize },

    /// A segment would be split into more sub-steps than allowed.
    #[error("Streamline {index}: segment {segment} needs {steps} sub-steps (limit {limit})")]
    TooManyPoints {
        index: usize,
        segment: usize,
        steps: f64,
        limit: usize,
    },

    /// Nothing survived processing.
    #[error("No streamlines survived processing")]
    NoStreamlines,

    /// Grid or affine error from the volume side.
    #[error(transparent)]
    Core(#[from] ResampleError),
}

/// Result type for streamline operations.
pub type Result<T> = std::result::Result<T, TractError>;

impl TractError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether the error concerns a single streamline rather than the run.
    pub fn is_per_item(&self) -> bool {
        matches!(self, Self::NonFinitePoint { .. } | Self::TooManyPoints { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TractError::NonFinitePoint { index: 12, point: 3 };
        assert_eq!(err.to_string(), "Streamline 12: point 3 is not finite");
        assert!(err.is_per_item());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: TractError = ResampleError::degenerate_affine("affine is not invertible").into();
        assert!(matches!(err, TractError::Core(_)));
        assert!(!err.is_per_item());
        assert_eq!(err.to_string(), "Degenerate affine: affine is not invertible");
    }
}
