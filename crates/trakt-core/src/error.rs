//! Error types for grid construction and resampling.
//!
//! This module provides structured error types for the volume path,
//! separating configuration problems from backend and storage failures.

use thiserror::Error;

/// Main error type for grid construction and volume resampling.
#[derive(Error, Debug)]
pub enum ResampleError {
    /// Invalid configuration (shapes, voxel sizes, chunking, budgets).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Affine matrix cannot be used (singular, degenerate columns).
    #[error("Degenerate affine: {0}")]
    DegenerateAffine(String),

    /// Shape mismatch between a buffer and the grid it describes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Failure inside a compute backend.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Scratch file or memory map failure.
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for resampling operations.
pub type Result<T> = std::result::Result<T, ResampleError>;

impl ResampleError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a degenerate affine error.
    pub fn degenerate_affine(msg: impl Into<String>) -> Self {
        Self::DegenerateAffine(msg.into())
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ResampleError::invalid_configuration("chunk shape must be non-zero");
        assert!(matches!(err, ResampleError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ResampleError::backend("gather failed");
        assert_eq!(err.to_string(), "Backend error: gather failed");
    }

    #[test]
    fn test_shape_mismatch() {
        let err = ResampleError::ShapeMismatch {
            expected: vec![4, 4, 4],
            actual: vec![4, 4],
        };
        let err_str = err.to_string();
        assert!(err_str.contains("expected"));
        assert!(err_str.contains("got"));
    }
}
