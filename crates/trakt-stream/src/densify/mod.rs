//! Streamline densification.
//!
//! Inserts points along each segment so that consecutive points are at most
//! `step_size` apart, either on the straight segment or on a cubic Hermite
//! spline through the original points.

mod hermite;
mod linear;
pub mod tangent;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trakt_core::Point3;

use crate::error::{Result, TractError};
use crate::streamline::Streamline;

/// Upper bound on sub-steps for a single segment.
pub const MAX_SEGMENT_SUBDIVISIONS: usize = 1_000_000;

/// Curve used between original points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationMethod {
    Linear,
    #[default]
    Hermite,
}

impl FromStr for InterpolationMethod {
    type Err = TractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "hermite" => Ok(Self::Hermite),
            other => Err(TractError::invalid_configuration(format!(
                "unknown interpolation method '{}', expected 'linear' or 'hermite'",
                other
            ))),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Hermite => write!(f, "hermite"),
        }
    }
}

/// Densification options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensifyOptions {
    /// Maximum spacing between output points, in the streamline's units.
    pub step_size: f64,
    /// Curve between original points.
    pub method: InterpolationMethod,
    /// Emit tangents and basis weights at debug level.
    pub trace: bool,
}

impl Default for DensifyOptions {
    fn default() -> Self {
        Self {
            step_size: 0.5,
            method: InterpolationMethod::Hermite,
            trace: false,
        }
    }
}

impl DensifyOptions {
    pub fn new(step_size: f64, method: InterpolationMethod) -> Result<Self> {
        let options = Self {
            step_size,
            method,
            trace: false,
        };
        options.validate()?;
        Ok(options)
    }

    /// Options for a physical step (mm) on a grid with the given voxel size
    /// (mm): the step in voxels is `step_mm / voxel_size_mm`.
    pub fn from_physical_step(step_mm: f64, voxel_size_mm: f64, method: InterpolationMethod) -> Result<Self> {
        if !voxel_size_mm.is_finite() || voxel_size_mm <= 0.0 {
            return Err(TractError::invalid_configuration(format!(
                "voxel size must be positive and finite, got {}",
                voxel_size_mm
            )));
        }
        Self::new(step_mm / voxel_size_mm, method)
    }

    pub fn with_method(mut self, method: InterpolationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(TractError::invalid_configuration(format!(
                "step size must be positive and finite, got {}",
                self.step_size
            )));
        }
        Ok(())
    }
}

/// Tangent tracing limits for a run.
///
/// Only the first `max_traced` streamlines of a run are traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfig {
    pub max_traced: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { max_traced: 5 }
    }
}

impl DebugConfig {
    pub fn disabled() -> Self {
        Self { max_traced: 0 }
    }

    pub fn with_max_traced(mut self, max_traced: usize) -> Self {
        self.max_traced = max_traced;
        self
    }

    /// Whether the streamline at `position` in the run is traced.
    pub fn should_trace(&self, position: usize) -> bool {
        position < self.max_traced
    }
}

/// Densify one streamline.
///
/// Streamlines with fewer than two points are returned unchanged. Every
/// original point is kept; segment `p0 -> p1` of length `L` gets
/// `n = max(1, ceil(L / step))` sub-steps at `t = k / n`.
pub fn densify(streamline: &Streamline, options: &DensifyOptions) -> Result<Streamline> {
    options.validate()?;
    let points = &streamline.points;
    if points.len() < 2 {
        return Ok(streamline.clone());
    }

    if let Some(point) = points.iter().position(|p| !p.iter().all(|c| c.is_finite())) {
        return Err(TractError::NonFinitePoint {
            index: streamline.index,
            point,
        });
    }

    let steps = segment_steps(streamline.index, points, options.step_size)?;
    let total: usize = steps.iter().sum::<usize>() + 1;

    let dense = match options.method {
        InterpolationMethod::Linear => linear::interpolate(points, &steps, total),
        InterpolationMethod::Hermite => hermite::interpolate(streamline.index, points, &steps, total, options.trace),
    };
    debug_assert_eq!(dense.len(), total);

    Ok(streamline.with_points(dense))
}

/// Sub-step count for each segment.
fn segment_steps(index: usize, points: &[Point3], step_size: f64) -> Result<Vec<usize>> {
    points
        .windows(2)
        .enumerate()
        .map(|(segment, w)| {
            let steps = ((w[1] - w[0]).norm() / step_size).ceil().max(1.0);
            if steps > MAX_SEGMENT_SUBDIVISIONS as f64 {
                return Err(TractError::TooManyPoints {
                    index,
                    segment,
                    steps,
                    limit: MAX_SEGMENT_SUBDIVISIONS,
                });
            }
            Ok(steps as usize)
        })
        .collect()
}
