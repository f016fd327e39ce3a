//! Interpolation kernels.
//!
//! This module provides the sampling kernels used by the compute backends:
//! trilinear and nearest neighbour, each as a scalar host routine and as a
//! batched tensor gather.

pub mod linear;
pub mod nearest;

use serde::{Deserialize, Serialize};

use crate::geometry::Shape3;

/// Tolerance (in voxels) within which a coordinate just outside the grid is
/// snapped onto the boundary instead of being treated as outside.
pub const EDGE_TOLERANCE: f64 = 1e-4;

/// Interpolation order used to sample the source volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationOrder {
    /// Order 0: nearest voxel.
    Nearest,
    /// Order 1: trilinear.
    #[default]
    Linear,
}

/// Whether a continuous coordinate lies inside the grid (within
/// [`EDGE_TOLERANCE`]).
#[inline]
pub fn inside(coord: [f64; 3], shape: Shape3) -> bool {
    coord
        .iter()
        .zip(shape.iter())
        .all(|(&c, &n)| c >= -EDGE_TOLERANCE && c <= (n - 1) as f64 + EDGE_TOLERANCE)
}
