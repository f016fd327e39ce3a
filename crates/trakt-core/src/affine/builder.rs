//! Construction of a resampling grid that preserves a physical center.
//!
//! The new grid keeps the orientation and shear of the old grid and only
//! rescales its axes; the translation is solved so that the geometric center
//! of the new grid lands on a chosen physical point.

use serde::{Deserialize, Serialize};

use super::Affine;
use crate::error::{ResampleError, Result};
use crate::geometry::{grid_center, Linear3, Point3, Shape3, Vector3};

/// Target voxel size, either one value for all axes or one per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VoxelSize {
    Isotropic(f64),
    Anisotropic([f64; 3]),
}

impl VoxelSize {
    /// Per-axis voxel sizes.
    pub fn to_array(self) -> [f64; 3] {
        match self {
            VoxelSize::Isotropic(v) => [v; 3],
            VoxelSize::Anisotropic(v) => v,
        }
    }

    /// Mean voxel size over the three axes.
    pub fn mean(self) -> f64 {
        let v = self.to_array();
        (v[0] + v[1] + v[2]) / 3.0
    }

    fn validate(self) -> Result<[f64; 3]> {
        let sizes = self.to_array();
        if sizes.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ResampleError::invalid_configuration(format!(
                "voxel size must be positive and finite, got {:?}",
                sizes
            )));
        }
        Ok(sizes)
    }
}

impl From<f64> for VoxelSize {
    fn from(value: f64) -> Self {
        VoxelSize::Isotropic(value)
    }
}

impl From<[f64; 3]> for VoxelSize {
    fn from(value: [f64; 3]) -> Self {
        VoxelSize::Anisotropic(value)
    }
}

/// Convert a dynamically sized shape (CLI, file headers) into a 3-D shape.
///
/// Fails unless the slice has exactly three non-zero extents.
pub fn shape3(dims: &[usize]) -> Result<Shape3> {
    let shape: Shape3 = dims.try_into().map_err(|_| {
        ResampleError::invalid_configuration(format!(
            "shape must have exactly 3 extents, got {}",
            dims.len()
        ))
    })?;
    if shape.iter().any(|&d| d == 0) {
        return Err(ResampleError::invalid_configuration(format!(
            "shape extents must be non-zero, got {:?}",
            shape
        )));
    }
    Ok(shape)
}

/// Build the affine of a new sampling grid.
///
/// # Arguments
/// * `old_affine` - Voxel-to-physical affine of the existing grid
/// * `old_shape` - Extent of the existing grid
/// * `new_voxel_size` - Desired voxel size (isotropic or per axis)
/// * `new_shape` - Extent of the new grid
/// * `patch_center_mm` - Physical point the new grid is centered on; defaults
///   to the physical center of the old grid
///
/// # Returns
/// An affine whose linear part is `old_linear * diag(new / old voxel size)` and
/// which maps the new grid's center index `(new_shape - 1) / 2` onto the
/// chosen physical center.
pub fn build_new_affine(
    old_affine: &Affine,
    old_shape: Shape3,
    new_voxel_size: impl Into<VoxelSize>,
    new_shape: Shape3,
    patch_center_mm: Option<Point3>,
) -> Result<Affine> {
    shape3(&old_shape)?;
    shape3(&new_shape)?;
    let desired = new_voxel_size.into().validate()?;

    let old_linear = old_affine.linear();
    let old_scales = old_affine.voxel_sizes();
    if old_scales.iter().any(|s| *s < 1e-12) {
        return Err(ResampleError::degenerate_affine(format!(
            "old affine has a zero-length axis, column norms {:?}",
            old_scales
        )));
    }

    let scale_factor = Vector3::new(
        desired[0] / old_scales[0],
        desired[1] / old_scales[1],
        desired[2] / old_scales[2],
    );
    let new_linear: Linear3 = old_linear * Linear3::from_diagonal(&scale_factor);

    let center_mm = match patch_center_mm {
        Some(center) => center,
        None => old_affine.transform_point(&grid_center(old_shape)),
    };

    let new_center_vox = grid_center(new_shape);
    let translation = center_mm.coords - new_linear * new_center_vox.coords;

    tracing::debug!(
        "New grid: voxel size {:?}, shape {:?}, center {:?} mm",
        desired,
        new_shape,
        center_mm
    );

    Ok(Affine::from_parts(new_linear, translation))
}
