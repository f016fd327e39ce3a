//! Affine type mapping voxel indices to physical coordinates.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::{ResampleError, Result};
use crate::geometry::{Homogeneous, Linear3, Point3, Vector3};

/// Homogeneous 4×4 transform from voxel indices `[i, j, k, 1]` to physical
/// coordinates `[x, y, z, 1]` in millimetres.
///
/// The upper-left 3×3 block holds rotation, scale and shear; its column norms
/// are the voxel sizes. The last column holds the translation.
///
/// This is a thin wrapper around nalgebra's `Matrix4` without setters: once
/// built, an affine is never modified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(Homogeneous);

impl Affine {
    /// Create an affine from a full homogeneous matrix.
    ///
    /// The bottom row must be `[0, 0, 0, 1]` and every entry finite.
    pub fn from_matrix(matrix: Homogeneous) -> Result<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(ResampleError::degenerate_affine("matrix contains non-finite entries"));
        }
        let bottom = matrix.fixed_view::<1, 4>(3, 0);
        let expected = [0.0, 0.0, 0.0, 1.0];
        if (0..4).any(|c| (bottom[(0, c)] - expected[c]).abs() > 1e-9) {
            return Err(ResampleError::degenerate_affine(format!(
                "bottom row must be [0, 0, 0, 1], got {:?}",
                [bottom[(0, 0)], bottom[(0, 1)], bottom[(0, 2)], bottom[(0, 3)]]
            )));
        }
        Ok(Self(matrix))
    }

    /// Create an affine from row-major rows, as stored in NIfTI srows or
    /// TrackVis headers.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Result<Self> {
        let mut m = Matrix4::zeros();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                m[(r, c)] = *value;
            }
        }
        Self::from_matrix(m)
    }

    /// Create an affine from its linear part and translation.
    pub fn from_parts(linear: Linear3, translation: Vector3) -> Self {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        Self(m)
    }

    /// Identity affine (unit voxels, origin at index zero).
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Axis-aligned affine with the given voxel sizes and no translation.
    pub fn scaling(voxel_sizes: [f64; 3]) -> Self {
        Self::from_parts(
            Linear3::from_diagonal(&Vector3::from(voxel_sizes)),
            Vector3::zeros(),
        )
    }

    /// The underlying homogeneous matrix.
    pub fn matrix(&self) -> &Homogeneous {
        &self.0
    }

    /// The 3×3 linear part (rotation, scale, shear).
    pub fn linear(&self) -> Linear3 {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// The translation column.
    pub fn translation(&self) -> Vector3 {
        self.0.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Voxel sizes: the column norms of the linear part.
    pub fn voxel_sizes(&self) -> [f64; 3] {
        let linear = self.linear();
        [
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        ]
    }

    /// Row-major rows of the matrix.
    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.0[(r, c)];
            }
        }
        rows
    }

    /// Map a continuous voxel index to a physical point.
    pub fn transform_point(&self, index: &Point3) -> Point3 {
        self.0.transform_point(index)
    }

    /// Compose two affines: the result applies `other` first, then `self`.
    pub fn compose(&self, other: &Affine) -> Affine {
        Affine(self.0 * other.0)
    }

    /// Try to invert the affine.
    pub fn try_inverse(&self) -> Option<Affine> {
        self.0.try_inverse().map(Affine)
    }

    /// Invert the affine, failing on singular linear parts.
    pub fn inverse(&self) -> Result<Affine> {
        self.try_inverse()
            .ok_or_else(|| ResampleError::degenerate_affine("affine is not invertible"))
    }

    /// Anatomical axis codes (`R/L`, `A/P`, `S/I`) of the voxel axes.
    ///
    /// Each voxel axis is labelled by the physical axis its direction is
    /// closest to, with the sign choosing the end it points towards.
    pub fn axis_codes(&self) -> [char; 3] {
        const POSITIVE: [char; 3] = ['R', 'A', 'S'];
        const NEGATIVE: [char; 3] = ['L', 'P', 'I'];
        let linear = self.linear();
        let mut codes = ['?'; 3];
        for (axis, code) in codes.iter_mut().enumerate() {
            let column = linear.column(axis);
            let (row, value) = column
                .iter()
                .enumerate()
                .fold((0, 0.0_f64), |best, (r, v)| if v.abs() > best.1.abs() { (r, *v) } else { best });
            if value != 0.0 {
                *code = if value > 0.0 { POSITIVE[row] } else { NEGATIVE[row] };
            }
        }
        codes
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}
