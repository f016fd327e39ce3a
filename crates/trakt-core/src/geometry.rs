use nalgebra::{Matrix3, Matrix4, Point3 as NaPoint3, Vector3 as NaVector3};

pub type Point3 = NaPoint3<f64>;
pub type Vector3 = NaVector3<f64>;
pub type Linear3 = Matrix3<f64>;
pub type Homogeneous = Matrix4<f64>;

/// Grid extent along the three spatial axes `[i, j, k]`.
pub type Shape3 = [usize; 3];

/// Geometric center of a grid in continuous voxel indices: `(shape - 1) / 2`.
pub fn grid_center(shape: Shape3) -> Point3 {
    Point3::new(
        (shape[0] as f64 - 1.0) / 2.0,
        (shape[1] as f64 - 1.0) / 2.0,
        (shape[2] as f64 - 1.0) / 2.0,
    )
}

/// Number of voxels in a grid, `None` on overflow.
pub fn voxel_count(shape: Shape3) -> Option<usize> {
    shape[0].checked_mul(shape[1])?.checked_mul(shape[2])
}
