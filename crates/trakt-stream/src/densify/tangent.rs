//! Unit tangents for Hermite interpolation.

use trakt_core::{Point3, Vector3};

const EPSILON: f64 = 1e-12;

/// Unit tangent at every point.
///
/// Central difference at interior points, one-sided difference at the ends.
/// Where the central difference vanishes (the curve doubles back) the forward
/// and then backward one-sided directions are used. Coincident points get a
/// zero tangent.
pub fn unit_tangents(points: &[Point3]) -> Vec<Vector3> {
    let n = points.len();
    if n < 2 {
        return vec![Vector3::zeros(); n];
    }
    (0..n)
        .map(|i| {
            let forward = (i + 1 < n).then(|| points[i + 1] - points[i]);
            let backward = (i > 0).then(|| points[i] - points[i - 1]);
            let central = (i > 0 && i + 1 < n).then(|| points[i + 1] - points[i - 1]);

            [central, forward, backward]
                .into_iter()
                .flatten()
                .find(|d| d.norm() > EPSILON)
                .map(|d| d.normalize())
                .unwrap_or_else(Vector3::zeros)
        })
        .collect()
}
