use trakt_core::Point3;

use super::tangent::unit_tangents;

/// Cubic Hermite basis `(h00, h10, h01, h11)` at `t`.
pub(super) fn basis(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        2.0 * t3 - 3.0 * t2 + 1.0,
        t3 - 2.0 * t2 + t,
        -2.0 * t3 + 3.0 * t2,
        t3 - t2,
    ]
}

/// Points along the Hermite spline through `points`.
///
/// Tangents are unit directions scaled by the segment length.
pub(super) fn interpolate(index: usize, points: &[Point3], steps: &[usize], total: usize, trace: bool) -> Vec<Point3> {
    let tangents = unit_tangents(points);
    if trace {
        for (i, t) in tangents.iter().enumerate() {
            tracing::debug!("Streamline {}: tangent[{}] = ({:.4}, {:.4}, {:.4})", index, i, t.x, t.y, t.z);
        }
    }

    let mut out = Vec::with_capacity(total);
    for (segment, (w, &n)) in points.windows(2).zip(steps).enumerate() {
        let (p0, p1) = (w[0], w[1]);
        let length = (p1 - p0).norm();
        let m0 = tangents[segment] * length;
        let m1 = tangents[segment + 1] * length;

        out.push(p0);
        for k in 1..n {
            let t = k as f64 / n as f64;
            let [h00, h10, h01, h11] = basis(t);
            if trace {
                tracing::debug!(
                    "Streamline {}: segment {} t={:.3} weights h00={:.4} h10={:.4} h01={:.4} h11={:.4}",
                    index,
                    segment,
                    t,
                    h00,
                    h10,
                    h01,
                    h11
                );
            }
            out.push(Point3::from(p0.coords * h00 + m0 * h10 + p1.coords * h01 + m1 * h11));
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use trakt_core::Vector3;

    #[test]
    fn test_basis_partition() {
        for t in [0.0, 0.25, 0.5, 0.9, 1.0] {
            let [h00, _, h01, _] = basis(t);
            assert!((h00 + h01 - 1.0).abs() < 1e-12);
        }
        assert_eq!(basis(0.0), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(basis(1.0), [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_collinear_points_stay_collinear() {
        let direction = Vector3::new(1.0, 2.0, -0.5).normalize();
        let points: Vec<Point3> = [0.0, 1.5, 4.0, 4.2, 9.0]
            .iter()
            .map(|&s| Point3::new(1.0, -2.0, 3.0) + direction * s)
            .collect();
        let steps = vec![4, 6, 1, 12];
        let total = steps.iter().sum::<usize>() + 1;

        let out = interpolate(0, &points, &steps, total, false);
        assert_eq!(out.len(), total);
        for p in &out {
            let offset = p - points[0];
            let off_axis = offset - direction * offset.dot(&direction);
            assert!(off_axis.norm() < 1e-9);
        }
    }

    #[test]
    fn test_curve_passes_through_original_points() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 1.0),
        ];
        let out = interpolate(0, &points, &[3, 3], 7, true);
        assert_eq!(out[0], points[0]);
        assert_eq!(out[3], points[1]);
        assert_eq!(out[6], points[2]);
        // Bends away from the chord between original points
        let chord_mid = Point3::from((points[0].coords + points[1].coords) / 2.0);
        assert!((out[1] - chord_mid).norm() > 1e-3 || (out[2] - chord_mid).norm() > 1e-3);
    }
}
