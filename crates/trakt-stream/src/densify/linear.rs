use trakt_core::Point3;

/// Points along straight segments; `steps[s]` sub-steps for segment `s`.
pub(super) fn interpolate(points: &[Point3], steps: &[usize], total: usize) -> Vec<Point3> {
    let mut out = Vec::with_capacity(total);
    for (w, &n) in points.windows(2).zip(steps) {
        let (p0, p1) = (w[0], w[1]);
        out.push(p0);
        for k in 1..n {
            let t = k as f64 / n as f64;
            out.push(p0 + (p1 - p0) * t);
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}
