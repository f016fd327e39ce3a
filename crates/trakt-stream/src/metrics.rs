//! Discrete curvature, torsion and length of streamlines.
//!
//! Derivatives are finite differences over consecutive points:
//!
//! - `r'   = (p[i+1] - p[i-1]) / 2`
//! - `r''  = p[i+1] - 2 p[i] + p[i-1]`
//! - `r''' = p[i+2] - 3 p[i+1] + 3 p[i] - p[i-1]`
//!
//! Curvature `|r' x r''| / |r'|^3` is evaluated at interior points, torsion
//! `(r' x r'') . r''' / |r' x r''|^2` for `i = 1..n-3`. Degenerate points
//! yield 0.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use trakt_core::{Point3, Vector3};

use crate::streamline::Streamline;

const DEFAULT_EPSILON: f64 = 1e-12;

/// Metrics of one streamline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamlineMetrics {
    pub index: usize,
    pub curvature: Vec<f64>,
    pub torsion: Vec<f64>,
    pub length: f64,
}

/// Aggregate metrics over a set of streamlines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub streamline_count: usize,
    pub point_count: usize,
    /// Mean curvature pooled over every evaluated point.
    pub mean_curvature: f64,
    pub max_curvature: f64,
    pub mean_length: f64,
    pub max_length: f64,
    pub total_length: f64,
    /// Mean absolute torsion pooled over every evaluated point.
    pub mean_torsion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub per_streamline: Vec<StreamlineMetrics>,
    pub summary: MetricsSummary,
}

/// Computes [`StreamlineMetrics`] in parallel and summarises them.
#[derive(Debug, Clone, Copy)]
pub struct MetricsEngine {
    epsilon: f64,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Threshold below which `|r'|` and `|r' x r''|^2` count as degenerate.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Metrics for every streamline, in input order, plus their summary.
    pub fn compute(&self, streamlines: &[Streamline]) -> MetricsReport {
        let per_streamline: Vec<StreamlineMetrics> =
            streamlines.par_iter().map(|s| self.streamline_metrics(s)).collect();
        let point_count = streamlines.iter().map(Streamline::len).sum();
        let summary = summarize(&per_streamline, point_count);
        MetricsReport {
            per_streamline,
            summary,
        }
    }

    pub fn streamline_metrics(&self, streamline: &Streamline) -> StreamlineMetrics {
        StreamlineMetrics {
            index: streamline.index,
            curvature: self.curvature(&streamline.points),
            torsion: self.torsion(&streamline.points),
            length: streamline.length(),
        }
    }

    /// Curvature at points `1..n-1`; empty below three points.
    pub fn curvature(&self, points: &[Point3]) -> Vec<f64> {
        if points.len() < 3 {
            return Vec::new();
        }
        (1..points.len() - 1)
            .map(|i| {
                let (d1, d2) = derivatives(points, i);
                let speed = d1.norm();
                if speed < self.epsilon {
                    return 0.0;
                }
                finite_or_zero(d1.cross(&d2).norm() / speed.powi(3))
            })
            .collect()
    }

    /// Torsion at points `1..n-2`; empty below four points.
    pub fn torsion(&self, points: &[Point3]) -> Vec<f64> {
        if points.len() < 4 {
            return Vec::new();
        }
        (1..points.len() - 2)
            .map(|i| {
                let (d1, d2) = derivatives(points, i);
                let d3 = points[i + 2].coords - points[i + 1].coords * 3.0 + points[i].coords * 3.0
                    - points[i - 1].coords;
                let binormal = d1.cross(&d2);
                let denom = binormal.norm_squared();
                if denom < self.epsilon {
                    return 0.0;
                }
                finite_or_zero(binormal.dot(&d3) / denom)
            })
            .collect()
    }
}

/// First and second central differences at interior point `i`.
fn derivatives(points: &[Point3], i: usize) -> (Vector3, Vector3) {
    let prev = points[i - 1].coords;
    let here = points[i].coords;
    let next = points[i + 1].coords;
    ((next - prev) / 2.0, next - here * 2.0 + prev)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Pool per-streamline metrics into a summary.
pub fn summarize(metrics: &[StreamlineMetrics], point_count: usize) -> MetricsSummary {
    let curvatures = metrics.iter().flat_map(|m| m.curvature.iter().copied());
    let (curv_sum, curv_count, curv_max) = curvatures.fold((0.0, 0usize, 0.0f64), |(s, n, m), c| (s + c, n + 1, m.max(c)));

    let (tors_sum, tors_count) = metrics
        .iter()
        .flat_map(|m| m.torsion.iter())
        .fold((0.0, 0usize), |(s, n), t| (s + t.abs(), n + 1));

    let total_length: f64 = metrics.iter().map(|m| m.length).sum();
    let max_length = metrics.iter().map(|m| m.length).fold(0.0, f64::max);

    let mean = |sum: f64, count: usize| if count > 0 { sum / count as f64 } else { 0.0 };

    MetricsSummary {
        streamline_count: metrics.len(),
        point_count,
        mean_curvature: mean(curv_sum, curv_count),
        max_curvature: curv_max,
        mean_length: mean(total_length, metrics.len()),
        max_length,
        total_length,
        mean_torsion: mean(tors_sum, tors_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn circle(radius: f64, n: usize) -> Vec<Point3> {
        (0..n)
            .map(|k| {
                let a = 2.0 * PI * k as f64 / n as f64;
                Point3::new(radius * a.cos(), radius * a.sin(), 0.0)
            })
            .collect()
    }

    #[test]
    fn test_circle_curvature_and_torsion() {
        let radius = 5.0;
        let s = Streamline::new(0, circle(radius, 360));
        let report = MetricsEngine::new().compute(&[s]);

        assert!((report.summary.mean_curvature - 1.0 / radius).abs() < 1e-3);
        assert!(report.summary.mean_torsion.abs() < 1e-9);
        assert_eq!(report.per_streamline[0].curvature.len(), 358);
        assert_eq!(report.per_streamline[0].torsion.len(), 357);
    }

    #[test]
    fn test_helix_torsion() {
        // r(t) = (a cos t, a sin t, b t): torsion b / (a^2 + b^2)
        let (a, b) = (3.0, 1.0);
        let points: Vec<Point3> = (0..400)
            .map(|k| {
                let t = k as f64 * 0.01;
                Point3::new(a * t.cos(), a * t.sin(), b * t)
            })
            .collect();
        let torsion = MetricsEngine::new().torsion(&points);
        let expected = b / (a * a + b * b);
        assert!(torsion.iter().all(|t| (t - expected).abs() < 1e-3));
    }

    #[test]
    fn test_straight_line_is_flat() {
        let points: Vec<Point3> = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let engine = MetricsEngine::new();
        assert!(engine.curvature(&points).iter().all(|&c| c == 0.0));
        assert!(engine.torsion(&points).iter().all(|&t| t == 0.0));
    }

    #[test]
    fn test_degenerate_points_give_zero() {
        let points = vec![Point3::origin(); 5];
        let engine = MetricsEngine::new();
        assert_eq!(engine.curvature(&points), vec![0.0; 3]);
        assert_eq!(engine.torsion(&points), vec![0.0; 2]);

        let short = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(engine.curvature(&short).is_empty());
        assert!(engine.torsion(&short).is_empty());
    }

    #[test]
    fn test_summary_lengths() {
        let a = Streamline::new(0, vec![Point3::origin(), Point3::new(2.0, 0.0, 0.0)]);
        let b = Streamline::new(1, vec![Point3::origin(), Point3::new(0.0, 4.0, 0.0)]);
        let report = MetricsEngine::new().compute(&[a, b]);

        assert_eq!(report.summary.streamline_count, 2);
        assert_eq!(report.summary.point_count, 4);
        assert_eq!(report.summary.total_length, 6.0);
        assert_eq!(report.summary.mean_length, 3.0);
        assert_eq!(report.summary.max_length, 4.0);
        assert_eq!(report.per_streamline[1].index, 1);
    }

    #[test]
    fn test_empty_summary() {
        let report = MetricsEngine::new().compute(&[]);
        assert_eq!(report.summary, MetricsSummary::default());
    }
}
