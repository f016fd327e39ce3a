//! Linear vs. Hermite densification comparison.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::densify::{densify, DebugConfig, DensifyOptions, InterpolationMethod};
use crate::error::{Result, TractError};
use crate::metrics::{MetricsEngine, MetricsSummary};
use crate::streamline::{total_points, Streamline};

/// Relative curvature change (%) above which the methods differ materially.
pub const CURVATURE_THRESHOLD_PCT: f64 = 10.0;
/// Relative length change (%) above which the methods differ materially.
pub const LENGTH_THRESHOLD_PCT: f64 = 5.0;
/// Streamlines for which the point-by-point distance is reported.
const POINT_DIFFERENCE_STREAMLINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    /// Hermite preserves noticeably more curvature.
    PreferHermite,
    /// Hermite differs materially but with less curvature; check it.
    VerifyHermite,
    /// Both methods give similar results.
    Either,
}

impl Recommendation {
    /// Recommendation from the Hermite-vs-linear differences (%).
    pub fn from_differences(curvature_pct: f64, length_pct: f64) -> Self {
        if curvature_pct.abs() > CURVATURE_THRESHOLD_PCT || length_pct.abs() > LENGTH_THRESHOLD_PCT {
            if curvature_pct > 0.0 {
                Self::PreferHermite
            } else {
                Self::VerifyHermite
            }
        } else {
            Self::Either
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::PreferHermite => "Hermite interpolation better preserves curvature; use Hermite interpolation",
            Self::VerifyHermite => "Hermite interpolation yields less curvature than linear; verify the Hermite results",
            Self::Either => "Both methods produce similar results; either is suitable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Step in units of `voxel_size`.
    pub step_size: f64,
    /// Voxel size (mm) the step is scaled by.
    pub voxel_size: f64,
    /// Only the first N streamlines are compared.
    pub max_streamlines: Option<usize>,
    pub jobs: usize,
    pub debug: DebugConfig,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            step_size: 0.5,
            voxel_size: 1.0,
            max_streamlines: None,
            jobs: 0,
            debug: DebugConfig::default(),
        }
    }
}

/// Outcome of densifying one set of streamlines with one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: InterpolationMethod,
    pub processed: usize,
    pub failed: usize,
    pub total_points: usize,
    pub summary: MetricsSummary,
}

/// Side-by-side comparison of linear and Hermite densification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodComparison {
    pub step_size_mm: f64,
    pub voxel_size: f64,
    pub streamline_count: usize,
    pub linear: MethodResult,
    pub hermite: MethodResult,
    pub point_count_diff_pct: f64,
    pub mean_curvature_diff_pct: f64,
    pub max_curvature_diff_pct: f64,
    pub mean_length_diff_pct: f64,
    pub total_length_diff_pct: f64,
    pub mean_torsion_diff_pct: f64,
    /// Mean distance between corresponding points, first streamlines only.
    pub mean_point_differences: Vec<f64>,
    pub recommendation: Recommendation,
}

/// `(value - baseline) / baseline` in percent; 0 for a non-positive baseline.
pub fn relative_difference_pct(baseline: f64, value: f64) -> f64 {
    if baseline > 0.0 {
        (value - baseline) / baseline * 100.0
    } else {
        0.0
    }
}

/// Densify `streamlines` (in mm) with both methods and compare their metrics.
pub fn compare_methods(streamlines: &[Streamline], config: &CompareConfig) -> Result<MethodComparison> {
    if !config.voxel_size.is_finite() || config.voxel_size <= 0.0 {
        return Err(TractError::invalid_configuration(format!(
            "voxel size must be positive and finite, got {}",
            config.voxel_size
        )));
    }
    let streamlines = match config.max_streamlines {
        Some(n) if n < streamlines.len() => {
            tracing::info!("Limiting comparison to {} of {} streamlines", n, streamlines.len());
            &streamlines[..n]
        }
        _ => streamlines,
    };

    let step_mm = config.step_size * config.voxel_size;
    tracing::info!(
        "Comparing interpolation on {} streamlines, step {:.3} mm (voxel size {:.3} mm)",
        streamlines.len(),
        step_mm,
        config.voxel_size
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()
        .map_err(|e| TractError::invalid_configuration(format!("failed to build thread pool: {}", e)))?;

    let run = |method: InterpolationMethod| -> Result<(Vec<Streamline>, usize)> {
        let options = DensifyOptions::new(step_mm, method)?;
        let results: Vec<Option<Streamline>> = pool.install(|| {
            streamlines
                .par_iter()
                .enumerate()
                .map(|(position, s)| {
                    let options = options.with_trace(config.debug.should_trace(position));
                    densify(s, &options)
                        .map_err(|e| tracing::warn!("Error processing streamline {}: {}", s.index, e))
                        .ok()
                })
                .collect()
        });
        let failed = results.iter().filter(|r| r.is_none()).count();
        let processed: Vec<Streamline> = results.into_iter().flatten().collect();
        tracing::info!(
            "Processed {}/{} streamlines with {} interpolation",
            processed.len(),
            streamlines.len(),
            method
        );
        Ok((processed, failed))
    };

    let (linear, linear_failed) = run(InterpolationMethod::Linear)?;
    let (hermite, hermite_failed) = run(InterpolationMethod::Hermite)?;
    if linear.is_empty() || hermite.is_empty() {
        return Err(TractError::NoStreamlines);
    }

    let engine = MetricsEngine::new();
    let linear_result = MethodResult {
        method: InterpolationMethod::Linear,
        processed: linear.len(),
        failed: linear_failed,
        total_points: total_points(&linear),
        summary: engine.compute(&linear).summary,
    };
    let hermite_result = MethodResult {
        method: InterpolationMethod::Hermite,
        processed: hermite.len(),
        failed: hermite_failed,
        total_points: total_points(&hermite),
        summary: engine.compute(&hermite).summary,
    };

    let mean_point_differences = linear
        .iter()
        .zip(&hermite)
        .take(POINT_DIFFERENCE_STREAMLINES)
        .map(|(l, h)| mean_point_difference(l, h))
        .collect();

    let (l, h) = (&linear_result.summary, &hermite_result.summary);
    let mean_curvature_diff_pct = relative_difference_pct(l.mean_curvature, h.mean_curvature);
    let mean_length_diff_pct = relative_difference_pct(l.mean_length, h.mean_length);

    Ok(MethodComparison {
        step_size_mm: step_mm,
        voxel_size: config.voxel_size,
        streamline_count: streamlines.len(),
        point_count_diff_pct: relative_difference_pct(
            linear_result.total_points as f64,
            hermite_result.total_points as f64,
        ),
        mean_curvature_diff_pct,
        max_curvature_diff_pct: relative_difference_pct(l.max_curvature, h.max_curvature),
        mean_length_diff_pct,
        total_length_diff_pct: relative_difference_pct(l.total_length, h.total_length),
        mean_torsion_diff_pct: relative_difference_pct(l.mean_torsion, h.mean_torsion),
        mean_point_differences,
        recommendation: Recommendation::from_differences(mean_curvature_diff_pct, mean_length_diff_pct),
        linear: linear_result,
        hermite: hermite_result,
    })
}

/// Mean distance between points with the same position in both streamlines,
/// over the shorter of the two.
pub fn mean_point_difference(a: &Streamline, b: &Streamline) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = a.points.iter().zip(&b.points).map(|(p, q)| (p - q).norm()).sum();
    sum / n as f64
}

impl MethodComparison {
    /// Log the comparison at info level.
    pub fn log_summary(&self) {
        let (l, h) = (&self.linear, &self.hermite);
        tracing::info!(
            "Total points - Linear: {}, Hermite: {} ({:+.2}%)",
            l.total_points,
            h.total_points,
            self.point_count_diff_pct
        );
        let rows = [
            ("Mean curvature", l.summary.mean_curvature, h.summary.mean_curvature, self.mean_curvature_diff_pct),
            ("Max curvature", l.summary.max_curvature, h.summary.max_curvature, self.max_curvature_diff_pct),
            ("Mean length", l.summary.mean_length, h.summary.mean_length, self.mean_length_diff_pct),
            ("Total length", l.summary.total_length, h.summary.total_length, self.total_length_diff_pct),
            ("Mean torsion", l.summary.mean_torsion, h.summary.mean_torsion, self.mean_torsion_diff_pct),
        ];
        for (name, linear, hermite, pct) in rows {
            tracing::info!(
                "{} - Linear: {:.6}, Hermite: {:.6}, Difference: {:.6} ({:+.2}%)",
                name,
                linear,
                hermite,
                hermite - linear,
                pct
            );
        }
        for (i, diff) in self.mean_point_differences.iter().enumerate() {
            tracing::info!("Mean point difference for streamline {}: {:.6}", i + 1, diff);
        }
        tracing::info!("Recommendation: {}", self.recommendation.describe());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trakt_core::Point3;

    #[test]
    fn test_recommendation_thresholds() {
        assert_eq!(Recommendation::from_differences(12.0, 0.0), Recommendation::PreferHermite);
        assert_eq!(Recommendation::from_differences(-12.0, 0.0), Recommendation::VerifyHermite);
        assert_eq!(Recommendation::from_differences(2.0, 6.0), Recommendation::PreferHermite);
        assert_eq!(Recommendation::from_differences(-2.0, -6.0), Recommendation::VerifyHermite);
        assert_eq!(Recommendation::from_differences(9.0, 4.0), Recommendation::Either);
    }

    #[test]
    fn test_relative_difference() {
        assert_eq!(relative_difference_pct(2.0, 3.0), 50.0);
        assert_eq!(relative_difference_pct(0.0, 3.0), 0.0);
    }

    #[test]
    fn test_mean_point_difference() {
        let a = Streamline::new(0, vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        let b = Streamline::new(0, vec![Point3::new(0.0, 2.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::origin()]);
        assert_eq!(mean_point_difference(&a, &b), 1.0);
    }

    #[test]
    fn test_compare_straight_lines_are_equivalent() {
        let streamlines: Vec<Streamline> = (0..4)
            .map(|i| {
                let points = (0..5).map(|k| Point3::new(k as f64 * 2.0, i as f64, 0.0)).collect();
                Streamline::new(i, points)
            })
            .collect();
        let config = CompareConfig {
            max_streamlines: Some(3),
            jobs: 1,
            ..CompareConfig::default()
        };

        let comparison = compare_methods(&streamlines, &config).unwrap();
        assert_eq!(comparison.streamline_count, 3);
        assert_eq!(comparison.linear.total_points, comparison.hermite.total_points);
        assert!(comparison.mean_length_diff_pct.abs() < 1e-9);
        assert!(comparison.mean_point_differences.iter().all(|d| *d < 1e-9));
        assert_eq!(comparison.recommendation, Recommendation::Either);
    }

    #[test]
    fn test_compare_curved_streamline() {
        let points: Vec<Point3> = (0..12)
            .map(|k| {
                let a = k as f64 * 0.5;
                Point3::new(10.0 * a.cos(), 10.0 * a.sin(), 0.0)
            })
            .collect();
        let comparison = compare_methods(&[Streamline::new(0, points)], &CompareConfig::default()).unwrap();
        // Linear chords are shorter than the spline through the same points
        assert!(comparison.hermite.summary.total_length > comparison.linear.summary.total_length);
        assert_eq!(comparison.linear.total_points, comparison.hermite.total_points);
        assert!(comparison.mean_point_differences[0] > 0.0);
    }
}
