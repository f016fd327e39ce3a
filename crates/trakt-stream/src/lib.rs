//! Streamline transformation, densification and curve metrics.
//!
//! The streamline half of trakt: map tractography streamlines into the voxel
//! grid of a resampled volume, clip them to its field of view, densify them
//! with linear or cubic Hermite interpolation, and measure curvature,
//! torsion and length to validate the result.

pub mod compare;
pub mod densify;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod streamline;
pub mod transform;

pub use compare::{compare_methods, CompareConfig, MethodComparison, Recommendation};
pub use densify::{densify, DebugConfig, DensifyOptions, InterpolationMethod, MAX_SEGMENT_SUBDIVISIONS};
pub use error::{Result, TractError};
pub use metrics::{MetricsEngine, MetricsReport, MetricsSummary, StreamlineMetrics};
pub use pipeline::{BatchOutcome, PipelineConfig, StreamlineFailure, StreamlinePipeline};
pub use progress::{ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo, ProgressTracker};
pub use streamline::{total_points, Streamline};
pub use transform::{ClipPolicy, StreamlineTransformer};
