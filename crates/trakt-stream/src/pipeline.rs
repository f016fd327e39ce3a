//! Batch streamline processing: transform and clip, densify, clip again.
//!
//! Each streamline is processed independently on a rayon pool. A streamline
//! that fails to densify is logged with its index and skipped; the batch
//! reports successes, failures and field-of-view drops separately.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use trakt_core::{Affine, Shape3};

use crate::densify::{densify, DebugConfig, DensifyOptions};
use crate::error::{Result, TractError};
use crate::progress::ProgressTracker;
use crate::streamline::{total_points, Streamline};
use crate::transform::{ClipPolicy, StreamlineTransformer};

/// Pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub densify: DensifyOptions,
    pub clip_policy: ClipPolicy,
    pub debug: DebugConfig,
    /// Worker threads; 0 uses every available CPU.
    pub jobs: usize,
}

impl PipelineConfig {
    pub fn new(densify: DensifyOptions) -> Self {
        Self {
            densify,
            ..Self::default()
        }
    }

    pub fn with_clip_policy(mut self, clip_policy: ClipPolicy) -> Self {
        self.clip_policy = clip_policy;
        self
    }

    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.densify.validate()
    }
}

/// A streamline that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamlineFailure {
    pub index: usize,
    pub reason: String,
}

/// Result of processing a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Processed streamlines, in input order.
    pub streamlines: Vec<Streamline>,
    /// Streamlines skipped because of a per-item error.
    pub failures: Vec<StreamlineFailure>,
    /// Streamlines dropped by field-of-view clipping.
    pub dropped: usize,
    pub input_count: usize,
    pub input_points: usize,
}

impl BatchOutcome {
    pub fn output_points(&self) -> usize {
        total_points(&self.streamlines)
    }

    /// The processed streamlines, or [`TractError::NoStreamlines`] when
    /// nothing survived.
    pub fn into_streamlines(self) -> Result<Vec<Streamline>> {
        if self.streamlines.is_empty() {
            return Err(TractError::NoStreamlines);
        }
        Ok(self.streamlines)
    }
}

enum ItemOutcome {
    Kept(Streamline),
    Dropped,
    Failed(StreamlineFailure),
}

/// Transform → densify → clip pipeline for one target grid.
pub struct StreamlinePipeline {
    transformer: StreamlineTransformer,
    config: PipelineConfig,
    progress: ProgressTracker,
}

impl StreamlinePipeline {
    pub fn new(target_affine: &Affine, shape: Shape3, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let transformer = StreamlineTransformer::new(target_affine, shape, config.clip_policy)?;
        Ok(Self {
            transformer,
            config,
            progress: ProgressTracker::new(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transformer(&self) -> &StreamlineTransformer {
        &self.transformer
    }

    /// Process a batch of physical-space streamlines into voxel space.
    pub fn process(&self, streamlines: &[Streamline]) -> Result<BatchOutcome> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
            .map_err(|e| TractError::invalid_configuration(format!("failed to build thread pool: {}", e)))?;

        let total = streamlines.len();
        let done = AtomicUsize::new(0);
        self.progress.start("Streamlines", Some(total));

        let items: Vec<ItemOutcome> = pool.install(|| {
            streamlines
                .par_iter()
                .enumerate()
                .map(|(position, streamline)| {
                    let outcome = self.process_one(streamline, self.config.debug.should_trace(position));
                    let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.progress.update(completed, Some(total));
                    outcome
                })
                .collect()
        });

        let mut outcome = BatchOutcome {
            input_count: total,
            input_points: total_points(streamlines),
            ..BatchOutcome::default()
        };
        for item in items {
            match item {
                ItemOutcome::Kept(s) => outcome.streamlines.push(s),
                ItemOutcome::Dropped => outcome.dropped += 1,
                ItemOutcome::Failed(failure) => outcome.failures.push(failure),
            }
        }
        if total > 0 && outcome.streamlines.is_empty() {
            self.progress.error("no streamlines survived processing");
        } else {
            self.progress.complete(total);
        }

        tracing::info!(
            "Processed {} of {} streamlines ({} outside the field of view, {} failed)",
            outcome.streamlines.len(),
            total,
            outcome.dropped,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    fn process_one(&self, streamline: &Streamline, trace: bool) -> ItemOutcome {
        let Some(voxel) = self.transformer.transform(streamline) else {
            return ItemOutcome::Dropped;
        };

        let options = self.config.densify.with_trace(trace);
        let dense = match densify(&voxel, &options) {
            Ok(dense) => dense,
            Err(e) => {
                tracing::warn!("Skipping streamline {}: {}", streamline.index, e);
                return ItemOutcome::Failed(StreamlineFailure {
                    index: streamline.index,
                    reason: e.to_string(),
                });
            }
        };

        // Hermite segments can overshoot the grid near its border.
        match self.transformer.clip(&dense) {
            Some(clipped) => ItemOutcome::Kept(clipped),
            None => ItemOutcome::Dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::densify::InterpolationMethod;
    use crate::progress::HistoryCallback;
    use std::sync::Arc;
    use trakt_core::Point3;

    fn line(index: usize, from: [f64; 3], to: [f64; 3]) -> Streamline {
        Streamline::new(index, vec![Point3::from(from), Point3::from(to)])
    }

    #[test]
    fn test_pipeline_partitions_outcomes() {
        let config = PipelineConfig::new(DensifyOptions::new(1.0, InterpolationMethod::Linear).unwrap()).with_jobs(2);
        let pipeline = StreamlinePipeline::new(&Affine::identity(), [10, 10, 10], config).unwrap();

        let mut bad = line(2, [1.0, 1.0, 1.0], [5.0, 5.0, 5.0]);
        bad.points.insert(1, Point3::new(2.0, f64::INFINITY, 2.0));
        let input = vec![
            line(0, [0.0, 0.0, 0.0], [4.0, 0.0, 0.0]),
            line(1, [20.0, 0.0, 0.0], [30.0, 0.0, 0.0]),
            bad,
            line(3, [1.0, 1.0, 1.0], [1.0, 3.0, 1.0]),
        ];

        let outcome = pipeline.process(&input).unwrap();
        assert_eq!(outcome.input_count, 4);
        assert_eq!(outcome.dropped, 1);
        // The infinite point is outside the field of view and clipped first
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.streamlines.len(), 3);
        assert_eq!(outcome.streamlines[0].index, 0);
        assert_eq!(outcome.streamlines[0].len(), 5);
        assert_eq!(outcome.streamlines[2].index, 3);
    }

    #[test]
    fn test_pipeline_reports_failures() {
        let config = PipelineConfig::new(DensifyOptions::new(1e-9, InterpolationMethod::Linear).unwrap());
        let pipeline = StreamlinePipeline::new(&Affine::identity(), [10, 10, 10], config).unwrap();

        let outcome = pipeline
            .process(&[line(7, [0.0, 0.0, 0.0], [9.0, 0.0, 0.0])])
            .unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 7);
        assert!(matches!(outcome.into_streamlines(), Err(TractError::NoStreamlines)));
    }

    #[test]
    fn test_empty_result_reported_as_error() {
        let history = Arc::new(HistoryCallback::new());
        let pipeline = StreamlinePipeline::new(&Affine::identity(), [10, 10, 10], PipelineConfig::default())
            .unwrap()
            .with_progress(ProgressTracker::new().with_callback(history.clone()));

        let outcome = pipeline
            .process(&[line(0, [50.0, 0.0, 0.0], [60.0, 0.0, 0.0])])
            .unwrap();
        assert_eq!(outcome.dropped, 1);
        assert_eq!(history.get_errors(), vec!["no streamlines survived processing".to_string()]);

        let kept = StreamlinePipeline::new(&Affine::identity(), [10, 10, 10], PipelineConfig::default())
            .unwrap()
            .with_progress(ProgressTracker::new().with_callback(history.clone()))
            .process(&[line(1, [1.0, 1.0, 1.0], [5.0, 1.0, 1.0])])
            .unwrap();
        assert_eq!(kept.streamlines.len(), 1);
        assert_eq!(history.get_errors().len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.densify.step_size = -1.0;
        assert!(StreamlinePipeline::new(&Affine::identity(), [4, 4, 4], config).is_err());
    }
}
