use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use trakt_core::backend::ACCELERATOR_AVAILABLE;
use trakt_core::filter::reduce::DEFAULT_REDUCTION_AXIS;
use trakt_core::geometry::voxel_count;
use trakt_core::{
    build_new_affine, reduce_volume, shape3, Affine, ChunkedResampler, ComputeBackend, HostBackend, Point3, Reduction,
    ResampleConfig, Shape3, Volume,
};
use trakt_io::{read_nifti, read_trk, write_nifti, write_trk, Tractogram};
use trakt_stream::{
    total_points, ClipPolicy, DebugConfig, DensifyOptions, InterpolationMethod, PipelineConfig, ProgressTracker,
    StreamlinePipeline,
};

use crate::progress_bar::BarCallback;

/// Grids above this many voxels get a size warning.
const LARGE_GRID_VOXELS: usize = 100_000_000;

#[derive(Args, Debug)]
pub struct ResampleArgs {
    /// Input NIfTI volume (.nii or .nii.gz)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Input TrackVis tractogram (.trk)
    #[arg(long)]
    pub trk: PathBuf,

    /// Prefix for <prefix>.nii.gz and <prefix>.trk
    #[arg(short, long, default_value = "resampled")]
    pub output: String,

    /// New isotropic voxel size in mm
    #[arg(long, default_value_t = 0.5)]
    pub voxel_size: f64,

    /// New grid dimensions
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [116, 140, 96])]
    pub new_dim: Vec<usize>,

    /// Worker threads (0 uses every CPU)
    #[arg(short, long, default_value_t = 8)]
    pub jobs: usize,

    /// Physical center of the new grid in mm (defaults to the input's center)
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    pub patch_center: Option<Vec<f64>>,

    /// Reduce the resampled volume along one axis (mip or mean)
    #[arg(long)]
    pub reduction: Option<Reduction>,

    /// Axis reduced by --reduction
    #[arg(long, default_value_t = DEFAULT_REDUCTION_AXIS)]
    pub reduction_axis: usize,

    /// Resample on the accelerator backend
    #[arg(long, conflicts_with = "cpu")]
    pub accelerator: bool,

    /// Force host processing
    #[arg(long)]
    pub cpu: bool,

    /// Streamline interpolation (hermite or linear)
    #[arg(long, default_value = "hermite")]
    pub interp: InterpolationMethod,

    /// Densification step in mm
    #[arg(long, default_value_t = 0.5)]
    pub step_size: f64,

    /// Output size above which the volume is written to a scratch file
    #[arg(long, default_value_t = 64.0)]
    pub max_gb: f64,

    /// Chunk shape used while resampling
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [64, 64, 64])]
    pub chunk: Vec<usize>,

    /// Field-of-view clipping (drop-outside or longest-run)
    #[arg(long, default_value = "drop-outside")]
    pub clip: ClipPolicy,

    /// Trace tangents and weights for the first N streamlines at debug level
    #[arg(long, default_value_t = 5)]
    pub debug_tangents: usize,
}

impl ResampleArgs {
    fn new_shape(&self) -> Result<Shape3> {
        Ok(shape3(&self.new_dim)?)
    }

    fn patch_center(&self) -> Result<Option<Point3>> {
        match self.patch_center.as_deref() {
            None => Ok(None),
            Some([x, y, z]) => Ok(Some(Point3::new(*x, *y, *z))),
            Some(other) => bail!("--patch-center needs 3 values, got {}", other.len()),
        }
    }

    fn resample_config(&self) -> Result<ResampleConfig> {
        let config = ResampleConfig::default()
            .with_chunk_shape(shape3(&self.chunk)?)
            .with_max_output_gb(self.max_gb);
        config.validate()?;
        Ok(config)
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let densify = DensifyOptions::from_physical_step(self.step_size, self.voxel_size, self.interp)?;
        Ok(PipelineConfig::new(densify)
            .with_clip_policy(self.clip)
            .with_debug(DebugConfig::default().with_max_traced(self.debug_tangents))
            .with_jobs(self.jobs))
    }

    fn output_paths(&self) -> (PathBuf, PathBuf) {
        (
            PathBuf::from(format!("{}.nii.gz", self.output)),
            PathBuf::from(format!("{}.trk", self.output)),
        )
    }
}

/// Summary of one resample run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub input_streamlines: usize,
    pub input_points: usize,
    pub output_streamlines: usize,
    pub output_points: usize,
    pub failed: usize,
}

impl RunStats {
    fn log(&self) {
        if self.failed > 0 {
            tracing::warn!("{} streamlines failed to densify and were skipped", self.failed);
        }
        tracing::info!(
            "Total points in original streamlines: {} (average {:.2} per streamline)",
            self.input_points,
            average(self.input_points, self.input_streamlines)
        );
        tracing::info!(
            "Total points in processed streamlines: {} (average {:.2} per streamline)",
            self.output_points,
            average(self.output_points, self.output_streamlines)
        );
        tracing::info!(
            "Change in streamline count: {:+} ({:+.1}%)",
            self.output_streamlines as i64 - self.input_streamlines as i64,
            percent_change(self.input_streamlines, self.output_streamlines)
        );
        tracing::info!(
            "Change in point count: {:+} ({:+.1}%)",
            self.output_points as i64 - self.input_points as i64,
            percent_change(self.input_points, self.output_points)
        );
    }
}

fn average(total: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

fn percent_change(before: usize, after: usize) -> f64 {
    if before == 0 {
        0.0
    } else {
        (after as f64 - before as f64) / before as f64 * 100.0
    }
}

pub fn run(args: &ResampleArgs) -> Result<()> {
    run_with_stats(args).map(|stats| stats.log())
}

/// Run the whole resample flow and return its statistics.
pub fn run_with_stats(args: &ResampleArgs) -> Result<RunStats> {
    let new_shape = args.new_shape()?;
    match voxel_count(new_shape) {
        Some(voxels) if voxels <= LARGE_GRID_VOXELS => {}
        Some(voxels) => tracing::warn!(
            "Requested dimensions {:?} are very large ({} voxels); consider a smaller grid or a larger voxel size",
            new_shape,
            voxels
        ),
        None => tracing::warn!(
            "Requested dimensions {:?} overflow the addressable voxel count; consider a smaller grid",
            new_shape
        ),
    }

    let source = read_nifti(&args.input)?;
    tracing::info!(
        "Old shape: {:?}, voxel sizes: {:?}, storage: {:?}",
        source.dims(),
        source.voxel_sizes(),
        source.storage_kind()
    );

    let target = build_new_affine(
        source.affine(),
        source.shape(),
        args.voxel_size,
        new_shape,
        args.patch_center()?,
    )?;
    tracing::info!("New affine: {:?}", target.to_rows());

    let config = args.resample_config()?;
    let (nifti_path, trk_path) = args.output_paths();

    let use_accelerator = if args.cpu {
        false
    } else if args.accelerator && !ACCELERATOR_AVAILABLE {
        tracing::warn!("This build has no accelerator backend, falling back to host processing");
        false
    } else {
        ACCELERATOR_AVAILABLE
    };

    if use_accelerator {
        resample_accelerated(args, &source, &target, new_shape, config, &nifti_path)?;
    } else {
        let backend = HostBackend::new(args.jobs)?;
        resample_volume(args, backend, &source, &target, new_shape, config, &nifti_path)?;
    }
    drop(source);

    process_streamlines(args, &target, new_shape, &trk_path)
}

#[cfg(feature = "accelerator")]
fn resample_accelerated(
    args: &ResampleArgs,
    source: &Volume,
    target: &Affine,
    shape: Shape3,
    config: ResampleConfig,
    out: &std::path::Path,
) -> Result<()> {
    let backend = trakt_core::backend::AcceleratorBackend::default();
    resample_volume(args, backend, source, target, shape, config, out)
}

#[cfg(not(feature = "accelerator"))]
fn resample_accelerated(
    args: &ResampleArgs,
    source: &Volume,
    target: &Affine,
    shape: Shape3,
    config: ResampleConfig,
    out: &std::path::Path,
) -> Result<()> {
    resample_volume(args, HostBackend::new(args.jobs)?, source, target, shape, config, out)
}

/// Resample, optionally reduce, write the NIfTI and release the scratch file.
fn resample_volume<Bk: ComputeBackend>(
    args: &ResampleArgs,
    backend: Bk,
    source: &Volume,
    target: &Affine,
    shape: Shape3,
    config: ResampleConfig,
    out: &std::path::Path,
) -> Result<()> {
    tracing::info!("Resampling to {:?} using {} backend", shape, backend.name());
    let resampler = ChunkedResampler::new(backend, config);
    let resampled = resampler.resample(source, target, shape)?;
    if resampled.volume().shape() != shape {
        tracing::warn!(
            "Resampled shape {:?} does not match the requested {:?}; streamlines may be clipped unexpectedly",
            resampled.volume().shape(),
            shape
        );
    }

    let (volume, scratch) = resampled.into_parts();
    match args.reduction {
        Some(reduction) => {
            let reduced = reduce_volume(resampler.backend(), &volume, reduction, args.reduction_axis)?;
            drop(volume);
            write_nifti(out, &reduced)?;
        }
        None => {
            write_nifti(out, &volume)?;
            drop(volume);
        }
    }

    if let Some(scratch) = scratch {
        let path = scratch.path().to_path_buf();
        scratch
            .remove()
            .with_context(|| format!("Failed to remove scratch file {}", path.display()))?;
    }
    Ok(())
}

fn process_streamlines(args: &ResampleArgs, target: &Affine, shape: Shape3, out: &std::path::Path) -> Result<RunStats> {
    let tractogram = read_trk(&args.trk)?;
    tracing::info!(
        "Loaded {} streamlines ({} points)",
        tractogram.streamlines.len(),
        total_points(&tractogram.streamlines)
    );

    let config = args.pipeline_config()?;
    tracing::info!(
        "Transforming, densifying and clipping with {} interpolation, step {} mm ({} voxels), clip {}",
        config.densify.method,
        args.step_size,
        config.densify.step_size,
        config.clip_policy
    );
    let pipeline = StreamlinePipeline::new(target, shape, config)?
        .with_progress(ProgressTracker::new().with_callback(Arc::new(BarCallback::new())));
    let outcome = pipeline.process(&tractogram.streamlines)?;

    let stats = RunStats {
        input_streamlines: outcome.input_count,
        input_points: outcome.input_points,
        output_streamlines: outcome.streamlines.len(),
        output_points: outcome.output_points(),
        failed: outcome.failures.len(),
    };
    let streamlines = outcome.into_streamlines()?;

    let output = Tractogram::on_grid(&tractogram.header, target, shape, streamlines)?;
    write_trk(out, &output)?;
    Ok(stats)
}
