use anyhow::{Context, Result};
use clap::Args;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use trakt_io::read_trk;
use trakt_stream::{compare_methods, CompareConfig, DebugConfig, MethodComparison};

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// TrackVis tractogram to analyse
    pub trk: PathBuf,

    /// Densification step in voxels
    #[arg(long, default_value_t = 0.5)]
    pub step_size: f64,

    /// Voxel size in mm used to scale the step (defaults to the file's mean voxel size)
    #[arg(long)]
    pub voxel_size: Option<f64>,

    /// Only compare the first N streamlines
    #[arg(short, long)]
    pub num_streamlines: Option<usize>,

    /// Worker threads (0 uses every CPU)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Trace tangents and weights for the first N streamlines at debug level
    #[arg(long, default_value_t = 5)]
    pub debug_tangents: usize,

    /// Write the comparison as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &CompareArgs) -> Result<()> {
    let comparison = compare(args)?;
    comparison.log_summary();

    if let Some(path) = &args.report {
        let file = File::create(path).with_context(|| format!("Failed to create report {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &comparison)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        writer.flush()?;
        tracing::info!("Saved comparison report to {}", path.display());
    }
    Ok(())
}

fn compare(args: &CompareArgs) -> Result<MethodComparison> {
    let tractogram = read_trk(&args.trk)?;
    let header_voxel_size = tractogram.header.mean_voxel_size();
    tracing::info!(
        "Original voxel sizes: {:?} mm, mean {:.3} mm",
        tractogram.header.voxel_sizes,
        header_voxel_size
    );

    let config = CompareConfig {
        step_size: args.step_size,
        voxel_size: args.voxel_size.unwrap_or(header_voxel_size),
        max_streamlines: args.num_streamlines,
        jobs: args.jobs,
        debug: DebugConfig::default().with_max_traced(args.debug_tangents),
    };
    Ok(compare_methods(&tractogram.streamlines, &config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trakt_core::Point3;
    use trakt_io::{write_trk, PointSpace, Tractogram, TrkHeader};
    use trakt_stream::Streamline;

    #[test]
    fn test_report_is_written() {
        let dir = tempdir().unwrap();
        let trk = dir.path().join("arc.trk");
        let report = dir.path().join("report.json");

        let arc: Vec<Point3> = (0..8)
            .map(|i| {
                let t = i as f64 * 0.4;
                Point3::new(10.0 * t.cos(), 10.0 * t.sin(), 0.0)
            })
            .collect();
        let mut header = TrkHeader::default();
        header.voxel_sizes = [2.0, 2.0, 2.0];
        write_trk(&trk, &Tractogram::new(header, vec![Streamline::new(0, arc)], PointSpace::RasMm)).unwrap();

        let args = CompareArgs {
            trk,
            step_size: 0.25,
            voxel_size: None,
            num_streamlines: None,
            jobs: 1,
            debug_tangents: 0,
            report: Some(report.clone()),
        };
        run(&args).unwrap();

        let json: serde_json::Value = serde_json::from_reader(File::open(&report).unwrap()).unwrap();
        assert_eq!(json["voxel_size"], 2.0);
        assert_eq!(json["step_size_mm"], 0.5);
        assert_eq!(json["streamline_count"], 1);
        assert!(json["recommendation"].is_string());
    }
}
