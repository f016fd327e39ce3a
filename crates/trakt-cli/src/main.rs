use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use trakt_stream::TractError;
use tracing_subscriber::EnvFilter;

mod compare;
mod progress_bar;
mod resample;

use compare::CompareArgs;
use resample::ResampleArgs;

/// Exit status when no streamline survives processing.
const EXIT_NO_STREAMLINES: u8 = 2;

#[derive(Parser)]
#[command(name = "trakt")]
#[command(about = "Resample NIfTI volumes and TrackVis tractograms onto a shared voxel grid")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resample a volume and densify its streamlines onto a new grid
    Resample(ResampleArgs),

    /// Compare linear and Hermite densification on a tractogram
    Compare(CompareArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<TractError>(), Some(TractError::NoStreamlines)) => {
            tracing::warn!(
                "No streamlines were processed. Check your parameters and consider a larger voxel size or different step size."
            );
            ExitCode::from(EXIT_NO_STREAMLINES)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Resample(args) => resample::run(&args),
        Commands::Compare(args) => compare::run(&args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resample_defaults() {
        let cli = Cli::try_parse_from(["trakt", "resample", "--input", "in.nii", "--trk", "in.trk"]).unwrap();
        let Commands::Resample(args) = cli.command else {
            panic!("expected resample");
        };
        assert_eq!(args.output, "resampled");
        assert_eq!(args.voxel_size, 0.5);
        assert_eq!(args.new_dim, vec![116, 140, 96]);
        assert_eq!(args.chunk, vec![64, 64, 64]);
        assert_eq!(args.jobs, 8);
        assert!(args.reduction.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_negative_patch_center() {
        let cli = Cli::try_parse_from([
            "trakt",
            "-v",
            "resample",
            "--input",
            "in.nii",
            "--trk",
            "in.trk",
            "--patch-center",
            "-10.5",
            "4",
            "-2",
            "--reduction",
            "mip",
            "--clip",
            "longest-run",
            "--interp",
            "linear",
        ])
        .unwrap();
        let Commands::Resample(args) = cli.command else {
            panic!("expected resample");
        };
        assert_eq!(args.patch_center, Some(vec![-10.5, 4.0, -2.0]));
        assert_eq!(args.reduction, Some(trakt_core::Reduction::MaxProjection));
        assert!(cli.verbose);
    }

    #[test]
    fn test_backend_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "trakt",
            "resample",
            "--input",
            "in.nii",
            "--trk",
            "in.trk",
            "--cpu",
            "--accelerator",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_compare_arguments() {
        let cli = Cli::try_parse_from(["trakt", "compare", "tracts.trk", "--num-streamlines", "20"]).unwrap();
        let Commands::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.num_streamlines, Some(20));
        assert!(args.voxel_size.is_none());
        assert_eq!(args.step_size, 0.5);
    }
}
