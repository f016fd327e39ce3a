//! File formats for trakt: NIfTI volumes and TrackVis tractograms.

pub mod nifti_io;
pub mod trk_io;

pub use nifti_io::{read_nifti, write_nifti};
pub use trk_io::{read_trk, write_trk, PointSpace, Tractogram, TrkHeader};
