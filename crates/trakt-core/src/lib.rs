//! Affine grid construction and chunked volume resampling.
//!
//! The volume half of trakt: build a target grid that keeps a physical
//! center fixed, then resample a (possibly memory-mapped) source volume onto
//! it chunk by chunk, on the host or through a burn tensor backend.

pub mod affine;
pub mod backend;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod interpolation;
pub mod volume;

pub use affine::{build_new_affine, shape3, Affine, VoxelSize};
pub use backend::{ComputeBackend, CpuTensorBackend, HostBackend, TensorBackend};
pub use error::{ResampleError, Result};
pub use filter::{reduce_volume, ChunkPlan, ChunkedResampler, Reduction, ResampleConfig, ResampledVolume};
pub use geometry::{Point3, Shape3, Vector3};
pub use interpolation::InterpolationOrder;
pub use volume::{ScratchFile, StorageKind, Volume, VolumeData};
