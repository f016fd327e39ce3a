//! Voxel-to-physical affine transforms.
//!
//! This module provides the immutable `Affine` type and the builder that
//! derives a resampling grid from an existing one.

pub mod affine;
pub mod builder;

pub use affine::Affine;
pub use builder::{build_new_affine, shape3, VoxelSize};
