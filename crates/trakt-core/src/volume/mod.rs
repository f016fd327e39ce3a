//! Volume types and storage.
//!
//! This module provides the Volume type (samples plus affine) and the
//! storage variants behind it: heap buffers, read-only file maps and
//! disk-backed scratch maps for outputs above the memory budget.

pub mod scratch;
pub mod volume;

pub use scratch::ScratchFile;
pub use volume::{StorageKind, Volume, VolumeData};
