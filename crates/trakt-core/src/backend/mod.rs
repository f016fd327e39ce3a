//! Compute backends.
//!
//! A [`ComputeBackend`] samples a source volume at continuous coordinates and
//! performs axis reductions. Two implementations exist:
//!
//! - [`HostBackend`]: scalar kernels, output slabs processed in parallel on a
//!   rayon pool.
//! - [`TensorBackend`]: batched tensor gathers on any burn backend. The CPU
//!   variant (`NdArray`) is always built; the wgpu variant is the accelerator
//!   and needs the `accelerator` feature.

pub mod host;
pub mod tensor;
pub mod trait_;

pub use host::HostBackend;
pub use tensor::{CpuTensorBackend, TensorBackend, TensorSource};
pub use trait_::ComputeBackend;

#[cfg(feature = "accelerator")]
pub use tensor::AcceleratorBackend;

/// Whether this build carries the accelerator backend.
pub const ACCELERATOR_AVAILABLE: bool = cfg!(feature = "accelerator");
