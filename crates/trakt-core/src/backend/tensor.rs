//! Tensor backend: batched gathers on a burn backend.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use super::host::check_len;
use super::trait_::ComputeBackend;
use crate::error::{ResampleError, Result};
use crate::filter::reduce::{check_axis, Reduction};
use crate::geometry::Shape3;
use crate::interpolation::{linear, nearest, InterpolationOrder};

/// Coordinates gathered per kernel launch.
pub const DEFAULT_BATCH_SIZE: usize = 1 << 18;

/// Tensor backend on the CPU (`burn-ndarray`).
pub type CpuTensorBackend = TensorBackend<burn_ndarray::NdArray<f32>>;

/// Tensor backend on the GPU (`wgpu`).
#[cfg(feature = "accelerator")]
pub type AcceleratorBackend = TensorBackend<burn::backend::Wgpu>;

/// Source channel uploaded to the device.
#[derive(Debug, Clone)]
pub struct TensorSource<B: Backend> {
    data: Tensor<B, 1>,
    shape: Shape3,
}

/// Tensor backend.
///
/// Chunks are processed sequentially; parallelism comes from the batched
/// kernels. Gather indices are `i32`, so sources are limited to
/// `i32::MAX` voxels.
#[derive(Debug, Clone)]
pub struct TensorBackend<B: Backend> {
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> TensorBackend<B> {
    /// Create a backend on `device`.
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of coordinates gathered per launch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn upload(&self, data: &[f32]) -> Tensor<B, 1> {
        Tensor::from_data(TensorData::new(data.to_vec(), [data.len()]), &self.device)
    }
}

impl<B: Backend> Default for TensorBackend<B> {
    fn default() -> Self {
        Self::new(B::Device::default())
    }
}

impl<B: Backend> ComputeBackend for TensorBackend<B> {
    type Source<'a> = TensorSource<B>;

    fn name(&self) -> &'static str {
        "tensor"
    }

    fn prepare<'a>(&'a self, data: &'a [f32], shape: Shape3) -> Result<TensorSource<B>> {
        check_len(data, shape)?;
        if data.len() > i32::MAX as usize {
            return Err(ResampleError::invalid_configuration(format!(
                "source has {} voxels, above the tensor backend's gather limit of {}",
                data.len(),
                i32::MAX
            )));
        }
        Ok(TensorSource {
            data: self.upload(data),
            shape,
        })
    }

    fn sample(
        &self,
        source: &TensorSource<B>,
        coords: &[[f64; 3]],
        order: InterpolationOrder,
        fill: f32,
        out: &mut [f32],
    ) -> Result<()> {
        for (coords, out) in coords.chunks(self.batch_size).zip(out.chunks_mut(self.batch_size)) {
            let flat: Vec<f32> = coords
                .iter()
                .flat_map(|c| [c[0] as f32, c[1] as f32, c[2] as f32])
                .collect();
            let coords = Tensor::<B, 2>::from_data(TensorData::new(flat, [coords.len(), 3]), &self.device);

            let values = match order {
                InterpolationOrder::Linear => linear::sample_tensor(&source.data, source.shape, coords, fill),
                InterpolationOrder::Nearest => nearest::sample_tensor(&source.data, source.shape, coords, fill),
            };
            out.copy_from_slice(&read_back(values)?);
        }
        Ok(())
    }

    fn reduce(&self, data: &[f32], shape: Shape3, reduction: Reduction, axis: usize) -> Result<Vec<f32>> {
        check_len(data, shape)?;
        check_axis(axis)?;
        let [nx, ny, nz] = shape;

        // Tensor dims are [k, j, i]
        let volume = self.upload(data).reshape([nz, ny, nx]);
        let dim = 2 - axis;
        let reduced = match reduction {
            Reduction::MaxProjection => volume.max_dim(dim),
            Reduction::Mean => volume.mean_dim(dim),
        };
        let len = reduced.shape().num_elements();
        read_back(reduced.reshape([len]))
    }
}

fn read_back<B: Backend>(values: Tensor<B, 1>) -> Result<Vec<f32>> {
    values
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ResampleError::backend(format!("failed to read tensor data: {:?}", e)))
}
