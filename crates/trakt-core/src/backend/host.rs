//! Host backend: scalar kernels on a rayon thread pool.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::trait_::ComputeBackend;
use crate::error::{ResampleError, Result};
use crate::filter::reduce::{self, Reduction};
use crate::filter::resample::ChunkPlan;
use crate::geometry::{voxel_count, Shape3};
use crate::interpolation::{linear, nearest, InterpolationOrder};

/// Borrowed source channel.
#[derive(Debug, Clone, Copy)]
pub struct HostSource<'a> {
    data: &'a [f32],
    shape: Shape3,
}

/// Host backend.
///
/// Output slabs are disjoint regions of the output buffer, so workers write
/// them without locking.
#[derive(Debug)]
pub struct HostBackend {
    pool: ThreadPool,
}

impl HostBackend {
    /// Create a backend with `jobs` workers (0 uses every available CPU).
    pub fn new(jobs: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("trakt-resample-{}", i))
            .build()
            .map_err(|e| ResampleError::backend(format!("failed to build thread pool: {}", e)))?;
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn jobs(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeBackend for HostBackend {
    type Source<'a> = HostSource<'a>;

    fn name(&self) -> &'static str {
        "host"
    }

    fn prepare<'a>(&'a self, data: &'a [f32], shape: Shape3) -> Result<HostSource<'a>> {
        check_len(data, shape)?;
        Ok(HostSource { data, shape })
    }

    fn sample(
        &self,
        source: &HostSource<'_>,
        coords: &[[f64; 3]],
        order: InterpolationOrder,
        fill: f32,
        out: &mut [f32],
    ) -> Result<()> {
        let kernel = match order {
            InterpolationOrder::Linear => linear::sample,
            InterpolationOrder::Nearest => nearest::sample,
        };
        for (value, coord) in out.iter_mut().zip(coords) {
            *value = kernel(source.data, source.shape, *coord, fill);
        }
        Ok(())
    }

    fn reduce(&self, data: &[f32], shape: Shape3, reduction: Reduction, axis: usize) -> Result<Vec<f32>> {
        check_len(data, shape)?;
        reduce::reduce_host(data, shape, reduction, axis)
    }

    fn resample_into(&self, source: &HostSource<'_>, plan: &ChunkPlan, out: &mut [f32]) -> Result<()> {
        self.pool.install(|| {
            out.par_chunks_mut(plan.slab_len())
                .enumerate()
                .try_for_each(|(slab, values)| plan.resample_slab(self, source, slab, values))
        })
    }
}

pub(crate) fn check_len(data: &[f32], shape: Shape3) -> Result<()> {
    let expected = voxel_count(shape)
        .ok_or_else(|| ResampleError::invalid_configuration("source size overflows usize"))?;
    if data.len() != expected {
        return Err(ResampleError::ShapeMismatch {
            expected: shape.to_vec(),
            actual: vec![data.len()],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_sample() {
        let backend = HostBackend::new(2).unwrap();
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let source = backend.prepare(&data, [2, 2, 2]).unwrap();

        let coords = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.5, 0.0, 0.0], [3.0, 0.0, 0.0]];
        let mut out = vec![0.0; 4];
        backend
            .sample(&source, &coords, InterpolationOrder::Linear, -1.0, &mut out)
            .unwrap();
        assert_eq!(out, vec![0.0, 7.0, 0.5, -1.0]);
    }

    #[test]
    fn test_host_prepare_rejects_wrong_length() {
        let backend = HostBackend::new(1).unwrap();
        let data = vec![0.0; 7];
        assert!(backend.prepare(&data, [2, 2, 2]).is_err());
    }

    #[test]
    fn test_host_jobs() {
        let backend = HostBackend::new(3).unwrap();
        assert_eq!(backend.jobs(), 3);
    }
}
