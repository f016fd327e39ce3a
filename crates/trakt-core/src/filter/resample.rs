//! Chunked, memory-bounded volume resampling.
//!
//! The output grid is split into axis-aligned chunks. Chunks sharing a `k`
//! range form a slab: a contiguous block of the output buffer, processed as
//! one unit of work. Each output voxel's source coordinate is computed from
//! its global index alone, so the result does not depend on the chunk shape,
//! the number of workers or the order in which slabs complete.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::affine::Affine;
use crate::backend::ComputeBackend;
use crate::error::{ResampleError, Result};
use crate::geometry::{voxel_count, Point3, Shape3};
use crate::interpolation::InterpolationOrder;
use crate::volume::{ScratchFile, Volume, VolumeData};

/// Resampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Maximum chunk extent along each axis.
    pub chunk_shape: Shape3,
    /// Output size above which the result is written to a scratch file.
    pub max_output_bytes: u64,
    /// Value for voxels that map outside the source.
    pub fill_value: f32,
    /// Source interpolation.
    pub order: InterpolationOrder,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            chunk_shape: [64, 64, 64],
            max_output_bytes: 64 * (1 << 30),
            fill_value: 0.0,
            order: InterpolationOrder::Linear,
        }
    }
}

impl ResampleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_shape(mut self, chunk_shape: Shape3) -> Self {
        self.chunk_shape = chunk_shape;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: u64) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Set the memory budget in gigabytes (2^30 bytes).
    pub fn with_max_output_gb(mut self, gb: f64) -> Self {
        self.max_output_bytes = if gb.is_finite() && gb > 0.0 {
            (gb * (1u64 << 30) as f64) as u64
        } else {
            0
        };
        self
    }

    pub fn with_fill_value(mut self, fill_value: f32) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn with_order(mut self, order: InterpolationOrder) -> Self {
        self.order = order;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_shape.iter().any(|&n| n == 0) {
            return Err(ResampleError::invalid_configuration(format!(
                "chunk extents must be non-zero, got {:?}",
                self.chunk_shape
            )));
        }
        Ok(())
    }
}

/// Axis-aligned block of the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRegion {
    pub start: Shape3,
    pub extent: Shape3,
}

impl ChunkRegion {
    pub fn len(&self) -> usize {
        self.extent.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Precomputed output-to-source mapping and chunk layout.
///
/// `index_map = inverse(source_affine) * target_affine` takes output voxel
/// indices to continuous source voxel indices. It is composed once per
/// resampling run.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    index_map: Affine,
    source_shape: Shape3,
    output_shape: Shape3,
    chunk_shape: Shape3,
    order: InterpolationOrder,
    fill_value: f32,
}

impl ChunkPlan {
    pub fn new(
        source_affine: &Affine,
        source_shape: Shape3,
        target_affine: &Affine,
        output_shape: Shape3,
        config: &ResampleConfig,
    ) -> Result<Self> {
        config.validate()?;
        if output_shape.iter().any(|&n| n == 0) {
            return Err(ResampleError::invalid_configuration(format!(
                "output extents must be non-zero, got {:?}",
                output_shape
            )));
        }
        let index_map = source_affine.inverse()?.compose(target_affine);
        // Chunks never extend past the grid.
        let chunk_shape = [0, 1, 2].map(|axis| config.chunk_shape[axis].min(output_shape[axis]));
        Ok(Self {
            index_map,
            source_shape,
            output_shape,
            chunk_shape,
            order: config.order,
            fill_value: config.fill_value,
        })
    }

    /// Mapping from output voxel indices to source voxel indices.
    pub fn index_map(&self) -> &Affine {
        &self.index_map
    }

    pub fn source_shape(&self) -> Shape3 {
        self.source_shape
    }

    pub fn output_shape(&self) -> Shape3 {
        self.output_shape
    }

    pub fn chunk_shape(&self) -> Shape3 {
        self.chunk_shape
    }

    /// Number of k-slabs.
    pub fn slab_count(&self) -> usize {
        self.output_shape[2].div_ceil(self.chunk_shape[2])
    }

    /// Output samples in a full slab. The last slab may be shorter.
    pub fn slab_len(&self) -> usize {
        self.output_shape[0] * self.output_shape[1] * self.chunk_shape[2]
    }

    /// `k` range covered by `slab`.
    pub fn slab_range(&self, slab: usize) -> Range<usize> {
        let start = slab * self.chunk_shape[2];
        start..(start + self.chunk_shape[2]).min(self.output_shape[2])
    }

    /// Total number of chunks.
    pub fn chunk_count(&self) -> usize {
        (0..3)
            .map(|axis| self.output_shape[axis].div_ceil(self.chunk_shape[axis]))
            .product()
    }

    /// Chunks of one slab, `i` fastest.
    pub fn chunks(&self, slab: usize) -> Vec<ChunkRegion> {
        let k = self.slab_range(slab);
        let mut regions = Vec::new();
        for j0 in (0..self.output_shape[1]).step_by(self.chunk_shape[1]) {
            for i0 in (0..self.output_shape[0]).step_by(self.chunk_shape[0]) {
                regions.push(ChunkRegion {
                    start: [i0, j0, k.start],
                    extent: [
                        self.chunk_shape[0].min(self.output_shape[0] - i0),
                        self.chunk_shape[1].min(self.output_shape[1] - j0),
                        k.len(),
                    ],
                });
            }
        }
        regions
    }

    /// Source coordinates of every voxel of `region`, `i` fastest.
    pub fn source_coords(&self, region: &ChunkRegion, coords: &mut Vec<[f64; 3]>) {
        coords.clear();
        coords.reserve(region.len());
        let [i0, j0, k0] = region.start;
        let [ei, ej, ek] = region.extent;
        for k in k0..k0 + ek {
            for j in j0..j0 + ej {
                for i in i0..i0 + ei {
                    let p = self
                        .index_map
                        .transform_point(&Point3::new(i as f64, j as f64, k as f64));
                    coords.push([p.x, p.y, p.z]);
                }
            }
        }
    }

    /// Resample one slab into `out`, the slab's block of the output channel.
    pub fn resample_slab<Bk: ComputeBackend + ?Sized>(
        &self,
        backend: &Bk,
        source: &Bk::Source<'_>,
        slab: usize,
        out: &mut [f32],
    ) -> Result<()> {
        let [nx, ny, _] = self.output_shape;
        let k_start = self.slab_range(slab).start;
        let mut coords = Vec::new();
        let mut values = Vec::new();

        for region in self.chunks(slab) {
            self.source_coords(&region, &mut coords);
            values.clear();
            values.resize(coords.len(), self.fill_value);
            backend.sample(source, &coords, self.order, self.fill_value, &mut values)?;

            let [i0, j0, k0] = region.start;
            let [ei, ej, ek] = region.extent;
            let mut n = 0;
            for k in k0..k0 + ek {
                for j in j0..j0 + ej {
                    let row = i0 + nx * (j + ny * (k - k_start));
                    out[row..row + ei].copy_from_slice(&values[n..n + ei]);
                    n += ei;
                }
            }
        }
        tracing::trace!("Finished slab {} of {}", slab + 1, self.slab_count());
        Ok(())
    }
}

/// Output of [`ChunkedResampler::resample`].
///
/// A disk-backed result carries the handle of its scratch file. Callers
/// delete it with [`ScratchFile::remove`] after persisting the volume.
#[derive(Debug)]
pub struct ResampledVolume {
    pub volume: Volume,
    pub scratch: Option<ScratchFile>,
}

impl ResampledVolume {
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn scratch(&self) -> Option<&ScratchFile> {
        self.scratch.as_ref()
    }

    pub fn is_disk_backed(&self) -> bool {
        self.scratch.is_some()
    }

    pub fn into_parts(self) -> (Volume, Option<ScratchFile>) {
        (self.volume, self.scratch)
    }
}

/// Chunked resampler over a [`ComputeBackend`].
#[derive(Debug)]
pub struct ChunkedResampler<Bk: ComputeBackend> {
    backend: Bk,
    config: ResampleConfig,
}

impl<Bk: ComputeBackend> ChunkedResampler<Bk> {
    pub fn new(backend: Bk, config: ResampleConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Bk {
        &self.backend
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    /// Resample `source` onto the grid `(target_affine, output_shape)`.
    ///
    /// Multi-channel sources are resampled channel by channel.
    pub fn resample(&self, source: &Volume, target_affine: &Affine, output_shape: Shape3) -> Result<ResampledVolume> {
        let plan = ChunkPlan::new(
            source.affine(),
            source.shape(),
            target_affine,
            output_shape,
            &self.config,
        )?;

        let channels = source.channels();
        let per_channel = voxel_count(output_shape)
            .ok_or_else(|| ResampleError::invalid_configuration("output voxel count overflows usize"))?;
        let total = per_channel
            .checked_mul(channels)
            .ok_or_else(|| ResampleError::invalid_configuration("output voxel count overflows usize"))?;
        if total.checked_mul(std::mem::size_of::<f32>()).map_or(true, |b| b > isize::MAX as usize) {
            return Err(ResampleError::invalid_configuration(format!(
                "output of {} samples exceeds the address space",
                total
            )));
        }

        tracing::info!(
            "Resampling {:?} -> {:?} ({} channel(s), {} chunks of {:?}) using {} backend",
            source.shape(),
            output_shape,
            channels,
            plan.chunk_count(),
            plan.chunk_shape(),
            self.backend.name()
        );

        let (mut data, scratch) = VolumeData::allocate(total, self.config.max_output_bytes)?;
        let out = data
            .as_mut_slice()
            .ok_or_else(|| ResampleError::backend("output storage is read-only"))?;

        for (channel, out) in out.chunks_mut(per_channel).enumerate() {
            let prepared = self.backend.prepare(source.channel(channel), source.shape())?;
            self.backend.resample_into(&prepared, &plan, out)?;
            tracing::debug!("Resampled channel {} of {}", channel + 1, channels);
        }
        data.flush()?;

        let volume = Volume::from_data(data, output_shape, channels, *target_affine)?;
        Ok(ResampledVolume { volume, scratch })
    }
}
