//! Volume container.

use std::fmt;

use memmap2::{Mmap, MmapMut};

use crate::affine::Affine;
use crate::error::{ResampleError, Result};
use crate::geometry::{voxel_count, Shape3};
use crate::volume::scratch::ScratchFile;

/// Where the samples of a volume live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Heap buffer owned by the volume.
    InMemory,
    /// Read-only map of the source file.
    MappedSource,
    /// Read-write map of a scratch file.
    Scratch,
}

/// Sample storage for a [`Volume`].
pub enum VolumeData {
    /// Owned heap buffer.
    Owned(Vec<f32>),
    /// Read-only map of a file holding little-endian `f32` samples.
    Mapped {
        map: Mmap,
        offset: usize,
        len: usize,
    },
    /// Read-write map of a scratch file, exactly `len * 4` bytes.
    Scratch(MmapMut),
}

impl VolumeData {
    /// Wrap a read-only map, checking that `len` samples starting at byte
    /// `offset` are in range and aligned for `f32`.
    pub fn mapped(map: Mmap, offset: usize, len: usize) -> Result<Self> {
        let end = len
            .checked_mul(4)
            .and_then(|bytes| bytes.checked_add(offset))
            .ok_or_else(|| ResampleError::invalid_configuration("mapped volume size overflows"))?;
        if end > map.len() {
            return Err(ResampleError::invalid_configuration(format!(
                "mapped volume needs {} bytes but the file holds {}",
                end,
                map.len()
            )));
        }
        bytemuck::try_cast_slice::<u8, f32>(&map[offset..end]).map_err(|e| {
            ResampleError::invalid_configuration(format!("mapped samples are not f32-aligned: {}", e))
        })?;
        Ok(Self::Mapped { map, offset, len })
    }

    /// Allocate zeroed storage for `len` samples.
    ///
    /// Falls back to a scratch file when the byte size exceeds `max_bytes`.
    pub fn allocate(len: usize, max_bytes: u64) -> Result<(Self, Option<ScratchFile>)> {
        let bytes = len
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| ResampleError::invalid_configuration("output size overflows usize"))?;
        let bytes = bytes as u64;

        if bytes <= max_bytes {
            return Ok((Self::Owned(vec![0.0; len]), None));
        }

        tracing::info!(
            "Output needs {:.2} GB, above the {:.2} GB budget; switching to disk-backed storage",
            bytes as f64 / 1e9,
            max_bytes as f64 / 1e9
        );
        let (scratch, map) = ScratchFile::create(bytes)?;
        Ok((Self::Scratch(map), Some(scratch)))
    }

    /// The samples as a flat slice.
    pub fn as_slice(&self) -> &[f32] {
        match self {
            Self::Owned(values) => values.as_slice(),
            Self::Mapped { map, offset, len } => bytemuck::cast_slice(&map[*offset..*offset + *len * 4]),
            Self::Scratch(map) => bytemuck::cast_slice(&map[..]),
        }
    }

    /// The samples as a mutable slice, `None` for read-only maps.
    pub fn as_mut_slice(&mut self) -> Option<&mut [f32]> {
        match self {
            Self::Owned(values) => Some(values.as_mut_slice()),
            Self::Mapped { .. } => None,
            Self::Scratch(map) => Some(bytemuck::cast_slice_mut(&mut map[..])),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::Owned(values) => values.len(),
            Self::Mapped { len, .. } => *len,
            Self::Scratch(map) => map.len() / 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Owned(_) => StorageKind::InMemory,
            Self::Mapped { .. } => StorageKind::MappedSource,
            Self::Scratch(_) => StorageKind::Scratch,
        }
    }

    /// Flush a scratch map to disk. No-op for other storage.
    pub fn flush(&self) -> Result<()> {
        if let Self::Scratch(map) = self {
            map.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for VolumeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeData")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

impl From<Vec<f32>> for VolumeData {
    fn from(values: Vec<f32>) -> Self {
        Self::Owned(values)
    }
}

/// Dense 3-D volume (optionally with a trailing channel axis) and its affine.
///
/// Samples are stored in NIfTI order: `i` fastest, then `j`, `k` and channel,
/// so voxel `(i, j, k)` of channel `c` lives at
/// `i + nx * (j + ny * (k + nz * c))`.
#[derive(Debug)]
pub struct Volume {
    data: VolumeData,
    shape: Shape3,
    channels: usize,
    affine: Affine,
}

impl Volume {
    /// Create a single-channel volume from an owned buffer.
    pub fn new(data: Vec<f32>, shape: Shape3, affine: Affine) -> Result<Self> {
        Self::from_data(VolumeData::Owned(data), shape, 1, affine)
    }

    /// Create a volume from any storage.
    pub fn from_data(data: VolumeData, shape: Shape3, channels: usize, affine: Affine) -> Result<Self> {
        if shape.iter().any(|&n| n == 0) || channels == 0 {
            return Err(ResampleError::invalid_configuration(format!(
                "volume extents must be non-zero, got {:?} x {} channels",
                shape, channels
            )));
        }
        let expected = voxel_count(shape)
            .and_then(|n| n.checked_mul(channels))
            .ok_or_else(|| ResampleError::invalid_configuration("volume size overflows usize"))?;
        if data.len() != expected {
            return Err(ResampleError::ShapeMismatch {
                expected: vec![shape[0], shape[1], shape[2], channels],
                actual: vec![data.len()],
            });
        }
        Ok(Self { data, shape, channels, affine })
    }

    /// All samples, channels concatenated.
    pub fn data(&self) -> &[f32] {
        self.data.as_slice()
    }

    /// Samples of one channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        let n = self.voxel_count();
        &self.data()[channel * n..(channel + 1) * n]
    }

    pub fn storage(&self) -> &VolumeData {
        &self.data
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.data.kind()
    }

    pub fn is_disk_backed(&self) -> bool {
        self.data.kind() != StorageKind::InMemory
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    pub fn voxel_sizes(&self) -> [f64; 3] {
        self.affine.voxel_sizes()
    }

    /// Voxels per channel.
    pub fn voxel_count(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    /// Dimensions as stored on disk: three spatial extents, plus the channel
    /// count for multi-channel volumes.
    pub fn dims(&self) -> Vec<usize> {
        let mut dims = self.shape.to_vec();
        if self.channels > 1 {
            dims.push(self.channels);
        }
        dims
    }

    /// Flat offset of voxel `(i, j, k)` within a channel.
    pub fn linear_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.shape[0] * (j + self.shape[1] * k)
    }

    /// Sample at voxel `(i, j, k)` of `channel`, `None` out of range.
    pub fn get(&self, i: usize, j: usize, k: usize, channel: usize) -> Option<f32> {
        if i >= self.shape[0] || j >= self.shape[1] || k >= self.shape[2] || channel >= self.channels {
            return None;
        }
        Some(self.channel(channel)[self.linear_index(i, j, k)])
    }

    /// Take the storage out of the volume.
    pub fn into_data(self) -> VolumeData {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_indexing_is_i_fastest() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let volume = Volume::new(data, [2, 3, 4], Affine::identity()).unwrap();

        assert_eq!(volume.get(1, 0, 0, 0), Some(1.0));
        assert_eq!(volume.get(0, 1, 0, 0), Some(2.0));
        assert_eq!(volume.get(0, 0, 1, 0), Some(6.0));
        assert_eq!(volume.get(1, 2, 3, 0), Some(23.0));
        assert_eq!(volume.get(2, 0, 0, 0), None);
    }

    #[test]
    fn test_volume_channels() {
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let volume =
            Volume::from_data(VolumeData::Owned(data), [2, 2, 2], 2, Affine::identity()).unwrap();

        assert_eq!(volume.dims(), vec![2, 2, 2, 2]);
        assert_eq!(volume.channel(1)[0], 8.0);
        assert_eq!(volume.get(1, 1, 1, 1), Some(15.0));
    }

    #[test]
    fn test_volume_shape_mismatch() {
        let result = Volume::new(vec![0.0; 7], [2, 2, 2], Affine::identity());
        assert!(matches!(result, Err(ResampleError::ShapeMismatch { .. })));

        let result = Volume::new(vec![], [0, 2, 2], Affine::identity());
        assert!(matches!(result, Err(ResampleError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_allocate_in_memory() {
        let (data, scratch) = VolumeData::allocate(10, 1024).unwrap();
        assert_eq!(data.kind(), StorageKind::InMemory);
        assert_eq!(data.len(), 10);
        assert!(scratch.is_none());
    }

    #[test]
    fn test_allocate_scratch_over_budget() {
        let (mut data, scratch) = VolumeData::allocate(10, 16).unwrap();
        assert_eq!(data.kind(), StorageKind::Scratch);
        assert_eq!(data.len(), 10);

        let slice = data.as_mut_slice().unwrap();
        slice[9] = 3.5;
        assert_eq!(data.as_slice()[9], 3.5);

        drop(data);
        scratch.unwrap().remove().unwrap();
    }
}
