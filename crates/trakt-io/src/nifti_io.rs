use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use nifti::volume::ndarray::IntoNdArray;
use nifti::writer::WriterOptions;
use nifti::{NiftiHeader, NiftiObject, NiftiType, ReaderOptions};
use std::fs::File;
use std::path::Path;
use trakt_core::{Affine, Shape3, Volume, VolumeData};

/// Read a NIfTI-1 volume.
///
/// Uncompressed little-endian float32 `.nii` files without intensity scaling
/// are memory-mapped; everything else is decoded into memory as `f32`.
/// A fourth dimension becomes the channel axis.
pub fn read_nifti<P: AsRef<Path>>(path: P) -> Result<Volume> {
    let path = path.as_ref();
    if let Some(volume) = try_map_nifti(path)? {
        tracing::info!("Memory-mapped {} ({:?})", path.display(), volume.dims());
        return Ok(volume);
    }

    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let header = obj.header().clone();
    let (shape, channels) = grid_dims(&header)?;
    let affine = header_affine(&header)?;

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let expected = shape.iter().product::<usize>() * channels;
    if array.len() != expected {
        bail!(
            "NIfTI data holds {} samples but the header describes {:?} x {} channels",
            array.len(),
            shape,
            channels
        );
    }

    // Reversed axes iterate with i fastest.
    let data: Vec<f32> = array.t().iter().copied().collect();
    tracing::info!("Loaded {} ({:?} x {} channels)", path.display(), shape, channels);
    Ok(Volume::from_data(VolumeData::Owned(data), shape, channels, affine)?)
}

/// Write a volume as float32 NIfTI-1, gzip-compressed when the path ends in `.gz`.
///
/// The affine goes into the sform; pixdim carries the voxel sizes.
pub fn write_nifti<P: AsRef<Path>>(path: P, volume: &Volume) -> Result<()> {
    let path = path.as_ref();
    let dims = volume.dims();
    let array = ArrayD::from_shape_vec(IxDyn(&dims).f(), volume.data().to_vec())
        .map_err(|e| anyhow::anyhow!("Failed to create ndarray: {}", e))?;

    let rows = volume.affine().to_rows();
    let sizes = volume.voxel_sizes();
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0, sizes[0] as f32, sizes[1] as f32, sizes[2] as f32, 1.0, 1.0, 1.0, 1.0];
    header.sform_code = 2;
    header.qform_code = 0;
    header.srow_x = rows[0].map(|v| v as f32);
    header.srow_y = rows[1].map(|v| v as f32);
    header.srow_z = rows[2].map(|v| v as f32);
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    tracing::info!("Saved {} ({:?})", path.display(), dims);
    Ok(())
}

/// Spatial shape and channel count from `dim`.
fn grid_dims(header: &NiftiHeader) -> Result<(Shape3, usize)> {
    let rank = header.dim[0] as usize;
    if !(1..=7).contains(&rank) {
        bail!("Invalid NIfTI rank {}", rank);
    }
    let extent = |axis: usize| if axis <= rank { (header.dim[axis] as usize).max(1) } else { 1 };
    if (5..=rank).any(|axis| extent(axis) > 1) {
        bail!("Only 3-D and 4-D NIfTI volumes are supported, got dim {:?}", &header.dim[..=rank]);
    }
    Ok(([extent(1), extent(2), extent(3)], extent(4)))
}

/// Voxel-to-world affine, preferring sform, then qform, then pixdim scaling.
fn header_affine(header: &NiftiHeader) -> Result<Affine> {
    let rows = if header.sform_code > 0 {
        [
            header.srow_x.map(f64::from),
            header.srow_y.map(f64::from),
            header.srow_z.map(f64::from),
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let dx = header.pixdim[1] as f64;
        let dy = header.pixdim[2] as f64;
        let dz = header.pixdim[3] as f64 * qfac;

        [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x as f64,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y as f64,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z as f64,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        let dx = header.pixdim[1] as f64;
        let dy = header.pixdim[2] as f64;
        let dz = header.pixdim[3] as f64;
        [
            [dx, 0.0, 0.0, 0.0],
            [0.0, dy, 0.0, 0.0],
            [0.0, 0.0, dz, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    };
    Ok(Affine::from_rows(rows)?)
}

/// Map the file read-only when its samples can be used in place.
fn try_map_nifti(path: &Path) -> Result<Option<Volume>> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if !name.ends_with(".nii") || !cfg!(target_endian = "little") {
        return Ok(None);
    }

    let header = NiftiHeader::from_file(path)
        .with_context(|| format!("Failed to read NIfTI header {}", path.display()))?;
    let unscaled = (header.scl_slope == 0.0 || header.scl_slope == 1.0) && header.scl_inter == 0.0;
    let float32 = matches!(header.data_type(), Ok(NiftiType::Float32));
    let offset = header.vox_offset as usize;
    if !unscaled || !float32 || header.vox_offset.fract() != 0.0 || offset % 4 != 0 {
        return Ok(None);
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    // The map is read-only; the file must not be truncated while it is alive.
    let map = unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to map {}", path.display()))?;
    if map.len() < 4 || i32::from_le_bytes([map[0], map[1], map[2], map[3]]) != 348 {
        // Big-endian or compressed despite the extension.
        return Ok(None);
    }

    let (shape, channels) = grid_dims(&header)?;
    let affine = header_affine(&header)?;
    let len = shape.iter().product::<usize>() * channels;
    let data = VolumeData::mapped(map, offset, len)?;
    Ok(Some(Volume::from_data(data, shape, channels, affine)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trakt_core::StorageKind;

    fn sample_volume() -> Volume {
        let data: Vec<f32> = (0..3 * 4 * 5).map(|x| x as f32).collect();
        let affine = Affine::from_rows([
            [0.0, -1.5, 0.0, 10.0],
            [2.0, 0.0, 0.0, -20.0],
            [0.0, 0.0, 1.0, 5.5],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        Volume::new(data, [3, 4, 5], affine).unwrap()
    }

    #[test]
    fn test_round_trip_gz() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii.gz");
        let volume = sample_volume();

        write_nifti(&file_path, &volume)?;
        let loaded = read_nifti(&file_path)?;

        assert_eq!(loaded.shape(), [3, 4, 5]);
        assert_eq!(loaded.storage_kind(), StorageKind::InMemory);
        assert_eq!(loaded.data(), volume.data());
        assert_eq!(loaded.get(2, 1, 3, 0), Some((2 + 3 * (1 + 4 * 3)) as f32));
        for (a, b) in loaded.affine().to_rows().iter().flatten().zip(volume.affine().to_rows().iter().flatten()) {
            assert!((a - b).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_uncompressed_is_mapped() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");
        let volume = sample_volume();

        write_nifti(&file_path, &volume)?;
        let loaded = read_nifti(&file_path)?;

        assert_eq!(loaded.storage_kind(), StorageKind::MappedSource);
        assert_eq!(loaded.data(), volume.data());
        Ok(())
    }

    #[test]
    fn test_four_dimensional_channels() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("multi.nii.gz");
        let data: Vec<f32> = (0..2 * 2 * 2 * 3).map(|x| x as f32).collect();
        let volume = Volume::from_data(VolumeData::Owned(data), [2, 2, 2], 3, Affine::scaling([1.0, 1.0, 2.0]))?;

        write_nifti(&file_path, &volume)?;
        let loaded = read_nifti(&file_path)?;

        assert_eq!(loaded.channels(), 3);
        assert_eq!(loaded.dims(), vec![2, 2, 2, 3]);
        assert_eq!(loaded.get(1, 0, 1, 2), Some((1 + 2 * 2 * 1 + 8 * 2) as f32));
        Ok(())
    }

    #[test]
    fn test_header_affine_fallbacks() {
        let mut header = NiftiHeader::default();
        header.pixdim = [1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        header.sform_code = 0;
        header.qform_code = 0;
        assert_eq!(header_affine(&header).unwrap().voxel_sizes(), [2.0, 3.0, 4.0]);

        // Identity quaternion with qfac -1 flips the third axis.
        header.qform_code = 1;
        header.pixdim[0] = -1.0;
        header.quatern_x = 1.0;
        let rows = header_affine(&header).unwrap().to_rows();
        assert_eq!(rows[0], [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(rows[2][2], -4.0);
    }
}
