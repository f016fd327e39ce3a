//! TrackVis `.trk` reader and writer.
//!
//! Supports the 1000-byte little-endian header (versions 1 and 2), optionally
//! gzip-compressed when the path ends in `.gz`. Points are exchanged in RAS
//! millimetres or voxel indices; on disk they are TrackVis "voxmm", i.e. voxel
//! corner coordinates scaled by the voxel size.

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;
use trakt_core::{Affine, Point3, Shape3, Vector3};
use trakt_stream::Streamline;

/// Size of the TrackVis header in bytes.
pub const HEADER_SIZE: usize = 1000;

const MAGIC: [u8; 6] = *b"TRACK\0";
const NAME_LEN: usize = 20;
const MAX_NAMES: usize = 10;
/// Upper bound on capacity reserved from header counts before data is read.
const PREALLOC_LIMIT: usize = 1 << 16;

/// TrackVis header fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TrkHeader {
    pub dimensions: [i16; 3],
    pub voxel_sizes: [f32; 3],
    pub origin: [f32; 3],
    pub n_scalars: i16,
    pub scalar_names: [[u8; NAME_LEN]; MAX_NAMES],
    pub n_properties: i16,
    pub property_names: [[u8; NAME_LEN]; MAX_NAMES],
    /// Voxel-index to RAS mm affine, row-major. All zero in version 1 files.
    pub vox_to_ras: [[f32; 4]; 4],
    pub voxel_order: [u8; 4],
    pub image_orientation_patient: [f32; 6],
    /// invert_x, invert_y, invert_z, swap_xy, swap_yz, swap_zx.
    pub flags: [u8; 6],
    /// Number of streamlines; 0 means unknown, read until end of file.
    pub n_count: i32,
    pub version: i32,
}

impl Default for TrkHeader {
    fn default() -> Self {
        Self {
            dimensions: [1, 1, 1],
            voxel_sizes: [1.0, 1.0, 1.0],
            origin: [0.0; 3],
            n_scalars: 0,
            scalar_names: [[0; NAME_LEN]; MAX_NAMES],
            n_properties: 0,
            property_names: [[0; NAME_LEN]; MAX_NAMES],
            vox_to_ras: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            voxel_order: *b"RAS\0",
            image_orientation_patient: [0.0; 6],
            flags: [0; 6],
            n_count: 0,
            version: 2,
        }
    }
}

impl TrkHeader {
    /// Parse a header block.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        if bytes[..5] != MAGIC[..5] {
            bail!("Not a TrackVis file: bad magic {:?}", String::from_utf8_lossy(&bytes[..6]));
        }
        let mut cursor = Cursor::new(&bytes[..]);

        cursor.set_position(996);
        let hdr_size = cursor.read_i32::<LittleEndian>()?;
        if hdr_size != HEADER_SIZE as i32 {
            if hdr_size.swap_bytes() == HEADER_SIZE as i32 {
                bail!("Big-endian TrackVis files are not supported");
            }
            bail!("Invalid TrackVis header size {}", hdr_size);
        }

        let mut header = Self::default();
        cursor.set_position(6);
        cursor.read_i16_into::<LittleEndian>(&mut header.dimensions)?;
        cursor.read_f32_into::<LittleEndian>(&mut header.voxel_sizes)?;
        cursor.read_f32_into::<LittleEndian>(&mut header.origin)?;
        header.n_scalars = cursor.read_i16::<LittleEndian>()?;
        for name in header.scalar_names.iter_mut() {
            cursor.read_exact(name)?;
        }
        header.n_properties = cursor.read_i16::<LittleEndian>()?;
        for name in header.property_names.iter_mut() {
            cursor.read_exact(name)?;
        }
        for row in header.vox_to_ras.iter_mut() {
            cursor.read_f32_into::<LittleEndian>(row)?;
        }

        cursor.set_position(948);
        cursor.read_exact(&mut header.voxel_order)?;
        cursor.set_position(956);
        cursor.read_f32_into::<LittleEndian>(&mut header.image_orientation_patient)?;
        cursor.set_position(982);
        cursor.read_exact(&mut header.flags)?;
        header.n_count = cursor.read_i32::<LittleEndian>()?;
        header.version = cursor.read_i32::<LittleEndian>()?;

        if header.n_scalars < 0 || header.n_properties < 0 || header.n_count < 0 {
            bail!(
                "Invalid TrackVis counts: {} scalars, {} properties, {} streamlines",
                header.n_scalars,
                header.n_properties,
                header.n_count
            );
        }
        Ok(header)
    }

    /// Serialize to a header block.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut cursor = Cursor::new(&mut bytes[..]);

        cursor.write_all(&MAGIC)?;
        for v in self.dimensions {
            cursor.write_i16::<LittleEndian>(v)?;
        }
        for v in self.voxel_sizes.iter().chain(&self.origin) {
            cursor.write_f32::<LittleEndian>(*v)?;
        }
        cursor.write_i16::<LittleEndian>(self.n_scalars)?;
        for name in &self.scalar_names {
            cursor.write_all(name)?;
        }
        cursor.write_i16::<LittleEndian>(self.n_properties)?;
        for name in &self.property_names {
            cursor.write_all(name)?;
        }
        for v in self.vox_to_ras.iter().flatten() {
            cursor.write_f32::<LittleEndian>(*v)?;
        }

        cursor.set_position(948);
        cursor.write_all(&self.voxel_order)?;
        cursor.set_position(956);
        for v in self.image_orientation_patient {
            cursor.write_f32::<LittleEndian>(v)?;
        }
        cursor.set_position(982);
        cursor.write_all(&self.flags)?;
        cursor.write_i32::<LittleEndian>(self.n_count)?;
        cursor.write_i32::<LittleEndian>(self.version)?;
        cursor.write_i32::<LittleEndian>(HEADER_SIZE as i32)?;
        Ok(bytes)
    }

    /// Voxel-index to RAS mm affine.
    ///
    /// Files without one (version 1, or a zeroed matrix) fall back to plain
    /// voxel-size scaling.
    pub fn voxel_to_rasmm(&self) -> Result<Affine> {
        if self.vox_to_ras[3][3] == 0.0 {
            return Ok(Affine::scaling(self.voxel_sizes.map(f64::from)));
        }
        let rows = self.vox_to_ras.map(|row| row.map(f64::from));
        Ok(Affine::from_rows(rows)?)
    }

    /// Describe a new grid: dimensions, voxel sizes, `vox_to_ras` and voxel order.
    pub fn set_grid(&mut self, affine: &Affine, shape: Shape3) -> Result<()> {
        for (dim, &n) in self.dimensions.iter_mut().zip(&shape) {
            *dim = i16::try_from(n).with_context(|| format!("Grid extent {} does not fit a TrackVis header", n))?;
        }
        self.voxel_sizes = affine.voxel_sizes().map(|v| v as f32);
        self.vox_to_ras = affine.to_rows().map(|row| row.map(|v| v as f32));
        let codes = affine.axis_codes();
        self.voxel_order = [codes[0] as u8, codes[1] as u8, codes[2] as u8, 0];
        Ok(())
    }

    pub fn voxel_order_str(&self) -> String {
        String::from_utf8_lossy(&self.voxel_order).trim_end_matches('\0').to_string()
    }

    pub fn mean_voxel_size(&self) -> f64 {
        self.voxel_sizes.iter().map(|&v| f64::from(v)).sum::<f64>() / 3.0
    }
}

/// Coordinate space of a tractogram's points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointSpace {
    /// World coordinates in millimetres.
    #[default]
    RasMm,
    /// Voxel indices of the header's grid.
    Voxel,
}

/// Header plus streamlines.
#[derive(Debug, Clone, PartialEq)]
pub struct Tractogram {
    pub header: TrkHeader,
    pub streamlines: Vec<Streamline>,
    pub space: PointSpace,
}

impl Tractogram {
    pub fn new(header: TrkHeader, streamlines: Vec<Streamline>, space: PointSpace) -> Self {
        Self { header, streamlines, space }
    }

    /// Voxel-space streamlines on a new grid, reusing `template`'s other header fields.
    pub fn on_grid(template: &TrkHeader, affine: &Affine, shape: Shape3, streamlines: Vec<Streamline>) -> Result<Self> {
        let mut header = template.clone();
        header.set_grid(affine, shape)?;
        Ok(Self::new(header, streamlines, PointSpace::Voxel))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Read a tractogram; points are returned in RAS mm.
///
/// Per-point scalars are skipped with a warning; per-streamline properties
/// are kept.
pub fn read_trk<P: AsRef<Path>>(path: P) -> Result<Tractogram> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open TrackVis file {}", path.display()))?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut reader = BufReader::new(reader);

    let mut block = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut block)
        .with_context(|| format!("Failed to read TrackVis header of {}", path.display()))?;
    let header = TrkHeader::decode(&block)?;
    let to_ras = header.voxel_to_rasmm()?;
    let sizes = header.voxel_sizes.map(f64::from);
    if sizes.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
        bail!("Invalid TrackVis voxel sizes {:?}", header.voxel_sizes);
    }

    let n_scalars = header.n_scalars as usize;
    let n_properties = header.n_properties as usize;
    if n_scalars > 0 {
        tracing::warn!("Dropping {} per-point scalars from {}", n_scalars, path.display());
    }

    let mut streamlines = Vec::with_capacity((header.n_count as usize).min(PREALLOC_LIMIT));
    let mut record = vec![0.0f32; 3 + n_scalars];
    loop {
        if header.n_count > 0 && streamlines.len() == header.n_count as usize {
            break;
        }
        if header.n_count == 0 && reader.fill_buf()?.is_empty() {
            break;
        }
        let index = streamlines.len();
        let n_points = reader
            .read_i32::<LittleEndian>()
            .with_context(|| format!("Truncated TrackVis file at streamline {}", index))?;
        let n_points = usize::try_from(n_points).with_context(|| format!("Negative point count at streamline {}", index))?;
        if n_points.checked_mul(record.len() * 4).is_none() {
            bail!("Point count {} overflows at streamline {}", n_points, index);
        }

        // The count is untrusted until the points are actually read.
        let mut points = Vec::with_capacity(n_points.min(PREALLOC_LIMIT));
        for _ in 0..n_points {
            reader
                .read_f32_into::<LittleEndian>(&mut record)
                .with_context(|| format!("Truncated points at streamline {}", index))?;
            let voxel = Point3::new(
                f64::from(record[0]) / sizes[0] - 0.5,
                f64::from(record[1]) / sizes[1] - 0.5,
                f64::from(record[2]) / sizes[2] - 0.5,
            );
            points.push(to_ras.transform_point(&voxel));
        }

        let mut properties = vec![0.0f32; n_properties];
        reader
            .read_f32_into::<LittleEndian>(&mut properties)
            .with_context(|| format!("Truncated properties at streamline {}", index))?;
        streamlines.push(Streamline::new(index, points).with_properties(properties));
    }

    tracing::info!("Loaded {} streamlines from {}", streamlines.len(), path.display());
    let mut header = header;
    header.n_scalars = 0;
    header.scalar_names = [[0; NAME_LEN]; MAX_NAMES];
    Ok(Tractogram::new(header, streamlines, PointSpace::RasMm))
}

/// Write a tractogram.
///
/// RAS points go through the inverse of the header's `vox_to_ras`; voxel
/// points are stored directly as `(vox + 0.5) * voxel_size`.
pub fn write_trk<P: AsRef<Path>>(path: P, tractogram: &Tractogram) -> Result<()> {
    let path = path.as_ref();
    let mut header = tractogram.header.clone();
    let n_properties = tractogram.streamlines.first().map_or(0, |s| s.properties.len());
    if let Some(s) = tractogram.streamlines.iter().find(|s| s.properties.len() != n_properties) {
        bail!(
            "Streamline {} has {} properties, expected {}",
            s.index,
            s.properties.len(),
            n_properties
        );
    }
    header.n_scalars = 0;
    header.n_properties = i16::try_from(n_properties).context("Too many streamline properties")?;
    header.n_count = i32::try_from(tractogram.streamlines.len()).context("Too many streamlines for TrackVis")?;
    header.version = 2;

    let from_ras = match tractogram.space {
        PointSpace::RasMm => Some(header.voxel_to_rasmm()?.inverse()?),
        PointSpace::Voxel => None,
    };

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_records(&mut encoder, &header, &tractogram.streamlines, from_ras.as_ref())?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        write_records(&mut writer, &header, &tractogram.streamlines, from_ras.as_ref())?;
        writer.flush()?;
    }

    tracing::info!("Saved {} streamlines to {}", tractogram.streamlines.len(), path.display());
    Ok(())
}

fn write_records<W: Write>(
    writer: &mut W,
    header: &TrkHeader,
    streamlines: &[Streamline],
    from_ras: Option<&Affine>,
) -> Result<()> {
    let sizes = header.voxel_sizes.map(f64::from);
    let offset = Vector3::new(0.5, 0.5, 0.5);

    writer.write_all(&header.encode()?)?;
    for streamline in streamlines {
        writer.write_i32::<LittleEndian>(i32::try_from(streamline.len()).context("Streamline too long for TrackVis")?)?;
        for point in &streamline.points {
            let voxel = match from_ras {
                Some(inverse) => inverse.transform_point(point),
                None => *point,
            };
            let voxmm = voxel + offset;
            for axis in 0..3 {
                writer.write_f32::<LittleEndian>((voxmm[axis] * sizes[axis]) as f32)?;
            }
        }
        for &property in &streamline.properties {
            writer.write_f32::<LittleEndian>(property)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_round_trip() {
        let mut header = TrkHeader::default();
        header.dimensions = [116, 140, 96];
        header.voxel_sizes = [0.5, 0.5, 0.5];
        header.n_count = 7;
        header.property_names[0][..4].copy_from_slice(b"fa\0\0");

        let bytes = header.encode().unwrap();
        assert_eq!(&bytes[..6], b"TRACK\0");
        assert_eq!(i32::from_le_bytes([bytes[996], bytes[997], bytes[998], bytes[999]]), 1000);
        assert_eq!(TrkHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = TrkHeader::default().encode().unwrap();
        bytes[0] = b'X';
        assert!(TrkHeader::decode(&bytes).is_err());
    }

    #[test]
    fn test_oversized_counts_fail_cleanly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lying.trk");
        let mut header = TrkHeader::default();
        header.voxel_sizes = [1.0, 1.0, 1.0];
        header.n_count = i32::MAX;
        let mut bytes = header.encode().unwrap().to_vec();
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 24]);
        std::fs::write(&path, &bytes).unwrap();

        let err = read_trk(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Truncated points at streamline 0"), "{:#}", err);
    }

    #[test]
    fn test_set_grid() {
        let affine = Affine::from_rows([
            [-0.5, 0.0, 0.0, 30.0],
            [0.0, 0.5, 0.0, -40.0],
            [0.0, 0.0, 0.5, -20.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        let mut header = TrkHeader::default();
        header.set_grid(&affine, [116, 140, 96]).unwrap();

        assert_eq!(header.dimensions, [116, 140, 96]);
        assert_eq!(header.voxel_sizes, [0.5, 0.5, 0.5]);
        assert_eq!(header.vox_to_ras[0], [-0.5, 0.0, 0.0, 30.0]);
        assert_eq!(header.voxel_order_str(), "LAS");
        assert!(header.set_grid(&affine, [40_000, 1, 1]).is_err());
    }

    #[test]
    fn test_voxel_points_written_as_voxmm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vox.trk");
        let mut header = TrkHeader::default();
        header.set_grid(&Affine::scaling([2.0, 2.0, 2.0]), [10, 10, 10]).unwrap();
        let s = Streamline::new(0, vec![Point3::new(0.0, 1.0, 2.0), Point3::new(3.0, 4.0, 5.0)]);
        write_trk(&path, &Tractogram::new(header, vec![s], PointSpace::Voxel)).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let mut cursor = Cursor::new(&bytes[HEADER_SIZE..]);
        assert_eq!(cursor.read_i32::<LittleEndian>().unwrap(), 2);
        let mut coords = [0.0f32; 6];
        cursor.read_f32_into::<LittleEndian>(&mut coords).unwrap();
        assert_eq!(coords, [1.0, 3.0, 5.0, 7.0, 9.0, 11.0]);

        // Reading maps back to RAS mm through vox_to_ras.
        let loaded = read_trk(&path).unwrap();
        assert_eq!(loaded.space, PointSpace::RasMm);
        assert!((loaded.streamlines[0].points[1] - Point3::new(6.0, 8.0, 10.0)).norm() < 1e-5);
    }
}
