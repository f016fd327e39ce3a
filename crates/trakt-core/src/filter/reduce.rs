//! Axis reduction over resampled volumes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::ComputeBackend;
use crate::error::{ResampleError, Result};
use crate::geometry::Shape3;
use crate::volume::{Volume, VolumeData};

/// Axis reduced by default (`j`).
pub const DEFAULT_REDUCTION_AXIS: usize = 1;

/// Projection applied along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    /// Maximum intensity projection.
    MaxProjection,
    /// Mean along the axis.
    Mean,
}

impl FromStr for Reduction {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mip" | "max" => Ok(Self::MaxProjection),
            "mean" => Ok(Self::Mean),
            other => Err(ResampleError::invalid_configuration(format!(
                "unsupported reduction method '{}', expected 'mip' or 'mean'",
                other
            ))),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxProjection => write!(f, "mip"),
            Self::Mean => write!(f, "mean"),
        }
    }
}

/// Shape after reducing `axis`.
pub fn reduced_shape(shape: Shape3, axis: usize) -> Shape3 {
    let mut out = shape;
    out[axis] = 1;
    out
}

pub(crate) fn check_axis(axis: usize) -> Result<()> {
    if axis > 2 {
        return Err(ResampleError::invalid_configuration(format!(
            "reduction axis must be 0, 1 or 2, got {}",
            axis
        )));
    }
    Ok(())
}

/// Scalar reduction of a single-channel buffer in `i`-fastest order.
pub fn reduce_host(data: &[f32], shape: Shape3, reduction: Reduction, axis: usize) -> Result<Vec<f32>> {
    check_axis(axis)?;
    let [nx, ny, nz] = shape;
    let out_shape = reduced_shape(shape, axis);
    let strides = [1, nx, nx * ny];
    let extent = shape[axis];
    let stride = strides[axis];

    let mut out = Vec::with_capacity(out_shape.iter().product());
    for k in 0..out_shape[2] {
        for j in 0..out_shape[1] {
            for i in 0..out_shape[0] {
                let base = i + nx * (j + ny * k);
                let values = (0..extent).map(|n| data[base + n * stride]);
                let value = match reduction {
                    Reduction::MaxProjection => values.fold(f32::NEG_INFINITY, f32::max),
                    Reduction::Mean => (values.map(f64::from).sum::<f64>() / extent as f64) as f32,
                };
                out.push(value);
            }
        }
    }
    debug_assert_eq!(out.len(), nx * ny * nz / extent);
    Ok(out)
}

/// Reduce every channel of `volume` along `axis` with `backend`.
///
/// The reduced axis keeps extent 1 and the affine is unchanged. The result
/// is held in memory.
pub fn reduce_volume<Bk: ComputeBackend>(
    backend: &Bk,
    volume: &Volume,
    reduction: Reduction,
    axis: usize,
) -> Result<Volume> {
    check_axis(axis)?;
    let shape = volume.shape();
    let out_shape = reduced_shape(shape, axis);
    tracing::info!(
        "Applying {} reduction along axis {} using {} backend: {:?} -> {:?}",
        reduction,
        axis,
        backend.name(),
        shape,
        out_shape
    );

    let mut data = Vec::new();
    for channel in 0..volume.channels() {
        data.extend(backend.reduce(volume.channel(channel), shape, reduction, axis)?);
    }
    Volume::from_data(VolumeData::Owned(data), out_shape, volume.channels(), *volume.affine())
}
