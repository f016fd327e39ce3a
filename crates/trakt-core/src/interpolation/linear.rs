//! Trilinear interpolation.
//!
//! Sources are flat buffers in `i`-fastest order. Coordinates outside the
//! grid yield the fill value.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::{inside, EDGE_TOLERANCE};
use crate::geometry::Shape3;

/// Sample `data` at the continuous voxel coordinate `coord = (i, j, k)`.
pub fn sample(data: &[f32], shape: Shape3, coord: [f64; 3], fill: f32) -> f32 {
    if !inside(coord, shape) {
        return fill;
    }
    let [nx, ny, nz] = shape;

    let x = coord[0].clamp(0.0, (nx - 1) as f64);
    let y = coord[1].clamp(0.0, (ny - 1) as f64);
    let z = coord[2].clamp(0.0, (nz - 1) as f64);

    let x0 = x.floor();
    let y0 = y.floor();
    let z0 = z.floor();
    let wx = x - x0;
    let wy = y - y0;
    let wz = z - z0;

    let x0 = x0 as usize;
    let y0 = y0 as usize;
    let z0 = z0 as usize;
    let x1 = (x0 + 1).min(nx - 1);
    let y1 = (y0 + 1).min(ny - 1);
    let z1 = (z0 + 1).min(nz - 1);

    let at = |i: usize, j: usize, k: usize| data[i + nx * (j + ny * k)] as f64;

    // Along X
    let c00 = at(x0, y0, z0) * (1.0 - wx) + at(x1, y0, z0) * wx;
    let c01 = at(x0, y0, z1) * (1.0 - wx) + at(x1, y0, z1) * wx;
    let c10 = at(x0, y1, z0) * (1.0 - wx) + at(x1, y1, z0) * wx;
    let c11 = at(x0, y1, z1) * (1.0 - wx) + at(x1, y1, z1) * wx;

    // Along Y
    let c0 = c00 * (1.0 - wy) + c10 * wy;
    let c1 = c01 * (1.0 - wy) + c11 * wy;

    // Along Z
    (c0 * (1.0 - wz) + c1 * wz) as f32
}

/// Batched trilinear gather.
///
/// `flat_data` is the source flattened in `i`-fastest order, `coords` is
/// `[N, 3]` with columns `(i, j, k)`.
pub fn sample_tensor<B: Backend>(
    flat_data: &Tensor<B, 1>,
    shape: Shape3,
    coords: Tensor<B, 2>,
    fill: f32,
) -> Tensor<B, 1> {
    let [nx, ny, nz] = shape;
    let batch_size = coords.dims()[0];
    let device = coords.device();

    let x = coords.clone().narrow(1, 0, 1).squeeze::<1>(1);
    let y = coords.clone().narrow(1, 1, 1).squeeze::<1>(1);
    let z = coords.narrow(1, 2, 1).squeeze::<1>(1);

    let mask = inside_mask(&x, nx) * inside_mask(&y, ny) * inside_mask(&z, nz);

    let x = x.clamp(0.0, (nx - 1) as f64);
    let y = y.clamp(0.0, (ny - 1) as f64);
    let z = z.clamp(0.0, (nz - 1) as f64);

    let x0 = x.clone().floor();
    let y0 = y.clone().floor();
    let z0 = z.clone().floor();

    let wx = x - x0.clone();
    let wy = y - y0.clone();
    let wz = z - z0.clone();

    let x1_i = (x0.clone() + 1.0).clamp(0.0, (nx - 1) as f64).int();
    let y1_i = (y0.clone() + 1.0).clamp(0.0, (ny - 1) as f64).int();
    let z1_i = (z0.clone() + 1.0).clamp(0.0, (nz - 1) as f64).int();
    let x0_i = x0.int();
    let y0_i = y0.int();
    let z0_i = z0.int();

    // Strides for i-fastest layout
    let stride_y = nx as i32;
    let stride_z = (nx * ny) as i32;

    let v000 = gather_3d(flat_data, &x0_i, &y0_i, &z0_i, stride_y, stride_z);
    let v001 = gather_3d(flat_data, &x0_i, &y0_i, &z1_i, stride_y, stride_z);
    let v010 = gather_3d(flat_data, &x0_i, &y1_i, &z0_i, stride_y, stride_z);
    let v011 = gather_3d(flat_data, &x0_i, &y1_i, &z1_i, stride_y, stride_z);
    let v100 = gather_3d(flat_data, &x1_i, &y0_i, &z0_i, stride_y, stride_z);
    let v101 = gather_3d(flat_data, &x1_i, &y0_i, &z1_i, stride_y, stride_z);
    let v110 = gather_3d(flat_data, &x1_i, &y1_i, &z0_i, stride_y, stride_z);
    let v111 = gather_3d(flat_data, &x1_i, &y1_i, &z1_i, stride_y, stride_z);

    let one = Tensor::<B, 1>::ones([batch_size], &device);
    let one_minus_wx = one.clone() - wx.clone();
    let one_minus_wy = one.clone() - wy.clone();
    let one_minus_wz = one.clone() - wz.clone();

    let c00 = v000 * one_minus_wx.clone() + v100 * wx.clone();
    let c01 = v001 * one_minus_wx.clone() + v101 * wx.clone();
    let c10 = v010 * one_minus_wx.clone() + v110 * wx.clone();
    let c11 = v011 * one_minus_wx + v111 * wx;

    let c0 = c00 * one_minus_wy.clone() + c10 * wy.clone();
    let c1 = c01 * one_minus_wy + c11 * wy;

    let value = c0 * one_minus_wz + c1 * wz;
    value * mask.clone() + (one - mask) * fill
}

/// 1.0 where `coord` lies in `[0, n - 1]` (within tolerance), else 0.0.
pub(crate) fn inside_mask<B: Backend>(coord: &Tensor<B, 1>, n: usize) -> Tensor<B, 1> {
    let low = coord.clone().greater_equal_elem(-EDGE_TOLERANCE).float();
    let high = coord
        .clone()
        .lower_equal_elem((n - 1) as f64 + EDGE_TOLERANCE)
        .float();
    low * high
}

#[inline]
pub(crate) fn gather_3d<B: Backend>(
    flat_data: &Tensor<B, 1>,
    xi: &Tensor<B, 1, Int>,
    yi: &Tensor<B, 1, Int>,
    zi: &Tensor<B, 1, Int>,
    stride_y: i32,
    stride_z: i32,
) -> Tensor<B, 1> {
    let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
    flat_data.clone().gather(0, idx)
}
