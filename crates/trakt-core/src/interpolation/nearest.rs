//! Nearest neighbour interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::inside;
use super::linear::{gather_3d, inside_mask};
use crate::geometry::Shape3;

/// Sample `data` at the voxel nearest to `coord`.
pub fn sample(data: &[f32], shape: Shape3, coord: [f64; 3], fill: f32) -> f32 {
    if !inside(coord, shape) {
        return fill;
    }
    let [nx, ny, nz] = shape;
    let nearest = |c: f64, n: usize| c.round().clamp(0.0, (n - 1) as f64) as usize;
    let i = nearest(coord[0], nx);
    let j = nearest(coord[1], ny);
    let k = nearest(coord[2], nz);
    data[i + nx * (j + ny * k)]
}

/// Batched nearest neighbour gather over `[N, 3]` coordinates.
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

    let x_i = x.round().clamp(0.0, (nx - 1) as f64).int();
    let y_i = y.round().clamp(0.0, (ny - 1) as f64).int();
    let z_i = z.round().clamp(0.0, (nz - 1) as f64).int();

    let value = gather_3d(flat_data, &x_i, &y_i, &z_i, nx as i32, (nx * ny) as i32);
    let one = Tensor::<B, 1>::ones([batch_size], &device);
    value * mask.clone() + (one - mask) * fill
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nearest_rounding() {
        // data[i + 2 * j]: [[0, 1], [2, 3]] in the k = 0 plane
        let data = vec![0.0, 1.0, 2.0, 3.0];
        let shape = [2, 2, 1];
        assert_eq!(sample(&data, shape, [0.4, 0.4, 0.0], 0.0), 0.0);
        assert_eq!(sample(&data, shape, [0.6, 0.6, 0.0], 0.0), 3.0);
        assert_eq!(sample(&data, shape, [1.0, 0.0, 0.0], 0.0), 1.0);
        assert_eq!(sample(&data, shape, [0.0, 2.0, 0.0], 9.0), 9.0);
    }

    #[test]
    fn test_nearest_tensor_matches_host() {
        let device = Default::default();
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let shape = [2, 3, 4];
        let coords = [[0.2, 1.7, 2.9], [1.0, 0.0, 3.0], [0.9, 2.2, 0.4], [5.0, 0.0, 0.0]];

        let flat = Tensor::<TestBackend, 1>::from_data(TensorData::new(data.clone(), [24]), &device);
        let coord_values: Vec<f32> = coords.iter().flat_map(|c| c.iter().map(|&v| v as f32)).collect();
        let coord_tensor = Tensor::<TestBackend, 2>::from_data(TensorData::new(coord_values, [4, 3]), &device);

        let values = sample_tensor(&flat, shape, coord_tensor, 0.0)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();

        for (coord, value) in coords.iter().zip(values.iter()) {
            assert_eq!(sample(&data, shape, *coord, 0.0), *value);
        }
    }
}
