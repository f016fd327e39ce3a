use trakt_core::geometry::Linear3;
use trakt_core::{
    build_new_affine, Affine, ChunkedResampler, CpuTensorBackend, HostBackend, InterpolationOrder,
    ResampleConfig, StorageKind, Vector3, Volume, VolumeData,
};

fn smooth_volume(shape: [usize; 3], affine: Affine) -> Volume {
    let [nx, ny, nz] = shape;
    let mut data = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let (x, y, z) = (i as f32, j as f32, k as f32);
                data.push((0.3 * x).sin() + (0.2 * y).cos() + 0.05 * z);
            }
        }
    }
    Volume::new(data, shape, affine).unwrap()
}

fn oblique_affine() -> Affine {
    let (s, c) = 0.3f64.sin_cos();
    let linear = Linear3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0) * 0.9;
    Affine::from_parts(linear, Vector3::new(-1.5, 2.0, 0.5))
}

#[test]
fn test_identity_resampling_reproduces_source() {
    let affine = Affine::from_parts(
        Linear3::from_diagonal(&Vector3::new(1.25, 1.25, 2.0)),
        Vector3::new(-20.0, 14.0, 3.0),
    );
    let source = smooth_volume([12, 10, 9], affine);
    let target = build_new_affine(&affine, source.shape(), [1.25, 1.25, 2.0], source.shape(), None).unwrap();

    let resampler = ChunkedResampler::new(HostBackend::new(2).unwrap(), ResampleConfig::default());
    let result = resampler.resample(&source, &target, source.shape()).unwrap();

    for (a, b) in source.data().iter().zip(result.volume().data()) {
        assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
    }
}

#[test]
fn test_chunk_shape_invariance() {
    let source = smooth_volume([24, 22, 20], Affine::identity());
    let target = oblique_affine();
    let shape = [30, 26, 21];

    let small = ChunkedResampler::new(
        HostBackend::new(4).unwrap(),
        ResampleConfig::default().with_chunk_shape([16, 16, 16]),
    )
    .resample(&source, &target, shape)
    .unwrap();
    let large = ChunkedResampler::new(
        HostBackend::new(1).unwrap(),
        ResampleConfig::default().with_chunk_shape([64, 64, 64]),
    )
    .resample(&source, &target, shape)
    .unwrap();
    let odd = ChunkedResampler::new(
        HostBackend::new(3).unwrap(),
        ResampleConfig::default().with_chunk_shape([7, 5, 3]),
    )
    .resample(&source, &target, shape)
    .unwrap();

    assert_eq!(small.volume().data(), large.volume().data());
    assert_eq!(odd.volume().data(), large.volume().data());
}

#[test]
fn test_host_and_tensor_backends_agree() {
    let source = smooth_volume([24, 24, 24], Affine::identity());
    let target = build_new_affine(source.affine(), source.shape(), 0.7, [20, 20, 20], None).unwrap();
    let config = ResampleConfig::default().with_chunk_shape([8, 8, 8]);

    for order in [InterpolationOrder::Linear, InterpolationOrder::Nearest] {
        let config = config.clone().with_order(order);
        let host = ChunkedResampler::new(HostBackend::new(2).unwrap(), config.clone())
            .resample(&source, &target, [20, 20, 20])
            .unwrap();
        let tensor = ChunkedResampler::new(CpuTensorBackend::default(), config)
            .resample(&source, &target, [20, 20, 20])
            .unwrap();

        for (a, b) in host.volume().data().iter().zip(tensor.volume().data()) {
            assert!((a - b).abs() < 1e-3, "{:?}: host {} tensor {}", order, a, b);
        }
    }
}

#[test]
fn test_out_of_bounds_yields_fill_value() {
    let source = smooth_volume([8, 8, 8], Affine::identity());
    let far = Affine::from_parts(Linear3::identity(), Vector3::new(100.0, 0.0, 0.0));
    let config = ResampleConfig::default().with_fill_value(-7.0);

    let host = ChunkedResampler::new(HostBackend::new(1).unwrap(), config.clone())
        .resample(&source, &far, [4, 4, 4])
        .unwrap();
    assert!(host.volume().data().iter().all(|&v| v == -7.0));

    let tensor = ChunkedResampler::new(CpuTensorBackend::default(), config)
        .resample(&source, &far, [4, 4, 4])
        .unwrap();
    assert!(tensor.volume().data().iter().all(|&v| (v + 7.0).abs() < 1e-6));
}

#[test]
fn test_partial_overlap_fills_outside_only() {
    let source = smooth_volume([8, 8, 8], Affine::identity());
    let shifted = Affine::from_parts(Linear3::identity(), Vector3::new(4.0, 0.0, 0.0));
    let result = ChunkedResampler::new(HostBackend::new(1).unwrap(), ResampleConfig::default())
        .resample(&source, &shifted, [8, 8, 8])
        .unwrap();
    let volume = result.volume();

    // Output i maps to source i + 4
    assert_eq!(volume.get(3, 2, 5, 0), source.get(7, 2, 5, 0));
    assert_eq!(volume.get(4, 2, 5, 0), Some(0.0));
    assert_eq!(volume.get(7, 7, 7, 0), Some(0.0));
}

#[test]
fn test_disk_backed_output_matches_in_memory() {
    let source = smooth_volume([16, 16, 16], Affine::identity());
    let target = oblique_affine();
    let shape = [18, 17, 16];

    let in_memory = ChunkedResampler::new(HostBackend::new(2).unwrap(), ResampleConfig::default())
        .resample(&source, &target, shape)
        .unwrap();
    let on_disk = ChunkedResampler::new(
        HostBackend::new(2).unwrap(),
        ResampleConfig::default().with_max_output_bytes(1024),
    )
    .resample(&source, &target, shape)
    .unwrap();

    assert!(!in_memory.is_disk_backed());
    assert!(on_disk.is_disk_backed());
    assert_eq!(on_disk.volume().storage_kind(), StorageKind::Scratch);
    assert_eq!(in_memory.volume().data(), on_disk.volume().data());

    let (volume, scratch) = on_disk.into_parts();
    let scratch = scratch.unwrap();
    let path = scratch.path().to_path_buf();
    assert!(path.exists());
    assert!(path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("trakt-resample-")));

    drop(volume);
    scratch.remove().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_multichannel_resampled_per_channel() {
    let base = smooth_volume([6, 6, 6], Affine::identity());
    let mut data = base.data().to_vec();
    data.extend(base.data().iter().map(|v| v * 2.0));
    let source = Volume::from_data(VolumeData::Owned(data), [6, 6, 6], 2, Affine::identity()).unwrap();

    let target = Affine::scaling([0.5, 0.5, 0.5]);
    let result = ChunkedResampler::new(HostBackend::new(2).unwrap(), ResampleConfig::default())
        .resample(&source, &target, [11, 11, 11])
        .unwrap();
    let volume = result.volume();

    assert_eq!(volume.channels(), 2);
    assert_eq!(volume.dims(), vec![11, 11, 11, 2]);
    for (a, b) in volume.channel(0).iter().zip(volume.channel(1)) {
        assert!((a * 2.0 - b).abs() < 1e-5);
    }
}
