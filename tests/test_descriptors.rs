// Orientation and descriptor extraction tests

use sift3d_rust::core::linalg::{det3, mat3_mul, mat3_transpose};
use sift3d_rust::core::Volume;
use sift3d_rust::features3d::Sift3D;

/// Asymmetric arrangement of Gaussian blobs; gradients around the overlap
/// regions give keypoints stable orientation frames
fn multi_blob_volume() -> Volume {
    let blobs: [([f64; 3], f64, f64); 3] = [
        ([32.0, 32.0, 32.0], 3.0, 1.0),
        ([40.0, 33.0, 31.0], 2.6, 0.8),
        ([27.0, 39.0, 36.0], 2.8, 0.6),
    ];

    let n = 64;
    let mut im = Volume::new(n, n, n, 1).unwrap();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let mut v = 0.0f64;
                for (c, sigma, amp) in &blobs {
                    let dx = x as f64 - c[0];
                    let dy = y as f64 - c[1];
                    let dz = z as f64 - c[2];
                    let r_sq = dx * dx + dy * dy + dz * dz;
                    v += amp * (-r_sq / (2.0 * sigma * sigma)).exp();
                }
                im.set(x, y, z, v as f32);
            }
        }
    }
    im
}

fn detector() -> Sift3D {
    let mut sift = Sift3D::new().unwrap();
    sift.set_peak_thresh(0.01).unwrap();
    sift.set_corner_thresh(0.2).unwrap();
    sift
}

/// Every emitted rotation is orthonormal with determinant +1
#[test]
fn test_orientation_matrices_are_rotations() {
    let mut sift = detector();
    sift.set_image(&multi_blob_volume()).unwrap();
    let keypoints = sift.detect_keypoints().unwrap();
    assert!(
        !keypoints.is_empty(),
        "expected oriented keypoints in the blob arrangement"
    );

    for kp in &keypoints {
        let rt = mat3_transpose(&kp.r);
        let prod = mat3_mul(&rt, &kp.r);
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (prod[i][j] - expect).abs() < 1e-5,
                    "R^T R [{i}][{j}] = {}",
                    prod[i][j]
                );
            }
        }
        assert!(det3(&kp.r) > 0.0);
        assert!((det3(&kp.r) - 1.0).abs() < 1e-5);
    }
}

/// Descriptors are unit L2 norm over the whole concatenated
/// bin vector after normalize-truncate-renormalize
#[test]
fn test_descriptor_norms() {
    let mut sift = detector();
    let (keypoints, descriptors) = sift.detect_and_extract(&multi_blob_volume()).unwrap();

    assert_eq!(keypoints.len(), descriptors.len());
    assert!(!descriptors.is_empty());

    for desc in &descriptors.descriptors {
        assert_eq!(desc.bins.len(), 768);
        let norm_sq: f64 = desc
            .bins
            .iter()
            .map(|&b| f64::from(b) * f64::from(b))
            .sum();
        let norm = norm_sq.sqrt();
        assert!(
            (norm - 1.0).abs() < 1e-5,
            "descriptor norm {norm} at ({}, {}, {})",
            desc.x,
            desc.y,
            desc.z
        );
    }
}

/// Descriptor locations are reported in base-octave coordinates within
/// the volume bounds
#[test]
fn test_descriptor_locations_in_bounds() {
    let mut sift = detector();
    let (_, descriptors) = sift.detect_and_extract(&multi_blob_volume()).unwrap();

    for desc in &descriptors.descriptors {
        assert!(desc.x >= 0.0 && desc.x < 64.0);
        assert!(desc.y >= 0.0 && desc.y < 64.0);
        assert!(desc.z >= 0.0 && desc.z < 64.0);
        assert!(desc.sd > 0.0);
    }
}

/// Dense extraction produces a 12-channel volume of the input shape
#[test]
fn test_dense_descriptor_volume() {
    let im = multi_blob_volume();
    let sift = detector();

    let dense = sift.extract_dense(&im, false).unwrap();
    assert_eq!(dense.dims(), im.dims());
    assert_eq!(dense.channels(), 12);

    // Histogram energy concentrates where the input has signal
    let center_norm: f64 = (0..12)
        .map(|c| f64::from(dense.get_chan(36, 33, 32, c)))
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt();
    let corner_norm: f64 = (0..12)
        .map(|c| f64::from(dense.get_chan(2, 2, 2, c)))
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt();
    assert!(center_norm > corner_norm);
}

/// Dense extraction rejects multi-channel input
#[test]
fn test_dense_rejects_multichannel() {
    let im = Volume::new(16, 16, 16, 2).unwrap();
    let sift = detector();
    assert!(sift.extract_dense(&im, false).is_err());
}
