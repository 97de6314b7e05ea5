// Persisted store round-trip tests over real pipeline output

use sift3d_rust::core::Volume;
use sift3d_rust::features3d::{match_coords, match_descriptors, MatchParams, Sift3D};
use sift3d_rust::io::{
    read_descriptors, read_keypoints, read_match_coords, write_descriptors, write_keypoints,
    write_match_coords,
};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sift3d_test_{}_{}", std::process::id(), name))
}

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

/// A keypoint store round-trips with byte-equal coordinates
/// and rotation entries within 1e-12
#[test]
fn test_keypoint_store_round_trip() {
    let mut sift = detector();
    sift.set_image(&multi_blob_volume()).unwrap();
    let keypoints = sift.detect_keypoints().unwrap();
    assert!(!keypoints.is_empty());

    let path = temp_path("pipeline_kp.csv");
    write_keypoints(&path, &keypoints).unwrap();
    let back = read_keypoints(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(back.len(), keypoints.len());
    for (orig, read) in keypoints.iter().zip(back.iter()) {
        let [x, y, z] = orig.base_coords();
        // Shortest round-trip float formatting reproduces the exact bits
        assert_eq!(read.xd.to_bits(), x.to_bits());
        assert_eq!(read.yd.to_bits(), y.to_bits());
        assert_eq!(read.zd.to_bits(), z.to_bits());
        assert_eq!(read.sd.to_bits(), orig.sd.to_bits());

        for i in 0..3 {
            for j in 0..3 {
                assert!((read.r[i][j] - orig.r[i][j]).abs() < 1e-12);
            }
        }
    }
}

/// A descriptor store round-trips with every bin exactly equal
#[test]
fn test_descriptor_store_round_trip() {
    let mut sift = detector();
    let (_, descriptors) = sift.detect_and_extract(&multi_blob_volume()).unwrap();
    assert!(!descriptors.is_empty());

    let path = temp_path("pipeline_desc.csv");
    write_descriptors(&path, &descriptors).unwrap();
    let back = read_descriptors(&path, descriptors.kind).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(back.len(), descriptors.len());
    for (orig, read) in descriptors.descriptors.iter().zip(back.descriptors.iter()) {
        assert_eq!(orig.bins, read.bins);
        assert_eq!(orig.x.to_bits(), read.x.to_bits());
        assert_eq!(orig.sd.to_bits(), read.sd.to_bits());
    }
}

/// Gzipped stores round-trip identically
#[test]
fn test_gzipped_round_trip() {
    let mut sift = detector();
    sift.set_image(&multi_blob_volume()).unwrap();
    let keypoints = sift.detect_keypoints().unwrap();

    let path = temp_path("pipeline_kp.csv.gz");
    write_keypoints(&path, &keypoints).unwrap();
    let back = read_keypoints(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(back.len(), keypoints.len());
}

/// Match-pair files hold the two n x 3 coordinate matrices in match order
#[test]
fn test_match_pair_files() {
    let mut sift = detector();
    let (_, descriptors) = sift.detect_and_extract(&multi_blob_volume()).unwrap();

    let params = MatchParams {
        forward_backward: true,
        ..MatchParams::default()
    };
    let matches = match_descriptors(&descriptors, &descriptors, &params).unwrap();
    let (coords_a, coords_b) = match_coords(&descriptors, &descriptors, &matches);
    assert_eq!(coords_a.len(), coords_b.len());
    assert!(!coords_a.is_empty());

    let path_a = temp_path("matches_a.csv");
    let path_b = temp_path("matches_b.csv");
    write_match_coords(&path_a, &coords_a).unwrap();
    write_match_coords(&path_b, &coords_b).unwrap();

    let back_a = read_match_coords(&path_a).unwrap();
    let back_b = read_match_coords(&path_b).unwrap();
    std::fs::remove_file(&path_a).unwrap();
    std::fs::remove_file(&path_b).unwrap();

    assert_eq!(back_a, coords_a);
    assert_eq!(back_b, coords_b);
}
