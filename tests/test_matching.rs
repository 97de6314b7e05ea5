// Descriptor matching tests, including matching across a known rotation

use sift3d_rust::core::linalg::{mat3_mul, mat3_transpose, mat3_vec, Mat3};
use sift3d_rust::core::Volume;
use sift3d_rust::features3d::{match_descriptors, MatchParams, Sift3D};

type Blob = ([f64; 3], f64, f64);

const ROT_CENTER: [f64; 3] = [32.0, 32.0, 32.0];

fn base_blobs() -> Vec<Blob> {
    vec![
        ([32.0, 32.0, 32.0], 3.0, 1.0),
        ([40.0, 33.0, 31.0], 2.6, 0.8),
        ([27.0, 39.0, 36.0], 2.8, 0.6),
    ]
}

fn blob_field(blobs: &[Blob]) -> Volume {
    let n = 64;
    let mut im = Volume::new(n, n, n, 1).unwrap();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let mut v = 0.0f64;
                for (c, sigma, amp) in blobs {
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

fn z_rotation(angle: f64) -> Mat3 {
    let (s, c) = angle.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

/// Rotate blob centers about the z axis through ROT_CENTER; since the
/// blobs are isotropic this is an exact rotation of the continuous field
fn rotated_blobs(blobs: &[Blob], angle: f64) -> Vec<Blob> {
    let u = z_rotation(angle);
    blobs
        .iter()
        .map(|(c, sigma, amp)| {
            let d = [
                c[0] - ROT_CENTER[0],
                c[1] - ROT_CENTER[1],
                c[2] - ROT_CENTER[2],
            ];
            let rd = mat3_vec(&u, &d);
            (
                [
                    rd[0] + ROT_CENTER[0],
                    rd[1] + ROT_CENTER[1],
                    rd[2] + ROT_CENTER[2],
                ],
                *sigma,
                *amp,
            )
        })
        .collect()
}

fn detector() -> Sift3D {
    let mut sift = Sift3D::new().unwrap();
    sift.set_peak_thresh(0.01).unwrap();
    sift.set_corner_thresh(0.2).unwrap();
    sift
}

/// Rotation angle of the residual between two rotations
fn rotation_angle_between(a: &Mat3, b: &Mat3) -> f64 {
    let residual = mat3_mul(a, &mat3_transpose(b));
    let trace = residual[0][0] + residual[1][1] + residual[2][2];
    ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
}

/// Matching a volume against itself with the forward-backward
/// check returns the identity permutation
#[test]
fn test_self_match_is_identity() {
    let mut sift = detector();
    let (_, descriptors) = sift.detect_and_extract(&blob_field(&base_blobs())).unwrap();
    assert!(!descriptors.is_empty());

    let params = MatchParams {
        forward_backward: true,
        ..MatchParams::default()
    };
    let matches = match_descriptors(&descriptors, &descriptors, &params).unwrap();

    for (i, &j) in matches.iter().enumerate() {
        assert_eq!(j, i as i32, "descriptor {i} matched {j}");
    }
}

/// Matches come back in descriptor-index order of side A with -1 for
/// unmatched entries
#[test]
fn test_match_array_shape() {
    let mut sift = detector();
    let (_, desc_a) = sift.detect_and_extract(&blob_field(&base_blobs())).unwrap();

    let rotated = blob_field(&rotated_blobs(&base_blobs(), 0.5236));
    let mut sift_b = detector();
    let (_, desc_b) = sift_b.detect_and_extract(&rotated).unwrap();

    let matches = match_descriptors(&desc_a, &desc_b, &MatchParams::default()).unwrap();
    assert_eq!(matches.len(), desc_a.len());
    for &j in &matches {
        assert!(j >= -1 && j < desc_b.len() as i32);
    }
}

/// Descriptors match across a 30 degree z rotation, matched
/// positions agree with the known rotation, and the recovered frames
/// differ by approximately that rotation
#[test]
fn test_matching_across_rotation() {
    let angle = 30.0f64.to_radians();
    let u = z_rotation(angle);

    let mut sift_a = detector();
    let (kps_a, desc_a) = sift_a.detect_and_extract(&blob_field(&base_blobs())).unwrap();

    let mut sift_b = detector();
    let (kps_b, desc_b) = sift_b
        .detect_and_extract(&blob_field(&rotated_blobs(&base_blobs(), angle)))
        .unwrap();

    assert!(!desc_a.is_empty() && !desc_b.is_empty());

    let params = MatchParams {
        forward_backward: true,
        ..MatchParams::default()
    };
    let matches = match_descriptors(&desc_a, &desc_b, &params).unwrap();

    // Collect matched pairs with their position error under the known
    // rotation
    let mut pairs = Vec::new();
    for (i, &j) in matches.iter().enumerate() {
        if j < 0 {
            continue;
        }
        let a = &kps_a[i];
        let b = &kps_b[j as usize];

        let [ax, ay, az] = a.base_coords();
        let d = [
            ax - ROT_CENTER[0],
            ay - ROT_CENTER[1],
            az - ROT_CENTER[2],
        ];
        let rd = mat3_vec(&u, &d);
        let expect = [
            rd[0] + ROT_CENTER[0],
            rd[1] + ROT_CENTER[1],
            rd[2] + ROT_CENTER[2],
        ];

        let [bx, by, bz] = b.base_coords();
        let err = ((bx - expect[0]).powi(2)
            + (by - expect[1]).powi(2)
            + (bz - expect[2]).powi(2))
        .sqrt();
        pairs.push((i, j as usize, err));
    }

    assert!(
        !pairs.is_empty(),
        "no forward-backward matches across the rotation"
    );

    // The best pair localizes the rotated feature within 2 voxels
    let best = pairs
        .iter()
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
        .unwrap();
    assert!(
        best.2 < 2.0,
        "matched position error {} exceeds 2 voxels",
        best.2
    );

    // The recovered frames differ by approximately the applied rotation:
    // R_b ~ U * R_a
    let (i, j, _) = *best;
    let expected_rb = mat3_mul(&u, &kps_a[i].r);
    let frame_err = rotation_angle_between(&kps_b[j].r, &expected_rb);
    assert!(
        frame_err < 0.25,
        "frame residual {frame_err} rad from the applied rotation"
    );
}

/// Ratio threshold validation happens at match time
#[test]
fn test_match_rejects_nonpositive_thresh() {
    let mut sift = detector();
    let (_, desc) = sift.detect_and_extract(&blob_field(&base_blobs())).unwrap();

    let params = MatchParams {
        nn_thresh: 0.0,
        ..MatchParams::default()
    };
    assert!(match_descriptors(&desc, &desc, &params).is_err());
}
