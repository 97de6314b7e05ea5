//! Rotation-invariant gradient histogram descriptors.
//!
//! Each keypoint gets a 4x4x4 grid of orientation histograms accumulated
//! over a Gaussian-weighted spherical window, with window coordinates and
//! gradients projected into the keypoint frame. The orientation bins are
//! icosahedral by default; a spherical-coordinate binning is available as
//! an alternate mode.

use crate::core::linalg::{mat3_tvec, norm3, Vec3};
use crate::core::Volume;
use crate::error::{Error, Result};
use crate::features3d::keypoints::Keypoint;
use crate::features3d::mesh::{Mesh, ICOS_NVERT};
use crate::features3d::pyramid::Pyramid;
use crate::imgproc::{for_each_sphere_voxel, gradient_at};
use std::f64::consts::PI;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Histograms per spatial dimension
pub const NHIST_PER_DIM: usize = 4;

/// Total histograms per descriptor
pub const DESC_NUM_TOTAL_HIST: usize = NHIST_PER_DIM * NHIST_PER_DIM * NHIST_PER_DIM;

/// Window sigma as a multiple of the keypoint scale
pub const DESC_SIG_FCTR: f64 = 7.071067811865475244; // 5 * sqrt(2)

/// Window radius as a multiple of the window sigma
pub const DESC_RAD_FCTR: f64 = 2.0;

/// Azimuth bins of the spherical histogram variant
pub const NBINS_AZ: usize = 8;

/// Polar bins of the spherical histogram variant
pub const NBINS_PO: usize = 4;

/// Orientation histogram binning mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistKind {
    /// 12 bins on the vertices of a regular icosahedron
    #[default]
    Icosahedral,
    /// 8 azimuth x 4 polar spherical-coordinate bins
    Spherical,
}

impl HistKind {
    /// Bins per histogram
    #[must_use]
    pub fn numel(self) -> usize {
        match self {
            HistKind::Icosahedral => ICOS_NVERT,
            HistKind::Spherical => NBINS_AZ * NBINS_PO,
        }
    }
}

/// Per-bin truncation threshold applied between the two normalization passes
#[must_use]
pub fn trunc_thresh(kind: HistKind) -> f64 {
    0.2 * 128.0 / (DESC_NUM_TOTAL_HIST * kind.numel()) as f64
}

/// One extracted descriptor, located in base-octave coordinates
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub sd: f64,
    /// Spatial-cell-major bins: cell (x, y, z) with x slowest, then the
    /// orientation bins of that cell's histogram
    pub bins: Vec<f32>,
}

/// Caller-owned list of descriptors sharing one binning mode
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    pub kind: HistKind,
    pub descriptors: Vec<Descriptor>,
}

impl DescriptorStore {
    #[must_use]
    pub fn new(kind: HistKind) -> Self {
        Self {
            kind,
            descriptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Bins per descriptor for this store's mode
    #[must_use]
    pub fn numel(&self) -> usize {
        DESC_NUM_TOTAL_HIST * self.kind.numel()
    }
}

/// Accumulate one gradient direction into a histogram.
///
/// Icosahedral mode splits `mag` across the three vertex bins of the face
/// pierced by `dir` using barycentric weights; spherical mode interpolates
/// over the 2x2 angular neighborhood with a circular azimuth and a polar
/// wrap that shifts the azimuth by half a turn across the poles. Directions
/// too small to bin are dropped.
pub(crate) fn add_to_hist(hist: &mut [f32], mesh: &Mesh, kind: HistKind, dir: &Vec3, mag: f64) {
    match kind {
        HistKind::Icosahedral => {
            let Some(bary) = mesh.bary_lookup(dir) else {
                return;
            };
            let face = &mesh.faces()[bary.face];
            hist[face.bins[0]] += (mag * bary.alpha) as f32;
            hist[face.bins[1]] += (mag * bary.beta) as f32;
            hist[face.bins[2]] += (mag * bary.gamma) as f32;
        }
        HistKind::Spherical => {
            let norm = norm3(dir);
            if norm < 1e-12 {
                return;
            }

            let az = dir[1].atan2(dir[0]).rem_euclid(2.0 * PI);
            let po = (dir[2] / norm).clamp(-1.0, 1.0).acos();

            let fa = az / (2.0 * PI / NBINS_AZ as f64) - 0.5;
            let fp = po / (PI / NBINS_PO as f64) - 0.5;

            let a0 = fa.floor();
            let p0 = fp.floor();
            let da = fa - a0;
            let dp = fp - p0;

            for (ai, wa) in [(a0 as i64, 1.0 - da), (a0 as i64 + 1, da)] {
                for (pi, wp) in [(p0 as i64, 1.0 - dp), (p0 as i64 + 1, dp)] {
                    let (a, p) = wrap_sph_bins(ai, pi);
                    hist[p * NBINS_AZ + a] += (mag * wa * wp) as f32;
                }
            }
        }
    }
}

// Azimuth wraps circularly; crossing a pole flips the azimuth by half a turn
fn wrap_sph_bins(a: i64, p: i64) -> (usize, usize) {
    let (mut a, p) = if p < 0 {
        (a + (NBINS_AZ / 2) as i64, 0)
    } else if p >= NBINS_PO as i64 {
        (a + (NBINS_AZ / 2) as i64, NBINS_PO - 1)
    } else {
        (a, p as usize)
    };
    a = a.rem_euclid(NBINS_AZ as i64);
    (a as usize, p)
}

/// Divide each bin by its relative solid angle (spherical mode only)
pub(crate) fn solid_angle_reweight(hist: &mut [f32], kind: HistKind) {
    if kind != HistKind::Spherical {
        return;
    }

    let mean_solid_angle = 4.0 * PI / (NBINS_AZ * NBINS_PO) as f64;
    let d_az = 2.0 * PI / NBINS_AZ as f64;

    for p in 0..NBINS_PO {
        let theta_lo = p as f64 * PI / NBINS_PO as f64;
        let theta_hi = (p + 1) as f64 * PI / NBINS_PO as f64;
        let solid_angle = d_az * (theta_lo.cos() - theta_hi.cos());
        let w = (solid_angle / mean_solid_angle) as f32;
        for a in 0..NBINS_AZ {
            hist[p * NBINS_AZ + a] /= w;
        }
    }
}

/// L2-normalize, truncate each bin, and renormalize over the whole vector
pub(crate) fn normalize_truncate(bins: &mut [f32], thresh: f64) {
    l2_normalize(bins);
    let t = thresh as f32;
    for b in bins.iter_mut() {
        if *b > t {
            *b = t;
        }
    }
    l2_normalize(bins);
}

fn l2_normalize(bins: &mut [f32]) {
    let norm_sq: f64 = bins.iter().map(|&b| f64::from(b) * f64::from(b)).sum();
    if norm_sq > 0.0 {
        let inv = (1.0 / norm_sq.sqrt()) as f32;
        for b in bins.iter_mut() {
            *b *= inv;
        }
    }
}

/// Extract descriptors for every keypoint in the store.
///
/// Each keypoint reads the Gaussian pyramid level it was detected in; the
/// output coordinates are scaled to base-octave units.
pub fn extract_descriptors(
    gpyr: &Pyramid,
    mesh: &Mesh,
    keypoints: &[Keypoint],
    kind: HistKind,
    solid_angle: bool,
) -> Result<DescriptorStore> {
    if gpyr.is_empty() {
        return Err(Error::UnsupportedOperation(
            "Descriptor extraction requires a built pyramid".to_string(),
        ));
    }

    #[cfg(feature = "rayon")]
    let iter = keypoints.par_iter();
    #[cfg(not(feature = "rayon"))]
    let iter = keypoints.iter();

    let descriptors = iter
        .map(|kp| extract_one(gpyr.level(kp.o, kp.s), mesh, kp, kind, solid_angle))
        .collect();

    Ok(DescriptorStore { kind, descriptors })
}

fn extract_one(
    level: &Volume,
    mesh: &Mesh,
    kp: &Keypoint,
    kind: HistKind,
    solid_angle: bool,
) -> Descriptor {
    let numel = kind.numel();
    let mut bins = vec![0.0f32; DESC_NUM_TOTAL_HIST * numel];

    let sigma_d = kp.sd_rel * DESC_SIG_FCTR;
    let r_d = DESC_RAD_FCTR * sigma_d;
    let w_d = r_d / std::f64::consts::SQRT_2;
    let h_d = w_d / 2.0;
    let beta = NHIST_PER_DIM as f64 / w_d;

    let center = [kp.xd, kp.yd, kp.zd];

    for_each_sphere_voxel(center, r_d, level.dims(), |x, y, z, dist_sq| {
        // Continuous voxel center relative to the keypoint
        let v_im = [
            x as f64 + 0.5 - kp.xd,
            y as f64 + 0.5 - kp.yd,
            z as f64 + 0.5 - kp.zd,
        ];

        // Project into the keypoint frame
        let v_kp = mat3_tvec(&kp.r, &v_im);

        let v_bins = [
            (v_kp[0] + h_d) * beta,
            (v_kp[1] + h_d) * beta,
            (v_kp[2] + h_d) * beta,
        ];
        if v_bins
            .iter()
            .any(|&v| v < 0.0 || v >= NHIST_PER_DIM as f64)
        {
            return;
        }

        let g = gradient_at(level, x, y, z);
        let mag = norm3(&g);
        let w = (-0.5 * dist_sq / (sigma_d * sigma_d)).exp();
        let g_rot = mat3_tvec(&kp.r, &g);

        // Trilinear interpolation over the surrounding spatial cells
        let c = [
            v_bins[0].floor() as i64,
            v_bins[1].floor() as i64,
            v_bins[2].floor() as i64,
        ];
        let f = [
            v_bins[0] - c[0] as f64,
            v_bins[1] - c[1] as f64,
            v_bins[2] - c[2] as f64,
        ];

        for dx in 0..2i64 {
            let cx = c[0] + dx;
            if cx < 0 || cx >= NHIST_PER_DIM as i64 {
                continue;
            }
            let wx = if dx == 0 { 1.0 - f[0] } else { f[0] };
            for dy in 0..2i64 {
                let cy = c[1] + dy;
                if cy < 0 || cy >= NHIST_PER_DIM as i64 {
                    continue;
                }
                let wy = if dy == 0 { 1.0 - f[1] } else { f[1] };
                for dz in 0..2i64 {
                    let cz = c[2] + dz;
                    if cz < 0 || cz >= NHIST_PER_DIM as i64 {
                        continue;
                    }
                    let wz = if dz == 0 { 1.0 - f[2] } else { f[2] };

                    let cell = ((cx as usize * NHIST_PER_DIM) + cy as usize) * NHIST_PER_DIM
                        + cz as usize;
                    let hist = &mut bins[cell * numel..(cell + 1) * numel];
                    add_to_hist(hist, mesh, kind, &g_rot, mag * w * wx * wy * wz);
                }
            }
        }
    });

    if solid_angle {
        for cell in 0..DESC_NUM_TOTAL_HIST {
            solid_angle_reweight(&mut bins[cell * numel..(cell + 1) * numel], kind);
        }
    }
    normalize_truncate(&mut bins, trunc_thresh(kind));

    let [x, y, z] = kp.base_coords();
    Descriptor {
        x,
        y,
        z,
        sd: kp.sd,
        bins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::linalg::mat3_identity;

    #[test]
    fn test_hist_kind_numel() {
        assert_eq!(HistKind::Icosahedral.numel(), 12);
        assert_eq!(HistKind::Spherical.numel(), 32);
    }

    #[test]
    fn test_trunc_thresh_defaults() {
        // 0.2 * 128 / 768
        assert!((trunc_thresh(HistKind::Icosahedral) - 0.2 * 128.0 / 768.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_to_hist_icosahedral_conserves_mass() {
        let mesh = Mesh::new();
        let mut hist = vec![0.0f32; 12];
        add_to_hist(&mut hist, &mesh, HistKind::Icosahedral, &[0.2, -0.8, 0.4], 2.0);

        let sum: f32 = hist.iter().sum();
        // alpha + beta + gamma = 1 up to the barycentric epsilon
        assert!((sum - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_add_to_hist_spherical_conserves_mass() {
        let mesh = Mesh::new();
        let mut hist = vec![0.0f32; 32];
        add_to_hist(&mut hist, &mesh, HistKind::Spherical, &[0.3, 0.5, -0.7], 1.5);

        let sum: f32 = hist.iter().sum();
        assert!((sum - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_add_to_hist_zero_direction_dropped() {
        let mesh = Mesh::new();
        let mut hist = vec![0.0f32; 12];
        add_to_hist(&mut hist, &mesh, HistKind::Icosahedral, &[0.0, 0.0, 0.0], 1.0);
        assert!(hist.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_wrap_sph_bins() {
        assert_eq!(wrap_sph_bins(3, 1), (3, 1));
        // Azimuth is circular
        assert_eq!(wrap_sph_bins(-1, 1), (7, 1));
        assert_eq!(wrap_sph_bins(8, 2), (0, 2));
        // Crossing the poles shifts the azimuth by half a turn
        assert_eq!(wrap_sph_bins(0, -1), (4, 0));
        assert_eq!(wrap_sph_bins(1, 4), (5, 3));
    }

    #[test]
    fn test_normalize_truncate_unit_norm() {
        let mut bins = vec![0.0f32; 768];
        bins[0] = 10.0;
        bins[5] = 3.0;
        bins[700] = 1.0;

        normalize_truncate(&mut bins, trunc_thresh(HistKind::Icosahedral));

        let norm: f64 = bins.iter().map(|&b| f64::from(b) * f64::from(b)).sum();
        assert!((norm.sqrt() - 1.0).abs() < 1e-5);

        // The three survivors were clamped equal, so they renormalize to
        // identical weights
        assert!((bins[0] - bins[5]).abs() < 1e-6);
        assert!((bins[5] - bins[700]).abs() < 1e-6);
    }

    #[test]
    fn test_extract_empty_pyramid_fails() {
        let gpyr = Pyramid::new();
        let mesh = Mesh::new();
        let kps = vec![Keypoint::new(0, 0, 2, 2, 2, 1.6)];
        assert!(extract_descriptors(&gpyr, &mesh, &kps, HistKind::Icosahedral, false).is_err());
    }

    #[test]
    fn test_descriptor_positions_scale_with_octave() {
        let mut gpyr = Pyramid::new();
        gpyr.reshape((16, 16, 16), 0, 2, -1, 6).unwrap();

        let mut kp = Keypoint::new(1, 0, 4, 4, 4, 3.2);
        kp.r = mat3_identity();

        let mesh = Mesh::new();
        let store =
            extract_descriptors(&gpyr, &mesh, &[kp], HistKind::Icosahedral, false).unwrap();
        assert_eq!(store.len(), 1);
        let d = &store.descriptors[0];
        assert_eq!((d.x, d.y, d.z), (8.0, 8.0, 8.0));
        assert_eq!(d.bins.len(), 768);
    }
}
