//! Scale-space extremum detection and sub-voxel refinement.

use crate::core::Volume;
use crate::error::Result;
use crate::features3d::keypoints::{Keypoint, KeypointStore};
use crate::features3d::pyramid::Pyramid;

/// Maximum sub-voxel refinement iterations per keypoint
pub const MAX_REFINE_ITERS: usize = 5;

// Keeps refined coordinates strictly below the upper interior bound
const POS_EPS: f64 = 1e-6;

/// Sub-voxel refinement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefineMode {
    /// Independent per-axis parabolic steps (the classical SIFT3D default)
    #[default]
    Parabolic,
    /// Full 4x4 Newton step on the scale-space Hessian
    Newton,
}

/// Scan the DoG pyramid for local scale-space extrema.
///
/// Every interior voxel of every level except the first and last of each
/// octave is tested against a per-level effective threshold
/// `peak_thresh * max|level|` and against its scale-space neighborhood:
/// the 6 face neighbors in the same level (all 26 with `cuboid`) and the
/// full 3x3x3 blocks of both adjacent levels. Candidates are emitted in
/// raster-scan order.
pub fn detect_extrema(dog: &Pyramid, peak_thresh: f64, cuboid: bool) -> Result<KeypointStore> {
    let mut keypoints = KeypointStore::new();

    for o in dog.first_octave()..=dog.last_octave() {
        for s in (dog.first_level() + 1)..dog.last_level() {
            let prev = dog.level(o, s - 1);
            let cur = dog.level(o, s);
            let next = dog.level(o, s + 1);

            let (nx, ny, nz) = cur.dims();
            if nx < 3 || ny < 3 || nz < 3 {
                continue;
            }

            let thresh = peak_thresh * f64::from(cur.max_abs());

            for z in 1..nz - 1 {
                for y in 1..ny - 1 {
                    for x in 1..nx - 1 {
                        let p = f64::from(cur.get(x, y, z));
                        if p.abs() <= thresh {
                            continue;
                        }

                        if is_extremum(p, prev, cur, next, x, y, z, cuboid) {
                            keypoints.push(Keypoint::new(
                                o,
                                s,
                                x as i64,
                                y as i64,
                                z as i64,
                                cur.scale(),
                            ));
                        }
                    }
                }
            }
        }
    }

    Ok(keypoints)
}

fn is_extremum(
    p: f64,
    prev: &Volume,
    cur: &Volume,
    next: &Volume,
    x: usize,
    y: usize,
    z: usize,
    cuboid: bool,
) -> bool {
    fn compare(p: f64, v: f64, is_max: &mut bool, is_min: &mut bool) {
        if p <= v {
            *is_max = false;
        }
        if p >= v {
            *is_min = false;
        }
    }

    let mut is_max = true;
    let mut is_min = true;

    // Same level, center excluded
    if cuboid {
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let v = cur.get(
                        (x as i64 + dx) as usize,
                        (y as i64 + dy) as usize,
                        (z as i64 + dz) as usize,
                    );
                    compare(p, f64::from(v), &mut is_max, &mut is_min);
                }
            }
        }
    } else {
        for v in [
            cur.get(x + 1, y, z),
            cur.get(x - 1, y, z),
            cur.get(x, y + 1, z),
            cur.get(x, y - 1, z),
            cur.get(x, y, z + 1),
            cur.get(x, y, z - 1),
        ] {
            compare(p, f64::from(v), &mut is_max, &mut is_min);
        }
    }

    if !is_max && !is_min {
        return false;
    }

    // Both adjacent scale levels, centers included
    for level in [prev, next] {
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let v = level.get(
                        (x as i64 + dx) as usize,
                        (y as i64 + dy) as usize,
                        (z as i64 + dz) as usize,
                    );
                    compare(p, f64::from(v), &mut is_max, &mut is_min);
                }
            }
        }
        if !is_max && !is_min {
            return false;
        }
    }

    is_max || is_min
}

/// Refine every candidate to sub-voxel position and scale.
///
/// Refinement clamps rather than rejects, so the store length is unchanged.
pub fn refine_keypoints(dog: &Pyramid, keypoints: &mut KeypointStore, mode: RefineMode) {
    for kp in keypoints.iter_mut() {
        refine_one(dog, kp, mode);
    }
}

fn refine_one(dog: &Pyramid, kp: &mut Keypoint, mode: RefineMode) {
    let o = kp.o;
    let s = kp.s;

    let (nx, ny, nz) = dog.level(o, s).dims();
    let x_max = ((nx - 2) as f64 - POS_EPS).max(1.0);
    let y_max = ((ny - 2) as f64 - POS_EPS).max(1.0);
    let z_max = ((nz - 2) as f64 - POS_EPS).max(1.0);

    let sigma_prev = dog.level(o, s - 1).scale();
    let sigma_cur = dog.level(o, s).scale();
    let sigma_next = dog.level(o, s + 1).scale();
    // Geometric level spacing, identical between adjacent levels
    let ratio = sigma_next / sigma_cur;

    for _ in 0..MAX_REFINE_ITERS {
        let offsets = match mode {
            RefineMode::Parabolic => Some(parabolic_offsets(dog, kp)),
            RefineMode::Newton => newton_offsets(dog, kp),
        };

        // A singular Newton system accepts the current estimate
        let Some([dx, dy, dz, ds]) = offsets else {
            break;
        };

        kp.xd = (kp.xi as f64 + dx).clamp(1.0, x_max);
        kp.yd = (kp.yi as f64 + dy).clamp(1.0, y_max);
        kp.zd = (kp.zi as f64 + dz).clamp(1.0, z_max);
        kp.sd = (sigma_cur * ratio.powf(ds)).clamp(sigma_prev, sigma_next);

        let xi = kp.xd.floor() as i64;
        let yi = kp.yd.floor() as i64;
        let zi = kp.zd.floor() as i64;

        if xi == kp.xi && yi == kp.yi && zi == kp.zi {
            break;
        }
        kp.xi = xi;
        kp.yi = yi;
        kp.zi = zi;
    }

    kp.sd_rel = kp.sd * 2.0f64.powi(-o);
}

// One independent parabolic step per axis, evaluated at the current
// integer coordinates
fn parabolic_offsets(dog: &Pyramid, kp: &Keypoint) -> [f64; 4] {
    let prev = dog.level(kp.o, kp.s - 1);
    let cur = dog.level(kp.o, kp.s);
    let next = dog.level(kp.o, kp.s + 1);

    let (x, y, z) = (kp.xi as usize, kp.yi as usize, kp.zi as usize);
    let d0 = f64::from(cur.get(x, y, z));

    let step = |d_pos: f64, d_neg: f64| {
        let off = -0.5 * (d_pos - d_neg) / (d_pos - d_neg + 2.0 * d0);
        if off.is_finite() {
            off
        } else {
            0.0
        }
    };

    [
        step(
            f64::from(cur.get(x + 1, y, z)),
            f64::from(cur.get(x - 1, y, z)),
        ),
        step(
            f64::from(cur.get(x, y + 1, z)),
            f64::from(cur.get(x, y - 1, z)),
        ),
        step(
            f64::from(cur.get(x, y, z + 1)),
            f64::from(cur.get(x, y, z - 1)),
        ),
        step(f64::from(next.get(x, y, z)), f64::from(prev.get(x, y, z))),
    ]
}

// Newton step on the 4D scale-space quadratic: solves H * delta = -grad.
// Returns None when the Hessian is singular.
fn newton_offsets(dog: &Pyramid, kp: &Keypoint) -> Option<[f64; 4]> {
    let prev = dog.level(kp.o, kp.s - 1);
    let cur = dog.level(kp.o, kp.s);
    let next = dog.level(kp.o, kp.s + 1);

    let (x, y, z) = (kp.xi as usize, kp.yi as usize, kp.zi as usize);
    let at = |im: &Volume, dx: i64, dy: i64, dz: i64| {
        f64::from(im.get(
            (x as i64 + dx) as usize,
            (y as i64 + dy) as usize,
            (z as i64 + dz) as usize,
        ))
    };

    let d0 = at(cur, 0, 0, 0);

    let grad = [
        0.5 * (at(cur, 1, 0, 0) - at(cur, -1, 0, 0)),
        0.5 * (at(cur, 0, 1, 0) - at(cur, 0, -1, 0)),
        0.5 * (at(cur, 0, 0, 1) - at(cur, 0, 0, -1)),
        0.5 * (at(next, 0, 0, 0) - at(prev, 0, 0, 0)),
    ];

    let dxx = at(cur, 1, 0, 0) + at(cur, -1, 0, 0) - 2.0 * d0;
    let dyy = at(cur, 0, 1, 0) + at(cur, 0, -1, 0) - 2.0 * d0;
    let dzz = at(cur, 0, 0, 1) + at(cur, 0, 0, -1) - 2.0 * d0;
    let dss = at(next, 0, 0, 0) + at(prev, 0, 0, 0) - 2.0 * d0;

    let dxy = 0.25 * (at(cur, 1, 1, 0) + at(cur, -1, -1, 0) - at(cur, 1, -1, 0) - at(cur, -1, 1, 0));
    let dxz = 0.25 * (at(cur, 1, 0, 1) + at(cur, -1, 0, -1) - at(cur, 1, 0, -1) - at(cur, -1, 0, 1));
    let dyz = 0.25 * (at(cur, 0, 1, 1) + at(cur, 0, -1, -1) - at(cur, 0, 1, -1) - at(cur, 0, -1, 1));

    let dxs = 0.25 * (at(next, 1, 0, 0) - at(next, -1, 0, 0) - at(prev, 1, 0, 0) + at(prev, -1, 0, 0));
    let dys = 0.25 * (at(next, 0, 1, 0) - at(next, 0, -1, 0) - at(prev, 0, 1, 0) + at(prev, 0, -1, 0));
    let dzs = 0.25 * (at(next, 0, 0, 1) - at(next, 0, 0, -1) - at(prev, 0, 0, 1) + at(prev, 0, 0, -1));

    let h = [
        [dxx, dxy, dxz, dxs],
        [dxy, dyy, dyz, dys],
        [dxz, dyz, dzz, dzs],
        [dxs, dys, dzs, dss],
    ];
    let rhs = [-grad[0], -grad[1], -grad[2], -grad[3]];

    solve4(h, rhs)
}

// Gaussian elimination with partial pivoting on a 4x4 system
fn solve4(mut a: [[f64; 4]; 4], mut b: [f64; 4]) -> Option<[f64; 4]> {
    const PIVOT_EPS: f64 = 1e-12;

    for col in 0..4 {
        let mut pivot = col;
        for row in (col + 1)..4 {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < PIVOT_EPS {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..4 {
            let factor = a[row][col] / a[col][col];
            for k in col..4 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 4];
    for col in (0..4).rev() {
        let mut sum = b[col];
        for k in (col + 1)..4 {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve4_identity() {
        let a = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let x = solve4(a, [1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(x, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_solve4_singular() {
        let a = [[0.0; 4]; 4];
        assert!(solve4(a, [1.0, 0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_solve4_general() {
        let a = [
            [2.0, 1.0, 0.0, 0.0],
            [1.0, 3.0, 1.0, 0.0],
            [0.0, 1.0, 4.0, 1.0],
            [0.0, 0.0, 1.0, 5.0],
        ];
        let expect = [1.0, -1.0, 2.0, 0.5];
        let mut b = [0.0; 4];
        for i in 0..4 {
            for j in 0..4 {
                b[i] += a[i][j] * expect[j];
            }
        }
        let x = solve4(a, b).unwrap();
        for i in 0..4 {
            assert!((x[i] - expect[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_parabolic_step_centered_peak() {
        // Symmetric peak: offsets vanish
        let mut dog = Pyramid::new();
        dog.reshape((5, 5, 5), 0, 1, -1, 3).unwrap();
        for l in -1..=1 {
            let level = dog.level_mut(0, l);
            level.set_scale(1.0 + 0.26 * (l + 1) as f64);
            let peak = if l == 0 { 1.0 } else { 0.5 };
            level.set(2, 2, 2, peak);
            level.set(1, 2, 2, 0.25);
            level.set(3, 2, 2, 0.25);
            level.set(2, 1, 2, 0.25);
            level.set(2, 3, 2, 0.25);
            level.set(2, 2, 1, 0.25);
            level.set(2, 2, 3, 0.25);
        }

        let mut kps = vec![Keypoint::new(0, 0, 2, 2, 2, dog.level(0, 0).scale())];
        refine_keypoints(&dog, &mut kps, RefineMode::Parabolic);

        let kp = &kps[0];
        assert!((kp.xd - 2.0).abs() < 1e-12);
        assert!((kp.yd - 2.0).abs() < 1e-12);
        assert!((kp.zd - 2.0).abs() < 1e-12);
        assert_eq!(kp.xi, 2);
    }

    #[test]
    fn test_refined_scale_stays_bracketed() {
        let mut dog = Pyramid::new();
        dog.reshape((5, 5, 5), 0, 1, -1, 3).unwrap();
        for l in -1..=1 {
            let level = dog.level_mut(0, l);
            level.set_scale(2.0f64.powf(l as f64 / 3.0));
            level.set(2, 2, 2, (0.5 + 0.5 * l as f64) as f32);
        }

        let mut kps = vec![Keypoint::new(0, 0, 2, 2, 2, dog.level(0, 0).scale())];
        let sigma_prev = dog.level(0, -1).scale();
        let sigma_next = dog.level(0, 1).scale();
        refine_keypoints(&dog, &mut kps, RefineMode::Parabolic);

        assert!(kps[0].sd >= sigma_prev && kps[0].sd <= sigma_next);
    }
}
