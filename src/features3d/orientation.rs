//! Eigenvector-based orientation assignment.
//!
//! The local frame comes from the gradient structure tensor accumulated
//! over a Gaussian-weighted spherical window; its eigenvectors give the
//! axes, disambiguated in sign by the windowed gradient sum.

use crate::core::linalg::{cross3, dot3, mat3_col, norm3, norm_sq3, sym_eigen3, Mat3};
use crate::core::Volume;
use crate::error::{Outcome, Result};
use crate::features3d::keypoints::Keypoint;
use crate::imgproc::{for_each_sphere_voxel, gradient_at};

/// Window sigma as a multiple of the keypoint scale
pub const ORI_SIG_FCTR: f64 = 1.5;

/// Window radius as a multiple of the window sigma
pub const ORI_RAD_FCTR: f64 = 3.0;

/// Minimum squared norm of the windowed gradient sum
pub const ORI_GRAD_THRESH: f64 = 1e-10;

/// Maximum ratio between adjacent structure-tensor eigenvalues
pub const MAX_EIG_RATIO: f64 = 0.90;

/// Assign a rotation frame to one refined keypoint from the Gaussian
/// pyramid level it was detected in.
///
/// Returns `Reject` for keypoints whose local gradient field is too weak,
/// too isotropic, or too poorly aligned with the candidate axes to give a
/// stable frame.
pub fn assign_orientation(
    level: &Volume,
    kp: &Keypoint,
    corner_thresh: f64,
) -> Result<Outcome<Mat3>> {
    let sigma = ORI_SIG_FCTR * kp.sd_rel;
    let radius = sigma * ORI_RAD_FCTR;
    let center = [kp.xd, kp.yd, kp.zd];

    // Weighted structure tensor and windowed gradient sum
    let mut a = [[0.0f64; 3]; 3];
    let mut g_win = [0.0f64; 3];

    for_each_sphere_voxel(center, radius, level.dims(), |x, y, z, dist_sq| {
        let w = (-0.5 * dist_sq / (sigma * sigma)).exp();
        let g = gradient_at(level, x, y, z);

        for i in 0..3 {
            for j in 0..3 {
                a[i][j] += w * g[i] * g[j];
            }
            g_win[i] += g[i];
        }
    });

    if norm_sq3(&g_win) < ORI_GRAD_THRESH {
        return Ok(Outcome::Reject);
    }

    // Eigenvalues ascending; non-convergence is an unstable point
    let Ok((vals, q)) = sym_eigen3(&a) else {
        return Ok(Outcome::Reject);
    };

    // Adjacent eigenvalues within 10% of each other make the frame ambiguous
    for i in 0..2 {
        if (vals[i] / vals[i + 1]).abs() > MAX_EIG_RATIO {
            return Ok(Outcome::Reject);
        }
    }

    let g_norm = norm3(&g_win);
    let mut r = [[0.0f64; 3]; 3];

    // The two dominant eigenvectors, sign-aligned with the gradient sum
    for i in 0..2 {
        let mut v = mat3_col(&q, 2 - i);
        let d = dot3(&g_win, &v);

        // Corner score: cosine between the gradient sum and the axis
        if d.abs() / (norm3(&v) * g_norm) < corner_thresh {
            return Ok(Outcome::Reject);
        }

        if d < 0.0 {
            v = [-v[0], -v[1], -v[2]];
        }
        for row in 0..3 {
            r[row][i] = v[row];
        }
    }

    // Complete a right-handed orthonormal frame
    let v0 = mat3_col(&r, 0);
    let v1 = mat3_col(&r, 1);
    let v2 = cross3(&v0, &v1);
    for row in 0..3 {
        r[row][2] = v2[row];
    }

    Ok(Outcome::Accept(r))
}
