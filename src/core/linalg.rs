//! Small fixed-size linear algebra for 3D frames.
//!
//! The pipeline only ever works with 3-vectors and 3x3 matrices, so these
//! are plain arrays with free functions rather than a matrix library.

use crate::error::{Error, Result};

pub type Vec3 = [f64; 3];
pub type Mat3 = [[f64; 3]; 3];

#[must_use]
pub fn dot3(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[must_use]
pub fn cross3(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[must_use]
pub fn norm_sq3(a: &Vec3) -> f64 {
    dot3(a, a)
}

#[must_use]
pub fn norm3(a: &Vec3) -> f64 {
    norm_sq3(a).sqrt()
}

#[must_use]
pub fn sub3(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[must_use]
pub fn scale3(a: &Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[must_use]
pub fn mat3_identity() -> Mat3 {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

/// m * v
#[must_use]
pub fn mat3_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// m^T * v
#[must_use]
pub fn mat3_tvec(m: &Mat3, v: &Vec3) -> Vec3 {
    [
        m[0][0] * v[0] + m[1][0] * v[1] + m[2][0] * v[2],
        m[0][1] * v[0] + m[1][1] * v[1] + m[2][1] * v[2],
        m[0][2] * v[0] + m[1][2] * v[1] + m[2][2] * v[2],
    ]
}

/// a * b
#[must_use]
pub fn mat3_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

#[must_use]
pub fn mat3_transpose(m: &Mat3) -> Mat3 {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

#[must_use]
pub fn det3(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Column i of m
#[must_use]
pub fn mat3_col(m: &Mat3, i: usize) -> Vec3 {
    [m[0][i], m[1][i], m[2][i]]
}

/// Eigendecomposition of a symmetric 3x3 matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in ascending order and the matching unit eigenvectors
/// as the columns of the returned matrix. Fails only if the sweep does not
/// converge, which for a symmetric input does not happen in practice.
pub fn sym_eigen3(a: &Mat3) -> Result<(Vec3, Mat3)> {
    let mut a = *a;
    let mut q = mat3_identity();

    let frob_sq: f64 = a.iter().flatten().map(|v| v * v).sum();
    if frob_sq == 0.0 {
        return Ok(([0.0; 3], q));
    }
    let off_thresh = frob_sq * 1e-24;

    const MAX_SWEEPS: usize = 64;
    let mut converged = false;

    for _ in 0..MAX_SWEEPS {
        let off_sq =
            a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off_sq <= off_thresh {
            converged = true;
            break;
        }

        for &(p, r, other) in &[(0usize, 1usize, 2usize), (0, 2, 1), (1, 2, 0)] {
            let apr = a[p][r];
            if apr == 0.0 {
                continue;
            }

            let theta = (a[r][r] - a[p][p]) / (2.0 * apr);
            let t = if theta >= 0.0 {
                1.0 / (theta + (theta * theta + 1.0).sqrt())
            } else {
                1.0 / (theta - (theta * theta + 1.0).sqrt())
            };
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            // Rotate a in the (p, r) plane
            let app = a[p][p];
            let arr = a[r][r];
            a[p][p] = app - t * apr;
            a[r][r] = arr + t * apr;
            a[p][r] = 0.0;
            a[r][p] = 0.0;

            let aop = a[other][p];
            let aor = a[other][r];
            a[other][p] = c * aop - s * aor;
            a[p][other] = a[other][p];
            a[other][r] = s * aop + c * aor;
            a[r][other] = a[other][r];

            // Accumulate the rotation into q
            for row in &mut q {
                let qp = row[p];
                let qr = row[r];
                row[p] = c * qp - s * qr;
                row[r] = s * qp + c * qr;
            }
        }
    }

    if !converged {
        let off_sq =
            a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off_sq > off_thresh {
            return Err(Error::Numerical(
                "Jacobi eigendecomposition did not converge".to_string(),
            ));
        }
    }

    let mut vals = [a[0][0], a[1][1], a[2][2]];

    // Sort ascending, permuting eigenvector columns to match
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| vals[i].partial_cmp(&vals[j]).unwrap());

    let sorted_vals = [vals[order[0]], vals[order[1]], vals[order[2]]];
    let mut sorted_q = mat3_identity();
    for (dst, &src) in order.iter().enumerate() {
        for row in 0..3 {
            sorted_q[row][dst] = q[row][src];
        }
    }
    vals = sorted_vals;

    Ok((vals, sorted_q))
}
