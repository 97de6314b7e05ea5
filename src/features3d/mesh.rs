//! Icosahedral orientation mesh.
//!
//! Gradient directions are binned on the unit sphere using the 12 vertices
//! of a regular icosahedron; a direction populates the three bins of the
//! face its ray pierces, weighted by barycentric coordinates.

use crate::core::linalg::{cross3, dot3, norm_sq3, scale3, sub3, Vec3};

/// Number of orientation bins (icosahedron vertices)
pub const ICOS_NVERT: usize = 12;

/// Number of mesh faces
pub const ICOS_NFACES: usize = 20;

/// Rejection epsilon for the barycentric ray test
pub const BARY_EPS: f64 = f32::EPSILON as f64 * 10.0;

/// One triangular face with precomputed intersection edges
#[derive(Debug, Clone)]
pub struct Face {
    /// Unit-length vertex coordinates
    pub verts: [Vec3; 3],
    /// Orientation-bin index of each vertex, in [0, ICOS_NVERT)
    pub bins: [usize; 3],
    e1: Vec3,
    e2: Vec3,
}

/// Barycentric lookup result
#[derive(Debug, Clone, Copy)]
pub struct Bary {
    pub face: usize,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Scalar with `k * x = alpha*v0 + beta*v1 + gamma*v2`
    pub k: f64,
}

/// The 20-face icosahedral mesh, constructed once per pipeline
#[derive(Debug, Clone)]
pub struct Mesh {
    faces: Vec<Face>,
}

// Golden-ratio vertex table: permutations of (0, +/-1, +/-phi), scaled to
// the unit sphere on construction.
const VERT_TABLE: [[f64; 3]; ICOS_NVERT] = [
    [0.0, 1.0, GR],
    [0.0, -1.0, GR],
    [0.0, 1.0, -GR],
    [0.0, -1.0, -GR],
    [1.0, GR, 0.0],
    [-1.0, GR, 0.0],
    [1.0, -GR, 0.0],
    [-1.0, -GR, 0.0],
    [GR, 0.0, 1.0],
    [-GR, 0.0, 1.0],
    [GR, 0.0, -1.0],
    [-GR, 0.0, -1.0],
];

// (1 + sqrt(5)) / 2
const GR: f64 = 1.618033988749894848;

const FACE_TABLE: [[usize; 3]; ICOS_NFACES] = [
    // Cap around vertex 0
    [0, 1, 8],
    [0, 8, 4],
    [0, 4, 5],
    [0, 5, 9],
    [0, 9, 1],
    // Cap around vertex 3
    [3, 2, 10],
    [3, 10, 6],
    [3, 6, 7],
    [3, 7, 11],
    [3, 11, 2],
    // Middle band
    [1, 8, 6],
    [8, 10, 6],
    [8, 4, 10],
    [4, 10, 2],
    [4, 5, 2],
    [5, 2, 11],
    [5, 9, 11],
    [9, 11, 7],
    [9, 1, 7],
    [1, 7, 6],
];

impl Mesh {
    /// Build the canonical icosahedral mesh
    #[must_use]
    pub fn new() -> Self {
        let scale = 1.0 / (1.0 + GR * GR).sqrt();
        let verts: Vec<Vec3> = VERT_TABLE.iter().map(|v| scale3(v, scale)).collect();

        let faces = FACE_TABLE
            .iter()
            .map(|&idx| {
                let mut bins = idx;
                let mut v = [verts[idx[0]], verts[idx[1]], verts[idx[2]]];

                // Orient the face outward
                let n = face_normal(&v);
                if dot3(&n, &v[0]) < 0.0 {
                    v.swap(0, 1);
                    bins.swap(0, 1);
                }

                debug_assert!(dot3(&face_normal(&v), &v[0]) >= 0.0);
                debug_assert!(edges_equilateral(&v));

                let e1 = sub3(&v[1], &v[0]);
                let e2 = sub3(&v[2], &v[0]);
                Face {
                    verts: v,
                    bins,
                    e1,
                    e2,
                }
            })
            .collect();

        Self { faces }
    }

    #[must_use]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Find the face pierced by the ray from the origin through `x`.
    ///
    /// Returns the barycentric coordinates of the intersection and the ray
    /// scalar `k`, or `None` when `x` is too close to the origin for the
    /// ray test to be meaningful (`|x|^2 < BARY_EPS`).
    #[must_use]
    pub fn bary_lookup(&self, x: &Vec3) -> Option<Bary> {
        if norm_sq3(x) < BARY_EPS {
            return None;
        }

        // Moller-Trumbore against each face, first acceptance wins
        for (i, face) in self.faces.iter().enumerate() {
            let pvec = cross3(x, &face.e2);
            let det = dot3(&face.e1, &pvec);
            if det.abs() < BARY_EPS {
                continue;
            }
            let inv_det = 1.0 / det;

            // Ray origin is the mesh center, so tvec = -v0
            let tvec = scale3(&face.verts[0], -1.0);
            let beta = dot3(&tvec, &pvec) * inv_det;

            let qvec = cross3(&tvec, &face.e1);
            let gamma = dot3(x, &qvec) * inv_det;
            let k = dot3(&face.e2, &qvec) * inv_det;

            let alpha = 1.0 - beta - gamma;
            if alpha >= -BARY_EPS && beta >= -BARY_EPS && gamma >= -BARY_EPS && k >= 0.0 {
                debug_assert!(alpha.is_finite() && beta.is_finite() && gamma.is_finite());
                return Some(Bary {
                    face: i,
                    alpha,
                    beta,
                    gamma,
                    k,
                });
            }
        }

        // Unreachable for any direction of meaningful magnitude
        debug_assert!(false, "barycentric lookup found no face");
        None
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

fn face_normal(v: &[Vec3; 3]) -> Vec3 {
    cross3(&sub3(&v[2], &v[1]), &sub3(&v[1], &v[0]))
}

fn edges_equilateral(v: &[Vec3; 3]) -> bool {
    let e01 = norm_sq3(&sub3(&v[1], &v[0]));
    let e12 = norm_sq3(&sub3(&v[2], &v[1]));
    let e20 = norm_sq3(&sub3(&v[0], &v[2]));
    (e01 - e12).abs() < 1e-10 && (e12 - e20).abs() < 1e-10
}
