use crate::core::linalg::{mat3_identity, Mat3};

/// A detected scale-space feature point.
///
/// Created by extremum detection with integer coordinates, refined to
/// sub-voxel precision, then given a local rotation frame. Coordinates
/// `(xd, yd, zd)` and the integer voxel `(xi, yi, zi)` are in the detection
/// octave's voxel units; `sd` is the refined scale in base-octave units and
/// `sd_rel = sd * 2^-o` is the same scale in octave units.
#[derive(Debug, Clone)]
pub struct Keypoint {
    pub o: i32,
    pub s: i32,
    pub xi: i64,
    pub yi: i64,
    pub zi: i64,
    pub xd: f64,
    pub yd: f64,
    pub zd: f64,
    pub sd: f64,
    pub sd_rel: f64,
    /// Right-handed orthonormal local frame, eigenvectors in the columns
    pub r: Mat3,
}

impl Keypoint {
    /// Create a candidate at an integer extremum location
    #[must_use]
    pub fn new(o: i32, s: i32, xi: i64, yi: i64, zi: i64, sd: f64) -> Self {
        Self {
            o,
            s,
            xi,
            yi,
            zi,
            xd: xi as f64,
            yd: yi as f64,
            zd: zi as f64,
            sd,
            sd_rel: sd * 2.0f64.powi(-o),
            r: mat3_identity(),
        }
    }

    /// Position scaled to base-octave coordinates
    #[must_use]
    pub fn base_coords(&self) -> [f64; 3] {
        let f = 2.0f64.powi(self.o);
        [self.xd * f, self.yd * f, self.zd * f]
    }
}

/// Caller-owned list of keypoints, ordered by detection raster scan
pub type KeypointStore = Vec<Keypoint>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keypoint_defaults() {
        let kp = Keypoint::new(1, 0, 4, 5, 6, 3.2);
        assert_eq!(kp.xd, 4.0);
        assert_eq!(kp.yd, 5.0);
        assert_eq!(kp.zd, 6.0);
        assert!((kp.sd_rel - 1.6).abs() < 1e-12);
        assert_eq!(kp.r, mat3_identity());
    }

    #[test]
    fn test_base_coords_scaling() {
        let kp = Keypoint::new(2, 0, 3, 3, 3, 6.4);
        assert_eq!(kp.base_coords(), [12.0, 12.0, 12.0]);
    }
}
