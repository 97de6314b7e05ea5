use crate::core::linalg::Vec3;
use crate::core::Volume;

/// Central-difference gradient of channel 0 at an interior voxel.
///
/// Callers guarantee `1 <= x <= nx - 2` (same for y, z); this is checked
/// only in debug builds.
#[inline]
#[must_use]
pub fn gradient_at(im: &Volume, x: usize, y: usize, z: usize) -> Vec3 {
    let (nx, ny, nz) = im.dims();
    debug_assert!(x >= 1 && x <= nx - 2);
    debug_assert!(y >= 1 && y <= ny - 2);
    debug_assert!(z >= 1 && z <= nz - 2);
    let _ = (nx, ny, nz);

    let gx = 0.5 * (f64::from(im.get(x + 1, y, z)) - f64::from(im.get(x - 1, y, z)));
    let gy = 0.5 * (f64::from(im.get(x, y + 1, z)) - f64::from(im.get(x, y - 1, z)));
    let gz = 0.5 * (f64::from(im.get(x, y, z + 1)) - f64::from(im.get(x, y, z - 1)));

    [gx, gy, gz]
}
