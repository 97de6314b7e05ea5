/// Visit every interior voxel within a sphere.
///
/// `center` is in integer-voxel coordinates; the callback receives each
/// voxel (x, y, z) with `dist_sq`, the squared distance from its coordinate
/// to `center`. Voxels in the 1-voxel border are never visited, so gradient
/// reads inside the callback stay interior.
pub fn for_each_sphere_voxel<F>(
    center: [f64; 3],
    radius: f64,
    dims: (usize, usize, usize),
    mut f: F,
) where
    F: FnMut(usize, usize, usize, f64),
{
    let (nx, ny, nz) = dims;
    if nx < 3 || ny < 3 || nz < 3 || radius <= 0.0 {
        return;
    }

    let lo = |c: f64| ((c - radius).floor().max(1.0)) as i64;
    let hi = |c: f64, n: usize| ((c + radius).ceil().min((n - 2) as f64)) as i64;

    let (x0, x1) = (lo(center[0]), hi(center[0], nx));
    let (y0, y1) = (lo(center[1]), hi(center[1], ny));
    let (z0, z1) = (lo(center[2]), hi(center[2], nz));

    let r_sq = radius * radius;

    for z in z0..=z1 {
        let dz = z as f64 - center[2];
        for y in y0..=y1 {
            let dy = y as f64 - center[1];
            for x in x0..=x1 {
                let dx = x as f64 - center[0];
                let dist_sq = dx * dx + dy * dy + dz * dz;
                if dist_sq <= r_sq {
                    f(x as usize, y as usize, z as usize, dist_sq);
                }
            }
        }
    }
}
