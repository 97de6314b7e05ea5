use crate::core::Volume;
use crate::error::{Error, Result};
use num_traits::Float;

/// Kernel half-width as a multiple of sigma
pub const GAUSS_WIDTH_FCTR: f64 = 3.0;

/// Normalize filter taps to unit sum
fn normalize_taps<T: Float>(taps: &mut [T]) {
    let sum = taps.iter().fold(T::zero(), |acc, &t| acc + t);
    if sum > T::zero() {
        for t in taps.iter_mut() {
            *t = *t / sum;
        }
    }
}

/// Create a normalized 1D Gaussian kernel for the given sigma.
///
/// The half-width is `ceil(3 * sigma)`, at least 1; a non-positive sigma
/// yields the identity kernel.
#[must_use]
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    if sigma <= 0.0 {
        return vec![1.0];
    }

    let half = (sigma * GAUSS_WIDTH_FCTR).ceil().max(1.0) as i64;
    let width = (2 * half + 1) as usize;

    let mut taps = vec![0.0f32; width];
    for (i, tap) in taps.iter_mut().enumerate() {
        let x = i as f64 - half as f64;
        *tap = (-x * x / (2.0 * sigma * sigma)).exp() as f32;
    }

    normalize_taps(&mut taps);
    taps
}

/// Separable 1D FIR convolution applied along each of the three axes.
///
/// Borders are handled by clamping to the edge voxel. Works channelwise, so
/// multi-channel volumes (the dense descriptor output) are filtered per
/// channel. `dst` is resized to match `src`; the scale attribute is copied
/// unchanged and callers that blur update it themselves.
pub fn apply_sep_fir(src: &Volume, dst: &mut Volume, kernel: &[f32]) -> Result<()> {
    if kernel.is_empty() || kernel.len() % 2 == 0 {
        return Err(Error::InvalidParameter(
            "FIR kernel width must be odd".to_string(),
        ));
    }

    dst.copy_dims_from(src)?;
    dst.set_scale(src.scale());

    let mut tmp = Volume::new(src.nx(), src.ny(), src.nz(), src.channels())?;

    convolve_axis(src, dst, kernel, Axis::X)?;
    convolve_axis(dst, &mut tmp, kernel, Axis::Y)?;
    convolve_axis(&tmp, dst, kernel, Axis::Z)?;

    Ok(())
}

/// Gaussian blur with a kernel derived from sigma
pub fn gaussian_blur(src: &Volume, dst: &mut Volume, sigma: f64) -> Result<()> {
    let kernel = gaussian_kernel(sigma);
    apply_sep_fir(src, dst, &kernel)
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
    Z,
}

fn convolve_axis(src: &Volume, dst: &mut Volume, kernel: &[f32], axis: Axis) -> Result<()> {
    dst.copy_dims_from(src)?;
    dst.set_scale(src.scale());

    let (nx, ny, nz) = src.dims();
    let nc = src.channels();
    let radius = (kernel.len() / 2) as i64;

    let axis_len = match axis {
        Axis::X => nx,
        Axis::Y => ny,
        Axis::Z => nz,
    } as i64;

    let src_data = src.data();
    let dst_data = dst.data_mut();

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let base = ((z * ny + y) * nx + x) * nc;
                let pos = match axis {
                    Axis::X => x,
                    Axis::Y => y,
                    Axis::Z => z,
                } as i64;

                for c in 0..nc {
                    let mut value = 0.0f32;
                    for (k, &tap) in kernel.iter().enumerate() {
                        let p = (pos + k as i64 - radius).clamp(0, axis_len - 1) as usize;
                        let idx = match axis {
                            Axis::X => ((z * ny + y) * nx + p) * nc + c,
                            Axis::Y => ((z * ny + p) * nx + x) * nc + c,
                            Axis::Z => ((p * ny + y) * nx + x) * nc + c,
                        };
                        value += src_data[idx] * tap;
                    }
                    dst_data[base + c] = value;
                }
            }
        }
    }

    Ok(())
}
