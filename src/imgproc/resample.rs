use crate::core::Volume;
use crate::error::{Error, Result};

/// Voxelwise difference `dst = a - b`
pub fn subtract(a: &Volume, b: &Volume, dst: &mut Volume) -> Result<()> {
    if a.dims() != b.dims() || a.channels() != b.channels() {
        return Err(Error::InvalidDimensions(
            "Subtraction operands must have identical shapes".to_string(),
        ));
    }

    dst.copy_dims_from(a)?;

    let a_data = a.data();
    let b_data = b.data();
    let out = dst.data_mut();
    for i in 0..a_data.len() {
        out[i] = a_data[i] - b_data[i];
    }

    Ok(())
}

/// Nearest-neighbor 2x decimation (stride-2 sampling)
pub fn downsample_2x(src: &Volume, dst: &mut Volume) -> Result<()> {
    let (nx, ny, nz) = src.dims();
    let (dnx, dny, dnz) = ((nx / 2).max(1), (ny / 2).max(1), (nz / 2).max(1));

    dst.resize_to(dnx, dny, dnz, src.channels())?;
    dst.set_scale(src.scale());

    let nc = src.channels();
    for z in 0..dnz {
        for y in 0..dny {
            for x in 0..dnx {
                for c in 0..nc {
                    let v = src.get_chan(x * 2, y * 2, z * 2, c);
                    dst.set_chan(x, y, z, c, v);
                }
            }
        }
    }

    Ok(())
}

/// Nearest-neighbor 2x upsampling, used for negative pyramid octaves
pub fn upsample_2x(src: &Volume, dst: &mut Volume) -> Result<()> {
    let (nx, ny, nz) = src.dims();

    dst.resize_to(nx * 2, ny * 2, nz * 2, src.channels())?;
    dst.set_scale(src.scale());

    let nc = src.channels();
    for z in 0..nz * 2 {
        for y in 0..ny * 2 {
            for x in 0..nx * 2 {
                for c in 0..nc {
                    let v = src.get_chan(x / 2, y / 2, z / 2, c);
                    dst.set_chan(x, y, z, c, v);
                }
            }
        }
    }

    Ok(())
}
