use crate::error::{Error, Result};
use ndarray::Array4;

/// A 3D scalar field representing one image volume.
///
/// Voxels are stored x-fastest (`idx = ((z * ny + y) * nx + x) * nc + c`),
/// and a voxel at integer coordinates (x, y, z) has its continuous center at
/// (x + 0.5, y + 0.5, z + 0.5). The `scale` attribute records the Gaussian
/// blur that has been applied to the data, in base-octave units.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Vec<f32>,
    nx: usize,
    ny: usize,
    nz: usize,
    nc: usize,
    scale: f64,
}

impl Volume {
    /// Create a new zero-filled volume with the given dimensions and channels
    pub fn new(nx: usize, ny: usize, nz: usize, nc: usize) -> Result<Self> {
        if nx == 0 || ny == 0 || nz == 0 || nc == 0 {
            return Err(Error::InvalidDimensions(
                "Volume dimensions must be greater than 0".to_string(),
            ));
        }

        let data = vec![0.0f32; nx * ny * nz * nc];

        Ok(Self {
            data,
            nx,
            ny,
            nz,
            nc,
            scale: 0.0,
        })
    }

    /// Create a volume from raw data in x-fastest order
    pub fn from_raw(data: Vec<f32>, nx: usize, ny: usize, nz: usize, nc: usize) -> Result<Self> {
        let expected = nx * ny * nz * nc;
        if data.len() != expected {
            return Err(Error::InvalidDimensions(format!(
                "Data size {} doesn't match expected size {}",
                data.len(),
                expected
            )));
        }

        Ok(Self {
            data,
            nx,
            ny,
            nz,
            nc,
            scale: 0.0,
        })
    }

    #[must_use]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    #[must_use]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[must_use]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[must_use]
    pub fn nz(&self) -> usize {
        self.nz
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.nc
    }

    /// Smallest spatial dimension
    #[must_use]
    pub fn min_dim(&self) -> usize {
        self.nx.min(self.ny).min(self.nz)
    }

    /// Gaussian blur recorded for this volume, in base-octave units
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Flat index of channel 0 of voxel (x, y, z)
    #[inline]
    #[must_use]
    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        ((z * self.ny + y) * self.nx + x) * self.nc
    }

    /// Single-channel voxel read. Panics on out-of-bounds coordinates.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        debug_assert!(x < self.nx && y < self.ny && z < self.nz);
        self.data[self.idx(x, y, z)]
    }

    /// Single-channel voxel write. Panics on out-of-bounds coordinates.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        debug_assert!(x < self.nx && y < self.ny && z < self.nz);
        let i = self.idx(x, y, z);
        self.data[i] = value;
    }

    /// Channel read for multi-channel volumes
    #[inline]
    #[must_use]
    pub fn get_chan(&self, x: usize, y: usize, z: usize, c: usize) -> f32 {
        debug_assert!(c < self.nc);
        self.data[self.idx(x, y, z) + c]
    }

    /// Channel write for multi-channel volumes
    #[inline]
    pub fn set_chan(&mut self, x: usize, y: usize, z: usize, c: usize, value: f32) {
        debug_assert!(c < self.nc);
        let i = self.idx(x, y, z) + c;
        self.data[i] = value;
    }

    /// Bounds-checked voxel read
    pub fn at(&self, x: usize, y: usize, z: usize) -> Result<f32> {
        if x >= self.nx || y >= self.ny || z >= self.nz {
            return Err(Error::OutOfRange(format!(
                "Voxel ({x}, {y}, {z}) out of bounds for {}x{}x{} volume",
                self.nx, self.ny, self.nz
            )));
        }
        Ok(self.get(x, y, z))
    }

    /// Reallocate to the given dimensions, zeroing the contents.
    ///
    /// A resize to the current shape keeps the buffer and is idempotent.
    pub fn resize_to(&mut self, nx: usize, ny: usize, nz: usize, nc: usize) -> Result<()> {
        if nx == 0 || ny == 0 || nz == 0 || nc == 0 {
            return Err(Error::InvalidDimensions(
                "Volume dimensions must be greater than 0".to_string(),
            ));
        }

        let total = nx * ny * nz * nc;
        if total != self.data.len() {
            self.data = vec![0.0f32; total];
        }
        self.nx = nx;
        self.ny = ny;
        self.nz = nz;
        self.nc = nc;
        Ok(())
    }

    /// Adopt another volume's dimensions and channel count, zeroing contents
    pub fn copy_dims_from(&mut self, other: &Volume) -> Result<()> {
        self.resize_to(other.nx, other.ny, other.nz, other.nc)
    }

    /// Zero every voxel, keeping dimensions
    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Largest absolute voxel value
    #[must_use]
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, &v| m.max(v.abs()))
    }

    /// Convert to ndarray for easier manipulation (shape `[nz, ny, nx, nc]`)
    pub fn to_array4(&self) -> Result<Array4<f32>> {
        let shape = (self.nz, self.ny, self.nx, self.nc);
        Array4::from_shape_vec(shape, self.data.clone())
            .map_err(|e| Error::InvalidDimensions(e.to_string()))
    }

    /// Create a volume from an ndarray with shape `[nz, ny, nx, nc]`
    pub fn from_array4(arr: Array4<f32>) -> Result<Self> {
        let shape = arr.shape();
        let (nz, ny, nx, nc) = (shape[0], shape[1], shape[2], shape[3]);

        let data = arr.into_raw_vec();
        Self::from_raw(data, nx, ny, nz, nc)
    }
}
