//! Gaussian and difference-of-Gaussian scale-space pyramids.

use crate::core::Volume;
use crate::error::{Error, Result};
use crate::imgproc::{apply_sep_fir, downsample_2x, gaussian_kernel, subtract, upsample_2x};

/// Default first level index within each octave
pub const DEFAULT_FIRST_LEVEL: i32 = -1;

/// Design scale of level l in octave o: `sigma0 * 2^(o + l / num_kp_levels)`
#[must_use]
pub fn scale_of(sigma0: f64, num_kp_levels: i32, o: i32, l: i32) -> f64 {
    sigma0 * 2.0f64.powf(f64::from(o) + f64::from(l) / f64::from(num_kp_levels))
}

/// Precomputed 1D Gaussian kernels for one pyramid parameterization.
///
/// Blurs compose additively in variance: the base kernel takes the input
/// from `sigma_n` to the first level's octave-relative sigma, and each step
/// kernel takes level l-1 to level l. Kernels are octave-independent because
/// sigma is measured in each octave's own voxel units.
#[derive(Debug, Clone)]
pub struct FilterBank {
    base: Vec<f32>,
    steps: Vec<Vec<f32>>,
}

impl FilterBank {
    pub fn new(
        sigma_n: f64,
        sigma0: f64,
        num_kp_levels: i32,
        first_level: i32,
        num_levels: i32,
    ) -> Result<Self> {
        let sig = |l: i32| sigma0 * 2.0f64.powf(f64::from(l) / f64::from(num_kp_levels));

        let s_first = sig(first_level);
        if s_first < sigma_n {
            return Err(Error::InvalidParameter(format!(
                "sigma0 {sigma0} puts the first pyramid level below the \
                 nominal image blur sigma_n {sigma_n}"
            )));
        }

        let base = gaussian_kernel((s_first * s_first - sigma_n * sigma_n).sqrt());

        let steps = (1..num_levels)
            .map(|i| {
                let l = first_level + i;
                let s_prev = sig(l - 1);
                let s_next = sig(l);
                gaussian_kernel((s_next * s_next - s_prev * s_prev).sqrt())
            })
            .collect();

        Ok(Self { base, steps })
    }

    #[must_use]
    pub fn base(&self) -> &[f32] {
        &self.base
    }

    /// Kernel blurring level `first_level + i` to `first_level + i + 1`
    #[must_use]
    pub fn step(&self, i: usize) -> &[f32] {
        &self.steps[i]
    }
}

/// A 2D grid of volumes indexed by (octave, level)
#[derive(Debug, Clone)]
pub struct Pyramid {
    first_octave: i32,
    num_octaves: i32,
    first_level: i32,
    num_levels: i32,
    levels: Vec<Volume>,
}

impl Pyramid {
    /// Create an empty pyramid with no storage
    #[must_use]
    pub fn new() -> Self {
        Self {
            first_octave: 0,
            num_octaves: 0,
            first_level: DEFAULT_FIRST_LEVEL,
            num_levels: 0,
            levels: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[must_use]
    pub fn first_octave(&self) -> i32 {
        self.first_octave
    }

    #[must_use]
    pub fn last_octave(&self) -> i32 {
        self.first_octave + self.num_octaves - 1
    }

    #[must_use]
    pub fn num_octaves(&self) -> i32 {
        self.num_octaves
    }

    #[must_use]
    pub fn first_level(&self) -> i32 {
        self.first_level
    }

    #[must_use]
    pub fn last_level(&self) -> i32 {
        self.first_level + self.num_levels - 1
    }

    #[must_use]
    pub fn num_levels(&self) -> i32 {
        self.num_levels
    }

    /// Reallocate storage for the given geometry.
    ///
    /// `base_dims` are the dimensions of the first octave; each further
    /// octave halves them. Reshaping to the current geometry reuses the
    /// existing buffers.
    pub fn reshape(
        &mut self,
        base_dims: (usize, usize, usize),
        first_octave: i32,
        num_octaves: i32,
        first_level: i32,
        num_levels: i32,
    ) -> Result<()> {
        if num_octaves < 1 || num_levels < 1 {
            return Err(Error::InvalidParameter(
                "Pyramid must have at least one octave and one level".to_string(),
            ));
        }

        let total = (num_octaves * num_levels) as usize;
        self.levels
            .resize_with(total, || Volume::new(1, 1, 1, 1).expect("unit volume"));

        let (bx, by, bz) = base_dims;
        for oi in 0..num_octaves {
            let nx = (bx >> oi).max(1);
            let ny = (by >> oi).max(1);
            let nz = (bz >> oi).max(1);
            for li in 0..num_levels {
                let idx = (oi * num_levels + li) as usize;
                self.levels[idx].resize_to(nx, ny, nz, 1)?;
            }
        }

        self.first_octave = first_octave;
        self.num_octaves = num_octaves;
        self.first_level = first_level;
        self.num_levels = num_levels;
        Ok(())
    }

    /// Release all storage
    pub fn clear(&mut self) {
        self.levels.clear();
        self.num_octaves = 0;
        self.num_levels = 0;
    }

    #[inline]
    fn index(&self, o: i32, l: i32) -> usize {
        debug_assert!(o >= self.first_octave && o <= self.last_octave());
        debug_assert!(l >= self.first_level && l <= self.last_level());
        ((o - self.first_octave) * self.num_levels + (l - self.first_level)) as usize
    }

    #[must_use]
    pub fn level(&self, o: i32, l: i32) -> &Volume {
        &self.levels[self.index(o, l)]
    }

    pub fn level_mut(&mut self, o: i32, l: i32) -> &mut Volume {
        let idx = self.index(o, l);
        &mut self.levels[idx]
    }

    /// Borrow one level immutably and a later one mutably
    fn level_pair_mut(&mut self, src: usize, dst: usize) -> (&Volume, &mut Volume) {
        debug_assert!(src < dst);
        let (head, tail) = self.levels.split_at_mut(dst);
        (&head[src], &mut tail[0])
    }
}

impl Default for Pyramid {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill a reshaped Gaussian pyramid from the input volume.
///
/// The input is the base of octave `first_octave`; negative first octaves
/// upsample it first. Every level's scale attribute is set to its design
/// sigma in base-octave units.
pub fn build_gpyr(
    im: &Volume,
    gpyr: &mut Pyramid,
    bank: &FilterBank,
    sigma0: f64,
    num_kp_levels: i32,
) -> Result<()> {
    let fo = gpyr.first_octave();
    let fl = gpyr.first_level();
    let ll = gpyr.last_level();

    // Base level of the first octave
    {
        let base = gpyr.level_mut(fo, fl);
        if fo < 0 {
            let mut up = im.clone();
            let mut tmp = Volume::new(1, 1, 1, 1)?;
            for _ in 0..(-fo) {
                upsample_2x(&up, &mut tmp)?;
                std::mem::swap(&mut up, &mut tmp);
            }
            apply_sep_fir(&up, base, bank.base())?;
        } else {
            apply_sep_fir(im, base, bank.base())?;
        }
        base.set_scale(scale_of(sigma0, num_kp_levels, fo, fl));
    }

    for o in fo..=gpyr.last_octave() {
        if o > fo {
            // Octave base: 2x downsample of the level one octave below
            // whose sigma is exactly twice the first level's
            let src = gpyr.index(o - 1, fl + num_kp_levels);
            let dst = gpyr.index(o, fl);
            let (src_vol, dst_vol) = gpyr.level_pair_mut(src, dst);
            downsample_2x(src_vol, dst_vol)?;
            gpyr.level_mut(o, fl)
                .set_scale(scale_of(sigma0, num_kp_levels, o, fl));
        }

        for l in (fl + 1)..=ll {
            let src = gpyr.index(o, l - 1);
            let dst = gpyr.index(o, l);
            let step = (l - fl - 1) as usize;
            {
                let (src_vol, dst_vol) = gpyr.level_pair_mut(src, dst);
                apply_sep_fir(src_vol, dst_vol, bank.step(step))?;
            }
            gpyr.level_mut(o, l)
                .set_scale(scale_of(sigma0, num_kp_levels, o, l));
        }
    }

    Ok(())
}

/// Fill the DoG pyramid: `dog[o][l] = gpyr[o][l+1] - gpyr[o][l]`.
///
/// The DoG pyramid is reshaped to match the Gaussian pyramid with one
/// fewer level per octave.
pub fn build_dog(gpyr: &Pyramid, dog: &mut Pyramid) -> Result<()> {
    let base = gpyr.level(gpyr.first_octave(), gpyr.first_level());
    dog.reshape(
        base.dims(),
        gpyr.first_octave(),
        gpyr.num_octaves(),
        gpyr.first_level(),
        gpyr.num_levels() - 1,
    )?;

    for o in gpyr.first_octave()..=gpyr.last_octave() {
        for l in gpyr.first_level()..gpyr.last_level() {
            let a = gpyr.level(o, l + 1);
            let b = gpyr.level(o, l);
            let out = dog.level_mut(o, l);
            subtract(a, b, out)?;
            out.set_scale(b.scale());
        }
    }

    Ok(())
}
