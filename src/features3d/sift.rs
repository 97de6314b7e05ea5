//! The SIFT3D pipeline orchestrator.
//!
//! Owns the Gaussian and DoG pyramids, the precomputed filter bank, the
//! orientation mesh, and a copy of the current image. Parameter setters
//! validate their domains and reshape the owned state; keypoint and
//! descriptor stores are caller-owned.

use crate::core::Volume;
use crate::error::{Error, Outcome, Result};
use crate::features3d::dense::{extract_dense_descriptors, DenseOptions};
use crate::features3d::descriptors::{extract_descriptors, DescriptorStore, HistKind};
use crate::features3d::extrema::{detect_extrema, refine_keypoints, RefineMode};
use crate::features3d::keypoints::KeypointStore;
use crate::features3d::mesh::Mesh;
use crate::features3d::orientation::assign_orientation;
use crate::features3d::pyramid::{build_dog, build_gpyr, FilterBank, Pyramid, DEFAULT_FIRST_LEVEL};

/// Pipeline tunables
#[derive(Debug, Clone, Copy)]
pub struct SiftParams {
    pub first_octave: i32,
    /// Number of octaves, or -1 to derive it from the image dimensions
    pub num_octaves: i32,
    pub num_kp_levels: i32,
    /// Nominal blur already present in the input
    pub sigma_n: f64,
    /// Blur of the base pyramid level
    pub sigma0: f64,
    /// DoG peak threshold, relative to each level's maximum magnitude
    pub peak_thresh: f64,
    /// Minimum cosine between the gradient sum and each frame axis
    pub corner_thresh: f64,
    pub refine_mode: RefineMode,
    pub hist_kind: HistKind,
    /// Compare against all 26 same-level neighbors during detection
    pub cuboid_extrema: bool,
    /// Solid-angle histogram reweighting (spherical mode only)
    pub solid_angle_weight: bool,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            first_octave: 0,
            num_octaves: -1,
            num_kp_levels: 3,
            sigma_n: 1.15,
            sigma0: 1.6,
            peak_thresh: 0.03,
            corner_thresh: 0.5,
            refine_mode: RefineMode::default(),
            hist_kind: HistKind::default(),
            cuboid_extrema: false,
            solid_angle_weight: false,
        }
    }
}

/// The detector/descriptor pipeline
#[derive(Debug, Clone)]
pub struct Sift3D {
    params: SiftParams,
    mesh: Mesh,
    gpyr: Pyramid,
    dog: Pyramid,
    filters: FilterBank,
    im: Option<Volume>,
}

impl Sift3D {
    /// Create a pipeline with default parameters
    pub fn new() -> Result<Self> {
        Self::with_params(SiftParams::default())
    }

    /// Create a pipeline with the given parameters, validating each
    pub fn with_params(params: SiftParams) -> Result<Self> {
        validate_params(&params)?;

        let filters = FilterBank::new(
            params.sigma_n,
            params.sigma0,
            params.num_kp_levels,
            DEFAULT_FIRST_LEVEL,
            params.num_kp_levels + 3,
        )?;

        Ok(Self {
            params,
            mesh: Mesh::new(),
            gpyr: Pyramid::new(),
            dog: Pyramid::new(),
            filters,
            im: None,
        })
    }

    #[must_use]
    pub fn params(&self) -> &SiftParams {
        &self.params
    }

    #[must_use]
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn set_first_octave(&mut self, first_octave: i32) -> Result<()> {
        self.params.first_octave = first_octave;
        self.resize()
    }

    pub fn set_num_octaves(&mut self, num_octaves: i32) -> Result<()> {
        if num_octaves != -1 && num_octaves < 1 {
            return Err(Error::InvalidParameter(format!(
                "num_octaves must be positive or -1, got {num_octaves}"
            )));
        }
        self.params.num_octaves = num_octaves;
        self.resize()
    }

    pub fn set_num_kp_levels(&mut self, num_kp_levels: i32) -> Result<()> {
        if num_kp_levels < 1 {
            return Err(Error::InvalidParameter(format!(
                "num_kp_levels must be positive, got {num_kp_levels}"
            )));
        }
        self.params.num_kp_levels = num_kp_levels;
        self.resize()
    }

    pub fn set_sigma_n(&mut self, sigma_n: f64) -> Result<()> {
        if sigma_n < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "sigma_n must be non-negative, got {sigma_n}"
            )));
        }
        self.params.sigma_n = sigma_n;
        self.resize()
    }

    pub fn set_sigma0(&mut self, sigma0: f64) -> Result<()> {
        if sigma0 < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "sigma0 must be non-negative, got {sigma0}"
            )));
        }
        self.params.sigma0 = sigma0;
        self.resize()
    }

    pub fn set_peak_thresh(&mut self, peak_thresh: f64) -> Result<()> {
        if peak_thresh <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "peak_thresh must be positive, got {peak_thresh}"
            )));
        }
        self.params.peak_thresh = peak_thresh;
        Ok(())
    }

    pub fn set_corner_thresh(&mut self, corner_thresh: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&corner_thresh) {
            return Err(Error::InvalidParameter(format!(
                "corner_thresh must be in [0, 1], got {corner_thresh}"
            )));
        }
        self.params.corner_thresh = corner_thresh;
        Ok(())
    }

    pub fn set_refine_mode(&mut self, mode: RefineMode) {
        self.params.refine_mode = mode;
    }

    pub fn set_hist_kind(&mut self, kind: HistKind) {
        self.params.hist_kind = kind;
    }

    pub fn set_cuboid_extrema(&mut self, cuboid: bool) {
        self.params.cuboid_extrema = cuboid;
    }

    pub fn set_solid_angle_weight(&mut self, enabled: bool) {
        self.params.solid_angle_weight = enabled;
    }

    /// Set the current image, reshaping the owned pyramids to fit.
    ///
    /// The core accepts single-channel volumes only.
    pub fn set_image(&mut self, im: &Volume) -> Result<()> {
        if im.channels() != 1 {
            return Err(Error::InvalidParameter(format!(
                "SIFT3D requires a single-channel volume, got {} channels",
                im.channels()
            )));
        }

        self.im = Some(im.clone());
        self.resize()
    }

    /// Octaves that will be used for the current image and parameters
    fn effective_num_octaves(&self, im: &Volume) -> Result<i32> {
        if self.params.num_octaves != -1 {
            return Ok(self.params.num_octaves);
        }

        let min_dim = im.min_dim() as f64;
        let num = min_dim.log2().floor() as i32 - 3 - self.params.first_octave + 1;
        if num < 1 {
            return Err(Error::InvalidDimensions(format!(
                "Volume of minimum dimension {} is too small for a pyramid \
                 starting at octave {}",
                im.min_dim(),
                self.params.first_octave
            )));
        }
        Ok(num)
    }

    /// Reshape pyramids and recompute kernels for the current parameters.
    ///
    /// A no-op when no image is set; idempotent otherwise.
    fn resize(&mut self) -> Result<()> {
        self.filters = FilterBank::new(
            self.params.sigma_n,
            self.params.sigma0,
            self.params.num_kp_levels,
            DEFAULT_FIRST_LEVEL,
            self.params.num_kp_levels + 3,
        )?;

        let Some(im) = self.im.as_ref() else {
            return Ok(());
        };

        let num_octaves = self.effective_num_octaves(im)?;
        let num_levels = self.params.num_kp_levels + 3;

        // Negative first octaves upsample the input
        let (mut bx, mut by, mut bz) = im.dims();
        if self.params.first_octave < 0 {
            let shift = (-self.params.first_octave) as usize;
            bx <<= shift;
            by <<= shift;
            bz <<= shift;
        }

        self.gpyr.reshape(
            (bx, by, bz),
            self.params.first_octave,
            num_octaves,
            DEFAULT_FIRST_LEVEL,
            num_levels,
        )?;
        self.dog.reshape(
            (bx, by, bz),
            self.params.first_octave,
            num_octaves,
            DEFAULT_FIRST_LEVEL,
            num_levels - 1,
        )?;

        Ok(())
    }

    /// Build the Gaussian and DoG pyramids for the current image
    pub fn build_pyramids(&mut self) -> Result<()> {
        let im = self.im.as_ref().ok_or_else(|| {
            Error::UnsupportedOperation("No image set for pyramid construction".to_string())
        })?;

        build_gpyr(
            im,
            &mut self.gpyr,
            &self.filters,
            self.params.sigma0,
            self.params.num_kp_levels,
        )?;
        build_dog(&self.gpyr, &mut self.dog)
    }

    /// Detect, refine, and orient keypoints in the current image.
    ///
    /// Keypoints appear in raster-scan order; those without a stable
    /// orientation are silently dropped.
    pub fn detect_keypoints(&mut self) -> Result<KeypointStore> {
        self.build_pyramids()?;

        let mut keypoints = detect_extrema(
            &self.dog,
            self.params.peak_thresh,
            self.params.cuboid_extrema,
        )?;
        refine_keypoints(&self.dog, &mut keypoints, self.params.refine_mode);

        let mut oriented = KeypointStore::with_capacity(keypoints.len());
        for mut kp in keypoints {
            let level = self.gpyr.level(kp.o, kp.s);
            match assign_orientation(level, &kp, self.params.corner_thresh)? {
                Outcome::Accept(r) => {
                    kp.r = r;
                    oriented.push(kp);
                }
                Outcome::Reject => {}
            }
        }

        Ok(oriented)
    }

    /// Extract descriptors for keypoints detected in the current image
    pub fn extract_descriptors(&self, keypoints: &KeypointStore) -> Result<DescriptorStore> {
        extract_descriptors(
            &self.gpyr,
            &self.mesh,
            keypoints,
            self.params.hist_kind,
            self.params.solid_angle_weight,
        )
    }

    /// Detect keypoints and extract their descriptors in one call
    pub fn detect_and_extract(
        &mut self,
        im: &Volume,
    ) -> Result<(KeypointStore, DescriptorStore)> {
        self.set_image(im)?;
        let keypoints = self.detect_keypoints()?;
        let descriptors = self.extract_descriptors(&keypoints)?;
        Ok((keypoints, descriptors))
    }

    /// Extract a dense descriptor volume, bypassing keypoint detection
    pub fn extract_dense(&self, im: &Volume, rotate: bool) -> Result<Volume> {
        if im.channels() != 1 {
            return Err(Error::InvalidParameter(format!(
                "Dense extraction requires a single-channel volume, got {} channels",
                im.channels()
            )));
        }

        let opts = DenseOptions {
            rotate,
            kind: self.params.hist_kind,
            solid_angle: self.params.solid_angle_weight,
        };
        extract_dense_descriptors(
            im,
            &self.mesh,
            self.params.sigma_n,
            self.params.sigma0,
            self.params.corner_thresh,
            opts,
        )
    }

    /// Geometry of the owned Gaussian pyramid, for inspection
    #[must_use]
    pub fn gpyr(&self) -> &Pyramid {
        &self.gpyr
    }

    /// Geometry of the owned DoG pyramid, for inspection
    #[must_use]
    pub fn dog(&self) -> &Pyramid {
        &self.dog
    }
}

fn validate_params(params: &SiftParams) -> Result<()> {
    if params.num_octaves != -1 && params.num_octaves < 1 {
        return Err(Error::InvalidParameter(format!(
            "num_octaves must be positive or -1, got {}",
            params.num_octaves
        )));
    }
    if params.num_kp_levels < 1 {
        return Err(Error::InvalidParameter(format!(
            "num_kp_levels must be positive, got {}",
            params.num_kp_levels
        )));
    }
    if params.sigma_n < 0.0 || params.sigma0 < 0.0 {
        return Err(Error::InvalidParameter(
            "sigma_n and sigma0 must be non-negative".to_string(),
        ));
    }
    if params.peak_thresh <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "peak_thresh must be positive, got {}",
            params.peak_thresh
        )));
    }
    if !(0.0..=1.0).contains(&params.corner_thresh) {
        return Err(Error::InvalidParameter(format!(
            "corner_thresh must be in [0, 1], got {}",
            params.corner_thresh
        )));
    }
    Ok(())
}
