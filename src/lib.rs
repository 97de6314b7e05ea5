//! # SIFT3D-Rust
//!
//! A pure Rust implementation of the SIFT3D volumetric feature pipeline.
//!
//! This library generalizes the scale-invariant feature transform from 2D
//! images to 3D scalar volumes: it locates distinctive voxel-scale keypoints
//! in a Gaussian scale-space pyramid, assigns each a local rotation frame
//! from the gradient structure tensor, and extracts rotation-invariant
//! icosahedral gradient histograms that can be matched between volumes.
//!
//! ## Features
//!
//! - **Core**: `Volume`, the 3D scalar field with a scale attribute
//! - **Image algebra**: separable filtering, gradients, resampling
//! - **Features**: scale-space pyramids, keypoint detection, orientation
//!   assignment, descriptor extraction, brute-force matching
//! - **I/O**: CSV keypoint/descriptor/match stores, optionally gzipped
//!
//! ## Example
//!
//! ```rust,no_run
//! use sift3d_rust::prelude::*;
//!
//! # fn main() -> sift3d_rust::error::Result<()> {
//! let im = Volume::new(64, 64, 64, 1)?;
//!
//! let mut sift = Sift3D::new()?;
//! sift.set_image(&im)?;
//!
//! let keypoints = sift.detect_keypoints()?;
//! let descriptors = sift.extract_descriptors(&keypoints)?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod features3d;
pub mod imgproc;
pub mod io;

pub mod prelude {
    //! Convenience module that re-exports commonly used items
    pub use crate::core::{Point3d, Volume};
    pub use crate::error::{Error, Outcome, Result};
    pub use crate::features3d::{
        Descriptor, DescriptorStore, Keypoint, MatchParams, Sift3D, SiftParams,
    };
}
