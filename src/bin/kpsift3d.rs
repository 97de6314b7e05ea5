//! Keypoint detection CLI.
//!
//! Reads a raw volume file (three little-endian u32 dimensions followed by
//! nx*ny*nz little-endian f32 voxels, x fastest), runs the detection
//! pipeline, and writes keypoint and optionally descriptor CSV files.

use clap::Parser;
use sift3d_rust::core::Volume;
use sift3d_rust::error::Result;
use sift3d_rust::features3d::Sift3D;
use sift3d_rust::io::{write_descriptors, write_keypoints};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kpsift3d")]
#[command(about = "Detect SIFT3D keypoints in a raw volume", long_about = None)]
#[command(version)]
struct Cli {
    /// Raw volume file to process
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Keypoint CSV output path (.csv or .csv.gz)
    #[arg(long, value_name = "FILE")]
    keys: PathBuf,

    /// Descriptor CSV output path (.csv or .csv.gz)
    #[arg(long, value_name = "FILE")]
    desc: Option<PathBuf>,

    /// First pyramid octave
    #[arg(long = "first_octave", value_name = "N")]
    first_octave: Option<i32>,

    /// Number of octaves, or -1 to derive from the volume size
    #[arg(long = "num_octaves", value_name = "N", allow_hyphen_values = true)]
    num_octaves: Option<i32>,

    /// Keypoint levels per octave
    #[arg(long = "num_kp_levels", value_name = "N")]
    num_kp_levels: Option<i32>,

    /// Nominal blur of the input volume
    #[arg(long = "sigma_n", value_name = "SIGMA")]
    sigma_n: Option<f64>,

    /// Blur of the base pyramid level
    #[arg(long = "sigma0", value_name = "SIGMA")]
    sigma0: Option<f64>,

    /// Relative DoG peak threshold
    #[arg(long = "peak_thresh", value_name = "T")]
    peak_thresh: Option<f64>,

    /// Orientation corner threshold in [0, 1]
    #[arg(long = "corner_thresh", value_name = "T")]
    corner_thresh: Option<f64>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let im = read_raw_volume(&cli.file)?;

    let mut sift = Sift3D::new()?;
    if let Some(v) = cli.first_octave {
        sift.set_first_octave(v)?;
    }
    if let Some(v) = cli.num_octaves {
        sift.set_num_octaves(v)?;
    }
    if let Some(v) = cli.num_kp_levels {
        sift.set_num_kp_levels(v)?;
    }
    if let Some(v) = cli.sigma_n {
        sift.set_sigma_n(v)?;
    }
    if let Some(v) = cli.sigma0 {
        sift.set_sigma0(v)?;
    }
    if let Some(v) = cli.peak_thresh {
        sift.set_peak_thresh(v)?;
    }
    if let Some(v) = cli.corner_thresh {
        sift.set_corner_thresh(v)?;
    }

    sift.set_image(&im)?;
    let keypoints = sift.detect_keypoints()?;
    write_keypoints(&cli.keys, &keypoints)?;
    println!("Detected {} keypoints", keypoints.len());

    if let Some(desc_path) = &cli.desc {
        let descriptors = sift.extract_descriptors(&keypoints)?;
        write_descriptors(desc_path, &descriptors)?;
        println!("Extracted {} descriptors", descriptors.len());
    }

    Ok(())
}

fn read_raw_volume(path: &PathBuf) -> Result<Volume> {
    use sift3d_rust::error::Error;

    let bytes = fs::read(path)?;
    if bytes.len() < 12 {
        return Err(Error::InvalidFormat(
            "Volume file too short for a header".to_string(),
        ));
    }

    let dim = |i: usize| {
        u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
            as usize
    };
    let (nx, ny, nz) = (dim(0), dim(1), dim(2));

    let expected = 12 + nx * ny * nz * 4;
    if bytes.len() != expected {
        return Err(Error::InvalidFormat(format!(
            "Volume file is {} bytes, expected {expected} for {nx}x{ny}x{nz}",
            bytes.len()
        )));
    }

    let data = bytes[12..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Volume::from_raw(data, nx, ny, nz, 1)
}
