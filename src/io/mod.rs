//! Persisted keypoint, descriptor, and match stores.
//!
//! All formats are tabular CSV without headers; paths ending in `.gz` are
//! transparently gzipped. Floating-point fields are written with Rust's
//! shortest round-trip formatting, so reading a file back reproduces every
//! value exactly.

use crate::core::linalg::Mat3;
use crate::error::{Error, Result};
use crate::features3d::{
    Descriptor, DescriptorStore, HistKind, Keypoint, KeypointStore, DESC_NUM_TOTAL_HIST,
};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

fn is_gz(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

fn open_writer(path: &Path) -> Result<Box<dyn Write>> {
    let file = BufWriter::new(File::create(path)?);
    if is_gz(path) {
        Ok(Box::new(GzEncoder::new(file, Compression::default())))
    } else {
        Ok(Box::new(file))
    }
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    if is_gz(path) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Write a keypoint store.
///
/// One row per keypoint: `x, y, z, s` in base-octave coordinates followed
/// by the rotation matrix `R00..R22` row by row (13 columns).
pub fn write_keypoints<P: AsRef<Path>>(path: P, keypoints: &KeypointStore) -> Result<()> {
    let mut writer = csv::Writer::from_writer(open_writer(path.as_ref())?);

    for kp in keypoints {
        let [x, y, z] = kp.base_coords();
        let mut record = Vec::with_capacity(13);
        record.push(x.to_string());
        record.push(y.to_string());
        record.push(z.to_string());
        record.push(kp.sd.to_string());
        for row in &kp.r {
            for &v in row {
                record.push(v.to_string());
            }
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Read a keypoint store written by [`write_keypoints`].
///
/// Pyramid indices are not persisted; keypoints come back at octave 0 with
/// their base-octave coordinates.
pub fn read_keypoints<P: AsRef<Path>>(path: P) -> Result<KeypointStore> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(open_reader(path.as_ref())?);

    let mut keypoints = KeypointStore::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != 13 {
            return Err(Error::InvalidFormat(format!(
                "Keypoint row has {} columns, expected 13",
                record.len()
            )));
        }

        let field = |i: usize| -> Result<f64> {
            record[i]
                .parse::<f64>()
                .map_err(|e| Error::InvalidFormat(format!("Bad keypoint field {i}: {e}")))
        };

        let (x, y, z, sd) = (field(0)?, field(1)?, field(2)?, field(3)?);
        let mut r: Mat3 = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = field(4 + i * 3 + j)?;
            }
        }

        let mut kp = Keypoint::new(0, 0, x.floor() as i64, y.floor() as i64, z.floor() as i64, sd);
        kp.xd = x;
        kp.yd = y;
        kp.zd = z;
        kp.r = r;
        keypoints.push(kp);
    }

    Ok(keypoints)
}

/// Write a descriptor store.
///
/// One row per descriptor: `x, y, z, s` then every histogram bin in
/// spatial-cell-major order.
pub fn write_descriptors<P: AsRef<Path>>(path: P, store: &DescriptorStore) -> Result<()> {
    let mut writer = csv::Writer::from_writer(open_writer(path.as_ref())?);

    for desc in &store.descriptors {
        let mut record = Vec::with_capacity(4 + desc.bins.len());
        record.push(desc.x.to_string());
        record.push(desc.y.to_string());
        record.push(desc.z.to_string());
        record.push(desc.sd.to_string());
        for &b in &desc.bins {
            record.push(b.to_string());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Read a descriptor store written by [`write_descriptors`]
pub fn read_descriptors<P: AsRef<Path>>(path: P, kind: HistKind) -> Result<DescriptorStore> {
    let numel = DESC_NUM_TOTAL_HIST * kind.numel();
    let expected = 4 + numel;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(open_reader(path.as_ref())?);

    let mut store = DescriptorStore::new(kind);
    for record in reader.records() {
        let record = record?;
        if record.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "Descriptor row has {} columns, expected {expected}",
                record.len()
            )));
        }

        let coord = |i: usize| -> Result<f64> {
            record[i]
                .parse::<f64>()
                .map_err(|e| Error::InvalidFormat(format!("Bad descriptor field {i}: {e}")))
        };

        let mut bins = Vec::with_capacity(numel);
        for i in 0..numel {
            let b = record[4 + i]
                .parse::<f32>()
                .map_err(|e| Error::InvalidFormat(format!("Bad descriptor bin {i}: {e}")))?;
            bins.push(b);
        }

        store.descriptors.push(Descriptor {
            x: coord(0)?,
            y: coord(1)?,
            z: coord(2)?,
            sd: coord(3)?,
            bins,
        });
    }

    Ok(store)
}

/// Write one side of a match-pair file: an n x 3 coordinate matrix
pub fn write_match_coords<P: AsRef<Path>>(path: P, coords: &[[f64; 3]]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(open_writer(path.as_ref())?);

    for c in coords {
        writer.write_record([c[0].to_string(), c[1].to_string(), c[2].to_string()])?;
    }

    writer.flush()?;
    Ok(())
}

/// Read an n x 3 coordinate matrix written by [`write_match_coords`]
pub fn read_match_coords<P: AsRef<Path>>(path: P) -> Result<Vec<[f64; 3]>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(open_reader(path.as_ref())?);

    let mut coords = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != 3 {
            return Err(Error::InvalidFormat(format!(
                "Match row has {} columns, expected 3",
                record.len()
            )));
        }
        let mut c = [0.0f64; 3];
        for (i, v) in c.iter_mut().enumerate() {
            *v = record[i]
                .parse::<f64>()
                .map_err(|e| Error::InvalidFormat(format!("Bad match field {i}: {e}")))?;
        }
        coords.push(c);
    }

    Ok(coords)
}
