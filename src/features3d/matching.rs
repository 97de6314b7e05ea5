//! Brute-force descriptor matching with the Lowe ratio test.

use crate::error::{Error, Result};
use crate::features3d::descriptors::DescriptorStore;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Matching parameters
#[derive(Debug, Clone, Copy)]
pub struct MatchParams {
    /// Ratio-test threshold on L2 distances; squared distances are compared
    /// against `nn_thresh^2`
    pub nn_thresh: f64,
    /// Keep only matches confirmed by the reverse direction
    pub forward_backward: bool,
    /// Reject candidate pairs farther apart than this in base-octave
    /// coordinates
    pub max_dist: Option<f64>,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            nn_thresh: 0.8,
            forward_backward: false,
            max_dist: None,
        }
    }
}

/// Match every descriptor in `a` against `b`.
///
/// Returns a dense array of length `a.len()`: the matched index in `b`, or
/// -1 where the ratio test (or the forward-backward check) fails. Matches
/// are in descriptor-index order of side `a`.
pub fn match_descriptors(
    a: &DescriptorStore,
    b: &DescriptorStore,
    params: &MatchParams,
) -> Result<Vec<i32>> {
    if params.nn_thresh <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "nn_thresh must be positive, got {}",
            params.nn_thresh
        )));
    }
    if a.kind != b.kind {
        return Err(Error::UnsupportedOperation(
            "Cannot match descriptors with different histogram modes".to_string(),
        ));
    }

    let forward = match_one_direction(a, b, params);

    if !params.forward_backward {
        return Ok(forward);
    }

    let backward = match_one_direction(b, a, params);
    let checked = forward
        .iter()
        .enumerate()
        .map(|(i, &j)| {
            if j >= 0 && backward[j as usize] == i as i32 {
                j
            } else {
                -1
            }
        })
        .collect();

    Ok(checked)
}

fn match_one_direction(a: &DescriptorStore, b: &DescriptorStore, params: &MatchParams) -> Vec<i32> {
    let thresh_sq = params.nn_thresh * params.nn_thresh;

    let match_one = |qi: usize| -> i32 {
        let q = &a.descriptors[qi];
        let mut best_sq = f64::INFINITY;
        let mut second_sq = f64::INFINITY;
        let mut best_idx = -1i32;

        for (ti, t) in b.descriptors.iter().enumerate() {
            if let Some(max_dist) = params.max_dist {
                let dx = q.x - t.x;
                let dy = q.y - t.y;
                let dz = q.z - t.z;
                if (dx * dx + dy * dy + dz * dz).sqrt() > max_dist {
                    continue;
                }
            }

            let ssd = sum_sq_diff(&q.bins, &t.bins);
            if ssd < best_sq {
                second_sq = best_sq;
                best_sq = ssd;
                best_idx = ti as i32;
            } else if ssd < second_sq {
                second_sq = ssd;
            }
        }

        if best_idx >= 0 && best_sq / second_sq < thresh_sq {
            best_idx
        } else {
            -1
        }
    };

    #[cfg(feature = "rayon")]
    {
        (0..a.descriptors.len())
            .into_par_iter()
            .map(match_one)
            .collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        (0..a.descriptors.len()).map(match_one).collect()
    }
}

fn sum_sq_diff(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum()
}

/// Collect the base-octave coordinates of both sides of every valid match,
/// in match order
#[must_use]
pub fn match_coords(
    a: &DescriptorStore,
    b: &DescriptorStore,
    matches: &[i32],
) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    let mut coords_a = Vec::new();
    let mut coords_b = Vec::new();

    for (i, &j) in matches.iter().enumerate() {
        if j < 0 {
            continue;
        }
        let da = &a.descriptors[i];
        let db = &b.descriptors[j as usize];
        coords_a.push([da.x, da.y, da.z]);
        coords_b.push([db.x, db.y, db.z]);
    }

    (coords_a, coords_b)
}
