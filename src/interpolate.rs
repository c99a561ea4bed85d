//! Grid-interpolated repulsive forces.
//!
//! When many points share a small region, their Barnes-Hut traversals are
//! nearly identical. This module trades accuracy for time by evaluating
//! the repulsive field only at the vertices of a regular lattice over the
//! embedding's bounding box, then interpolating bilinearly to each point.
//! It is an approximation of an approximation: useful for exploratory
//! runs, not the default for final-quality output.
//!
//! Only 2-dimensional embeddings are supported; anything else is rejected
//! up front.
//!
//! ## Lattice bookkeeping
//!
//! Cells are addressed by integer coordinates and hashed to a single
//! `usize` in base `intervals + 1` (vertex coordinates can reach
//! `intervals`, one past the last cell). The same hash space addresses
//! both cells and vertices: a cell's hash is the hash of its lower-left
//! vertex.
//!
//! Discovery runs in two passes. The first marks every occupied cell as
//! an interpolation anchor and all 2^d vertices of that cell as
//! waypoints. The second evaluates the tree at every waypoint, in
//! parallel, each waypoint writing its own slot. Anchors are counted
//! before any interpolant storage is allocated, and waypoint evaluation
//! is driven off a sorted list of hashes so results never depend on map
//! iteration order.

use std::collections::HashMap;

use crate::error::TsneError;
use crate::parallel::Parallelism;
use crate::sptree::SpTree;

/// Corners of a 2-d cell.
const CORNERS: usize = 4;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// A vertex only referenced as some cell's corner.
    Corner,
    /// The base vertex of a cell that contains at least one point.
    Anchor,
}

/// Cell index of a point along each dimension, clamped so the maximum
/// coordinate lands in the last cell.
fn encode<const D: usize>(point: &[f64], mins: &[f64], step: &[f64], intervals: usize) -> [usize; D] {
    let mut cell = [0usize; D];
    for d in 0..D {
        cell[d] = (((point[d] - mins[d]) / step[d]) as usize).min(intervals - 1);
    }
    cell
}

fn hash_cell(cell: &[usize], intervals: usize) -> usize {
    let mut h = 0;
    for &c in cell {
        h = h * (intervals + 1) + c;
    }
    h
}

fn unhash_cell<const D: usize>(mut h: usize, intervals: usize) -> [usize; D] {
    let mut cell = [0usize; D];
    for d in (0..D).rev() {
        cell[d] = h % (intervals + 1);
        h /= intervals + 1;
    }
    cell
}

/// Compute repulsive forces for every point by lattice interpolation.
///
/// Writes each point's force vector and its contribution to the repulsive
/// normalization sum into `neg_f` (the caller reduces the contributions
/// serially, exactly as in the direct path). `intervals` is the number of
/// lattice cells per dimension.
pub fn compute_non_edge_forces<const D: usize>(
    tree: &SpTree<D>,
    y: &[f64],
    theta: f64,
    intervals: usize,
    parallelism: &Parallelism,
    neg_f: &mut [([f64; D], f64)],
) -> Result<(), TsneError> {
    if D != 2 {
        return Err(TsneError::UnsupportedDimension { ndim: D });
    }
    assert!(intervals > 0, "interval count must be positive");
    let n = neg_f.len();
    debug_assert_eq!(y.len(), n * D);

    // Bounding box and lattice step, with a floor on the step so a
    // degenerate (constant) dimension cannot produce a zero division.
    let mut mins = [f64::MAX; D];
    let mut maxs = [f64::MIN; D];
    for i in 0..n {
        for d in 0..D {
            let v = y[i * D + d];
            mins[d] = mins[d].min(v);
            maxs[d] = maxs[d].max(v);
        }
    }
    let mut step = [0.0; D];
    for d in 0..D {
        step[d] = (maxs[d] - mins[d]) / intervals as f64;
        if step[d] == 0.0 {
            step[d] = 1e-8;
        }
    }

    // Pass 1: mark occupied cells as anchors, their vertices as waypoints.
    let mut marks: HashMap<usize, Mark> = HashMap::new();
    for i in 0..n {
        let cell = encode::<D>(&y[i * D..(i + 1) * D], &mins, &step, intervals);
        let h = hash_cell(&cell, intervals);
        if marks.get(&h) == Some(&Mark::Anchor) {
            continue;
        }
        marks.insert(h, Mark::Anchor);
        for corner in 1..(1usize << D) {
            let mut v = cell;
            for d in 0..D {
                if corner >> d & 1 == 1 {
                    v[d] += 1;
                }
            }
            marks.entry(hash_cell(&v, intervals)).or_insert(Mark::Corner);
        }
    }

    // Pass 2: evaluate the tree at every waypoint. Hashes are sorted so
    // waypoint slots are deterministic, and each evaluation writes only
    // its own slot.
    let mut hashes: Vec<usize> = marks.keys().copied().collect();
    hashes.sort_unstable();
    let slot_of: HashMap<usize, usize> =
        hashes.iter().enumerate().map(|(s, &h)| (h, s)).collect();

    let mut collected: Vec<([f64; D], f64)> = vec![([0.0; D], 0.0); hashes.len()];
    parallelism.for_each_mut(&mut collected, |w, out| {
        let vertex = unhash_cell::<D>(hashes[w], intervals);
        let mut coord = [0.0; D];
        for d in 0..D {
            coord[d] = vertex[d] as f64 * step[d] + mins[d];
        }
        out.1 = tree.compute_non_edge_forces_at(&coord, theta, &mut out.0);
    });

    // Pass 3: bilinear coefficients per anchor cell. The anchor list is
    // materialized first so the interpolant block is allocated once, at
    // its final size.
    let anchors: Vec<usize> = hashes
        .iter()
        .copied()
        .filter(|h| marks[h] == Mark::Anchor)
        .collect();
    let anchor_of: HashMap<usize, usize> =
        anchors.iter().enumerate().map(|(a, &h)| (h, a)).collect();

    // Per anchor, per output value (D force components then the Q
    // contribution): slope-of-slope, slope intercept, intercept slope,
    // intercept intercept.
    let nvalues = D + 1;
    let blocksize = CORNERS * nvalues;
    let mut interpolants = vec![0.0f64; blocksize * anchors.len()];

    let step = &step[..];
    for (a, &h) in anchors.iter().enumerate() {
        let cell = unhash_cell::<D>(h, intervals);

        // Corner w of the cell offsets the base vertex by bit d of w in
        // dimension d: 0 = (0,0), 1 = (+x), 2 = (+y), 3 = (+x,+y).
        let mut corner_slot = [0usize; CORNERS];
        for (w, cs) in corner_slot.iter_mut().enumerate() {
            let mut v = cell;
            for d in 0..D {
                if w >> d & 1 == 1 {
                    v[d] += 1;
                }
            }
            *cs = slot_of[&hash_cell(&v, intervals)];
        }

        for val in 0..nvalues {
            let obs = |w: usize| -> f64 {
                let (f, q) = &collected[corner_slot[w]];
                if val < D {
                    f[val]
                } else {
                    *q
                }
            };
            let slope0 = (obs(1) - obs(0)) / step[0];
            let intercept0 = obs(0);
            let slope1 = (obs(3) - obs(2)) / step[0];
            let intercept1 = obs(2);

            let offset = a * blocksize + val * CORNERS;
            interpolants[offset] = (slope1 - slope0) / step[1];
            interpolants[offset + 1] = slope0;
            interpolants[offset + 2] = (intercept1 - intercept0) / step[1];
            interpolants[offset + 3] = intercept0;
        }
    }

    // Pass 4: evaluate the bilinear form at every point.
    for i in 0..n {
        let point = &y[i * D..(i + 1) * D];
        let cell = encode::<D>(point, &mins, step, intervals);
        let mut delta = [0.0; D];
        for d in 0..D {
            delta[d] = point[d] - (cell[d] as f64 * step[d] + mins[d]);
        }
        let delta = &delta[..];

        let a = anchor_of[&hash_cell(&cell, intervals)];
        let (force, q) = &mut neg_f[i];
        for val in 0..nvalues {
            let offset = a * blocksize + val * CORNERS;
            let slope = interpolants[offset] * delta[1] + interpolants[offset + 1];
            let intercept = interpolants[offset + 2] * delta[1] + interpolants[offset + 3];
            let out = slope * delta[0] + intercept;
            if val < D {
                force[val] = out;
            } else {
                *q = out;
            }
        }
    }

    Ok(())
}
