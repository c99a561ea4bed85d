//! Input affinities: perplexity calibration and symmetrization.
//!
//! This module turns raw K-nearest-neighbor output (indices and ascending
//! distances per observation) into the sparse symmetric probability matrix
//! P that drives the attractive forces.
//!
//! ## Per-row calibration
//!
//! Each row gets its own Gaussian bandwidth: we search for a precision
//! `beta` such that the distribution `p_m ∝ exp(-beta * s_m)` over the K
//! neighbors has Shannon entropy `log(perplexity)`. Two numerical details
//! are load-bearing:
//!
//! - **Distance shift.** We work with `s_m = d_m^2 - d_0^2` rather than
//!   the raw squared distances. Shifting the exponent by a constant scales
//!   every unnormalized probability by the same factor, which cancels
//!   under normalization and leaves the entropy unchanged, but it keeps
//!   `exp(-beta * s)` representable when distances are large.
//! - **Newton-Raphson with a bisection safety net.** A Newton step on the
//!   entropy is attempted first and accepted only if it lands strictly
//!   inside the current bracketing interval; otherwise the interval is
//!   bisected (doubling upward while the upper bound is still unbounded).
//!
//! ## Symmetrization
//!
//! Raw kNN affinities are not symmetric (j may be a neighbor of n without
//! the converse). Rows are first sorted by neighbor index, then merged
//! with a single monotone scan per target row: because both the outer
//! observation index and each row's original prefix are in increasing
//! order, a per-row cursor never needs to back up. Mutual pairs are
//! summed once (from the smaller index), missing transposes are appended,
//! and the whole matrix is divided by twice its pre-symmetrization total
//! so it sums to unity.

use crate::parallel::Parallelism;

/// Sparse symmetric affinities: one row per observation, each row an
/// ascending-index list of `(neighbor, probability)` pairs.
pub type NeighborList = Vec<Vec<(usize, f64)>>;

/// Calibrate one probability row per observation from its neighbor
/// distances (ascending), targeting entropy `log_perplexity`.
///
/// Rows are fully independent and run under `parallelism`. A row that
/// fails to converge within 200 iterations keeps its last bandwidth and
/// is reported with `log::warn!`; calibration never fails hard.
pub fn compute_gaussian_perplexity(
    distances: &[Vec<f64>],
    log_perplexity: f64,
    binary_search_only: bool,
    parallelism: &Parallelism,
) -> Vec<Vec<f64>> {
    let mut rows: Vec<Vec<f64>> = distances.iter().map(|d| vec![0.0; d.len()]).collect();
    parallelism.for_each_mut(&mut rows, |n, output| {
        calibrate_row(&distances[n], output, log_perplexity, binary_search_only, n);
    });
    rows
}

const CALIBRATION_TOL: f64 = 1e-5;
const CALIBRATION_MAX_ITER: usize = 200;

fn calibrate_row(
    distances: &[f64],
    output: &mut [f64],
    log_perplexity: f64,
    binary_search_only: bool,
    row: usize,
) {
    let k = distances.len();
    if k == 0 {
        return;
    }
    let mut beta = 1.0_f64;
    let mut min_beta = 0.0_f64;
    let mut max_beta = f64::MAX;
    let mut sum_p = 1.0_f64;

    // Shifting by the first squared distance pins s_0 = 0, so the first
    // probability is exp(0) = 1 before normalization.
    let first = distances[0] * distances[0];
    output[0] = 1.0;

    let mut converged = false;
    for _ in 0..CALIBRATION_MAX_ITER {
        // Apply the Gaussian kernel at the current precision, accumulating
        // the moments needed for the entropy and its derivative in the
        // same pass. The first term contributes 1 to the mass and nothing
        // to the moments.
        let mut mass = 1.0;
        let mut sp = 0.0;
        let mut s2p = 0.0;
        for m in 1..k {
            let s = distances[m] * distances[m] - first;
            let p = (-beta * s).exp();
            output[m] = p;
            mass += p;
            sp += s * p;
            s2p += s * s * p;
        }
        sum_p = mass;

        let entropy = beta * (sp / mass) + mass.ln();
        let diff = entropy - log_perplexity;
        if diff.abs() < CALIBRATION_TOL {
            converged = true;
            break;
        }

        // Attempt a Newton-Raphson step first.
        let mut nr_ok = false;
        if !binary_search_only {
            let d1 = -beta / mass * (s2p - sp * sp / mass);
            if d1 != 0.0 {
                let alt_beta = beta - diff / d1;
                if alt_beta > min_beta && alt_beta < max_beta {
                    beta = alt_beta;
                    nr_ok = true;
                }
            }
        }

        // Otherwise bisect, doubling while the interval is half-open.
        if !nr_ok {
            if diff > 0.0 {
                min_beta = beta;
                if max_beta == f64::MAX {
                    beta *= 2.0;
                } else {
                    beta = (beta + max_beta) / 2.0;
                }
            } else {
                max_beta = beta;
                beta = (beta + min_beta) / 2.0;
            }
        }
    }

    if !converged {
        log::warn!(
            "perplexity calibration for row {} did not converge within {} iterations (beta = {})",
            row,
            CALIBRATION_MAX_ITER,
            beta
        );
    }

    for o in output.iter_mut() {
        *o /= sum_p;
    }
}

/// Symmetrize per-row affinities into a [`NeighborList`].
///
/// `indices[n]` and `probabilities[n]` describe row n of the raw
/// (asymmetric) matrix. The output is symmetric, free of self-edges if
/// the input is, sums to 1 across all entries, and has every row sorted
/// by ascending neighbor index.
pub fn symmetrize(indices: &[Vec<usize>], probabilities: Vec<Vec<f64>>) -> NeighborList {
    let n = indices.len();
    let mut rows: NeighborList = indices
        .iter()
        .zip(probabilities)
        .map(|(idx, probs)| idx.iter().copied().zip(probs).collect())
        .collect();

    // Sort rows by neighbor index and record the pre-symmetrization row
    // lengths and total mass. The monotone scan below only ever searches
    // within a row's original prefix; appended transposes land past it.
    let mut last = vec![0usize; n];
    let mut original = vec![0usize; n];
    let mut total = 0.0;
    for (i, row) in rows.iter_mut().enumerate() {
        row.sort_unstable_by_key(|e| e.0);
        original[i] = row.len();
        total += row.iter().map(|e| e.1).sum::<f64>();
    }

    for first in 0..n {
        for k1 in 0..rows[first].len() {
            let (j, p) = rows[first][k1];

            // Advance row j's cursor to where `first` would sit. The
            // cursor is shared across all lookups into row j and only
            // moves forward, because `first` increases monotonically.
            let limit = original[j];
            let mut cur = last[j];
            while cur < limit && rows[j][cur].0 < first {
                cur += 1;
            }
            last[j] = cur;

            if cur < limit && rows[j][cur].0 == first {
                // Mutual neighbors: sum the two probabilities, once. If
                // first > j this pair was already combined when the outer
                // loop visited j.
                if first < j {
                    let combined = p + rows[j][cur].1;
                    rows[first][k1].1 = combined;
                    rows[j][cur].1 = combined;
                }
            } else {
                // One-sided: mirror the entry into row j.
                rows[j].push((first, p));
            }
        }
    }

    // Divide by twice the pre-symmetrization total so the matrix sums to
    // unity, then restore ascending index order (appends broke it).
    let denom = 2.0 * total;
    for row in rows.iter_mut() {
        for e in row.iter_mut() {
            e.1 /= denom;
        }
        row.sort_unstable_by_key(|e| e.0);
    }

    rows
}
