//! The t-SNE driver: configuration, precomputed state, and the gradient
//! descent loop.
//!
//! The iteration follows van der Maaten's Barnes-Hut formulation. Each
//! step rebuilds the space-partitioning tree over the current embedding,
//! accumulates attractive forces over the sparse affinity rows and
//! repulsive forces through the tree (or the grid interpolator), then
//! applies an adaptive-gain momentum update and re-centers the embedding.
//!
//! Two schedule switches are driven by the iteration counter:
//!
//! - **Early exaggeration**: affinities are scaled by a constant factor
//!   for the opening iterations, so neighbors collapse into tight
//!   proto-clusters with room to move before the layout settles.
//! - **Momentum switch**: a conservative starting momentum gives way to a
//!   larger final momentum once the gross structure is in place.
//!
//! ## References
//!
//! van der Maaten, L.J.P. and Hinton, G.E. (2008).
//! Visualizing high-dimensional data using t-SNE.
//! Journal of Machine Learning Research, 9, 2579-2605.
//!
//! van der Maaten, L.J.P. (2014).
//! Accelerating t-SNE using tree-based algorithms.
//! Journal of Machine Learning Research, 15, 3221-3245.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::affinity::{self, NeighborList};
use crate::error::TsneError;
use crate::interpolate;
use crate::knn::{NeighborSearch, VpTree};
use crate::parallel::Parallelism;
use crate::sptree::SpTree;

/// Default parameter values, matching the reference schedule.
pub mod defaults {
    pub const PERPLEXITY: f64 = 30.0;
    pub const THETA: f64 = 0.5;
    pub const MAX_ITER: usize = 1000;
    pub const STOP_LYING_ITER: usize = 250;
    pub const MOM_SWITCH_ITER: usize = 250;
    pub const START_MOMENTUM: f64 = 0.5;
    pub const FINAL_MOMENTUM: f64 = 0.8;
    pub const ETA: f64 = 200.0;
    pub const EXAGGERATION_FACTOR: f64 = 12.0;
    pub const MAX_DEPTH: usize = 7;
}

const MIN_GAIN: f64 = 0.01;

/// Precomputed structures carried across iterations: the symmetric
/// affinities, the gradient working buffers, and the reusable tree.
///
/// Obtain one from an `initialize` method and hand it to
/// [`Tsne::run`]; the internals are not meant to be manipulated directly.
pub struct Status<const D: usize = 2> {
    neighbors: NeighborList,
    dy: Vec<[f64; D]>,
    uy: Vec<[f64; D]>,
    gains: Vec<[f64; D]>,
    pos_f: Vec<[f64; D]>,
    /// Per-point repulsive force and contribution to the normalization
    /// sum; summed serially in index order.
    neg_f: Vec<([f64; D], f64)>,
    tree: SpTree<D>,
    iter: usize,
}

impl<const D: usize> Status<D> {
    fn new(neighbors: NeighborList, maxdepth: usize) -> Self {
        let n = neighbors.len();
        Status {
            neighbors,
            dy: vec![[0.0; D]; n],
            uy: vec![[0.0; D]; n],
            gains: vec![[1.0; D]; n],
            pos_f: vec![[0.0; D]; n],
            neg_f: vec![([0.0; D], 0.0); n],
            tree: SpTree::new(n, maxdepth),
            iter: 0,
        }
    }

    /// Number of iterations performed on this object so far.
    pub fn iteration(&self) -> usize {
        self.iter
    }

    /// Number of observations.
    pub fn num_obs(&self) -> usize {
        self.neighbors.len()
    }

    /// The symmetric affinity matrix P, one ascending-index row of
    /// `(neighbor, probability)` pairs per observation.
    pub fn neighbors(&self) -> &NeighborList {
        &self.neighbors
    }
}

/// Barnes-Hut t-SNE over a `D`-dimensional embedding (default 2).
///
/// Configure with the `set_*` methods, then call one of the `initialize`
/// methods to build a [`Status`] and [`run`](Tsne::run) to iterate:
///
/// ```
/// use bh_tsne::Tsne;
///
/// let mut tsne = Tsne::<2>::new();
/// tsne.set_max_iter(500).set_theta(0.5);
/// ```
#[derive(Clone, Debug)]
pub struct Tsne<const D: usize = 2> {
    perplexity: f64,
    theta: f64,
    max_iter: usize,
    stop_lying_iter: usize,
    mom_switch_iter: usize,
    start_momentum: f64,
    final_momentum: f64,
    eta: f64,
    exaggeration_factor: f64,
    max_depth: usize,
    beta_binary_search_only: bool,
    interpolation: Option<usize>,
    parallelism: Parallelism,
}

impl<const D: usize> Default for Tsne<D> {
    fn default() -> Self {
        Tsne {
            perplexity: defaults::PERPLEXITY,
            theta: defaults::THETA,
            max_iter: defaults::MAX_ITER,
            stop_lying_iter: defaults::STOP_LYING_ITER,
            mom_switch_iter: defaults::MOM_SWITCH_ITER,
            start_momentum: defaults::START_MOMENTUM,
            final_momentum: defaults::FINAL_MOMENTUM,
            eta: defaults::ETA,
            exaggeration_factor: defaults::EXAGGERATION_FACTOR,
            max_depth: defaults::MAX_DEPTH,
            beta_binary_search_only: false,
            interpolation: None,
            parallelism: Parallelism::Sequential,
        }
    }
}

impl<const D: usize> Tsne<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perplexity for the neighbor-search initialization paths. The
    /// precomputed-neighbor path ignores this and uses K/3 instead.
    pub fn set_perplexity(&mut self, p: f64) -> &mut Self {
        self.perplexity = p;
        self
    }

    /// Barnes-Hut accuracy parameter. Smaller is more exact and slower;
    /// 0 reproduces the pairwise sum.
    pub fn set_theta(&mut self, t: f64) -> &mut Self {
        self.theta = t;
        self
    }

    pub fn set_max_iter(&mut self, m: usize) -> &mut Self {
        self.max_iter = m;
        self
    }

    /// Iteration at which early exaggeration ends.
    pub fn set_stop_lying_iter(&mut self, s: usize) -> &mut Self {
        self.stop_lying_iter = s;
        self
    }

    /// Iteration at which the momentum switches to its final value.
    pub fn set_mom_switch_iter(&mut self, m: usize) -> &mut Self {
        self.mom_switch_iter = m;
        self
    }

    pub fn set_start_momentum(&mut self, s: f64) -> &mut Self {
        self.start_momentum = s;
        self
    }

    pub fn set_final_momentum(&mut self, f: f64) -> &mut Self {
        self.final_momentum = f;
        self
    }

    /// Learning rate.
    pub fn set_eta(&mut self, e: f64) -> &mut Self {
        self.eta = e;
        self
    }

    /// Affinity scale factor during the early exaggeration phase.
    pub fn set_exaggeration_factor(&mut self, e: f64) -> &mut Self {
        self.exaggeration_factor = e;
        self
    }

    /// Depth bound of the space-partitioning tree.
    pub fn set_max_depth(&mut self, m: usize) -> &mut Self {
        self.max_depth = m;
        self
    }

    /// Restrict the perplexity solver to pure bisection, skipping the
    /// Newton-Raphson attempts. Useful for determinism testing.
    pub fn set_beta_binary_search_only(&mut self, b: bool) -> &mut Self {
        self.beta_binary_search_only = b;
        self
    }

    /// Enable grid-interpolated repulsion with the given lattice interval
    /// count, or disable it with `None`. Only valid for `D == 2`; other
    /// dimensionalities are rejected by [`run`](Tsne::run).
    pub fn set_interpolation(&mut self, intervals: Option<usize>) -> &mut Self {
        self.interpolation = intervals;
        self
    }

    /// Execution mode for the data-parallel stages.
    pub fn set_parallelism(&mut self, p: Parallelism) -> &mut Self {
        self.parallelism = p;
        self
    }

    /// Build a [`Status`] from precomputed nearest neighbors:
    /// `indices[n]` and `distances[n]` hold observation n's K neighbors
    /// by ascending distance. The perplexity is taken as K/3.
    pub fn initialize(
        &self,
        indices: &[Vec<usize>],
        distances: &[Vec<f64>],
    ) -> Result<Status<D>, TsneError> {
        let n = indices.len();
        if distances.len() != n {
            return Err(TsneError::MismatchedRows {
                expected: n,
                got: distances.len(),
            });
        }
        let k = indices.first().map_or(0, |row| row.len());
        if k == 0 || k >= n {
            return Err(TsneError::InsufficientObservations { n, k });
        }
        for row in 0..n {
            if indices[row].len() != k || distances[row].len() != k {
                return Err(TsneError::MismatchedNeighbors { row });
            }
            if distances[row].iter().any(|d| !d.is_finite()) {
                return Err(TsneError::NonFiniteDistance { row });
            }
        }

        let perplexity = k as f64 / 3.0;
        log::info!(
            "initializing t-SNE: {} observations, {} neighbors each (perplexity {:.2})",
            n,
            k,
            perplexity
        );

        let probabilities = affinity::compute_gaussian_perplexity(
            distances,
            perplexity.ln(),
            self.beta_binary_search_only,
            &self.parallelism,
        );
        let neighbors = affinity::symmetrize(indices, probabilities);
        Ok(Status::new(neighbors, self.max_depth))
    }

    /// Build a [`Status`] from a pluggable neighbor search, asking it for
    /// K = ceil(3 * perplexity) neighbors per observation.
    pub fn initialize_with_searcher<S>(&self, searcher: &S) -> Result<Status<D>, TsneError>
    where
        S: NeighborSearch + Sync,
    {
        let n = searcher.num_obs();
        let k = (self.perplexity * 3.0).ceil() as usize;
        if k >= n {
            return Err(TsneError::InsufficientObservations { n, k });
        }

        let mut found: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        self.parallelism.for_each_mut(&mut found, |i, out| {
            *out = searcher.nearest(i, k);
        });

        let mut indices = Vec::with_capacity(n);
        let mut distances = Vec::with_capacity(n);
        for hits in found {
            indices.push(hits.iter().map(|&(j, _)| j).collect());
            distances.push(hits.iter().map(|&(_, d)| d).collect());
        }
        self.initialize(&indices, &distances)
    }

    /// Build a [`Status`] directly from high-dimensional input data
    /// (`data.len() / dim` observations, each contiguous), running the
    /// built-in vantage-point tree search.
    pub fn initialize_from_data(&self, data: &[f64], dim: usize) -> Result<Status<D>, TsneError> {
        let searcher = VpTree::new(data, dim);
        self.initialize_with_searcher(&searcher)
    }

    /// Run iterations from `status.iteration()` up to the configured
    /// maximum, updating the embedding `y` (flat, observation-major) in
    /// place. Calling again with a larger `set_max_iter` resumes where
    /// the previous call stopped.
    pub fn run(&self, status: &mut Status<D>, y: &mut [f64]) -> Result<(), TsneError> {
        if self.interpolation.is_some() && D != 2 {
            return Err(TsneError::UnsupportedDimension { ndim: D });
        }
        assert_eq!(
            y.len(),
            status.num_obs() * D,
            "embedding length does not match observation count"
        );

        while status.iter < self.max_iter {
            if status.iter == self.stop_lying_iter {
                log::debug!("iteration {}: ending early exaggeration", status.iter);
            }
            if status.iter == self.mom_switch_iter {
                log::debug!("iteration {}: switching to final momentum", status.iter);
            }
            let multiplier = if status.iter < self.stop_lying_iter {
                self.exaggeration_factor
            } else {
                1.0
            };
            let momentum = if status.iter < self.mom_switch_iter {
                self.start_momentum
            } else {
                self.final_momentum
            };
            self.iterate(status, y, multiplier, momentum)?;
        }
        Ok(())
    }

    /// Initialize from precomputed neighbors and run in one call.
    pub fn run_from_neighbors(
        &self,
        indices: &[Vec<usize>],
        distances: &[Vec<f64>],
        y: &mut [f64],
    ) -> Result<Status<D>, TsneError> {
        let mut status = self.initialize(indices, distances)?;
        self.run(&mut status, y)?;
        Ok(status)
    }

    /// Initialize from raw input data and run in one call.
    pub fn run_from_data(
        &self,
        data: &[f64],
        dim: usize,
        y: &mut [f64],
    ) -> Result<Status<D>, TsneError> {
        let mut status = self.initialize_from_data(data, dim)?;
        self.run(&mut status, y)?;
        Ok(status)
    }

    fn iterate(
        &self,
        status: &mut Status<D>,
        y: &mut [f64],
        multiplier: f64,
        momentum: f64,
    ) -> Result<(), TsneError> {
        self.compute_gradient(status, y, multiplier)?;

        let n = status.num_obs();

        // Adaptive gains (Jacobs' rule): grow on a sign flip, shrink
        // otherwise. A zero gradient does not count as a flip.
        for i in 0..n {
            for d in 0..D {
                let g = &mut status.gains[i][d];
                let updated = if sign(status.dy[i][d]) != sign(status.uy[i][d]) {
                    *g + 0.2
                } else {
                    *g * 0.8
                };
                *g = updated.max(MIN_GAIN);
            }
        }

        // Momentum update.
        for i in 0..n {
            for d in 0..D {
                status.uy[i][d] =
                    momentum * status.uy[i][d] - self.eta * status.gains[i][d] * status.dy[i][d];
                y[i * D + d] += status.uy[i][d];
            }
        }

        // Re-establish the zero-mean invariant per dimension.
        for d in 0..D {
            let mut mean = 0.0;
            for i in 0..n {
                mean += y[i * D + d];
            }
            mean /= n as f64;
            for i in 0..n {
                y[i * D + d] -= mean;
            }
        }

        status.iter += 1;
        Ok(())
    }

    fn compute_gradient(
        &self,
        status: &mut Status<D>,
        y: &[f64],
        multiplier: f64,
    ) -> Result<(), TsneError> {
        status.tree.set(y);

        // Attractive forces over the sparse affinity rows; each
        // observation writes only its own accumulator.
        let neighbors = &status.neighbors;
        self.parallelism.for_each_mut(&mut status.pos_f, |i, out| {
            *out = [0.0; D];
            let own = &y[i * D..(i + 1) * D];
            for &(j, p) in &neighbors[i] {
                let other = &y[j * D..(j + 1) * D];
                let mut sqdist = 0.0;
                for d in 0..D {
                    let delta = own[d] - other[d];
                    sqdist += delta * delta;
                }
                let mult = multiplier * p / (1.0 + sqdist);
                for d in 0..D {
                    out[d] += mult * (own[d] - other[d]);
                }
            }
        });

        // Repulsive forces, either through the tree directly or via the
        // grid interpolator. Per-point Q contributions land in their own
        // slot; the reduction below is serial and in index order so the
        // total does not depend on scheduling.
        let tree = &status.tree;
        match self.interpolation {
            Some(intervals) => {
                interpolate::compute_non_edge_forces(
                    tree,
                    y,
                    self.theta,
                    intervals,
                    &self.parallelism,
                    &mut status.neg_f,
                )?;
            }
            None => {
                let theta = self.theta;
                self.parallelism.for_each_mut(&mut status.neg_f, |i, out| {
                    out.1 = tree.compute_non_edge_forces(i, theta, &mut out.0);
                });
            }
        }
        let sum_q: f64 = status.neg_f.iter().map(|&(_, q)| q).sum();

        for i in 0..status.dy.len() {
            for d in 0..D {
                status.dy[i][d] = status.pos_f[i][d] - status.neg_f[i].0[d] / sum_q;
            }
        }
        Ok(())
    }
}

fn sign(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Fill `y` with the customary initial embedding: small Gaussian noise
/// (standard deviation 1e-4) from a caller-provided generator, so runs
/// are reproducible under a fixed seed.
pub fn gaussian_random_init<R: Rng + ?Sized>(rng: &mut R, y: &mut [f64]) {
    for v in y.iter_mut() {
        let z: f64 = rng.sample(StandardNormal);
        *v = z * 1e-4;
    }
}
