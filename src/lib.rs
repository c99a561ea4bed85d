//! # bh_tsne: Barnes-Hut t-SNE
//!
//! Implementation of the tree-accelerated t-SNE algorithm from:
//! "Accelerating t-SNE using tree-based algorithms"
//! by van der Maaten (JMLR 15, 2014), building on
//! "Visualizing high-dimensional data using t-SNE" (JMLR 9, 2008).
//!
//! ## Purpose
//!
//! Given N observations described by their K nearest neighbors, this
//! library computes a low-dimensional embedding (usually 2D) whose local
//! neighborhoods mirror those of the input, by minimizing the KL
//! divergence between a Gaussian input similarity distribution and a
//! heavy-tailed output similarity distribution.
//!
//! ## Algorithm Overview
//!
//! 1. **Affinities**: each observation's neighbor distances are converted
//!    to probabilities with a per-row Gaussian bandwidth calibrated to a
//!    target perplexity, then symmetrized into a sparse matrix P.
//!
//! 2. **Iteration**: the embedding follows the KL gradient, split into
//!    attractive forces over the sparse P entries and repulsive forces
//!    between all pairs.
//!
//! 3. **Barnes-Hut**: repulsion is approximated with a depth-bounded
//!    2^d-tree rebuilt each iteration; distant regions act as point
//!    masses at their centers of mass, bringing the cost from O(N^2) to
//!    O(N log N) per iteration.
//!
//! 4. **Interpolation (optional)**: for 2D embeddings, repulsion can be
//!    evaluated only at the vertices of a lattice and interpolated
//!    bilinearly to the points, amortizing tree traversals across dense
//!    clusters.
//!
//! ## Key Implementation Details
//!
//! ### Arena trees
//! Both the space-partitioning tree and the vantage-point tree store
//! their nodes in flat vectors with index children. The gradient tree is
//! cleared and rebuilt every iteration without deallocating.
//!
//! ### Pluggable parallelism
//! The data-parallel stages run through an injectable parallel-for
//! ([`Parallelism`]): sequential, rayon thread pool, or a caller-supplied
//! scheduler for embedding in larger frameworks. Reductions are always
//! serial and in index order, so a fixed seed plus sequential execution
//! reproduces results bit for bit.
//!
//! ### Numerical care in calibration
//! Squared neighbor distances are shifted by each row's minimum before
//! exponentiation (underflow protection with no effect on the result),
//! and the bandwidth search is Newton-Raphson bracketed by bisection.
//!
//! ## Usage
//!
//! ```no_run
//! use bh_tsne::{gaussian_random_init, Tsne};
//! use rand::SeedableRng;
//!
//! let data: Vec<f64> = load_points(); // N observations, 10 values each
//! let n = data.len() / 10;
//!
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
//! let mut embedding = vec![0.0; n * 2];
//! gaussian_random_init(&mut rng, &mut embedding);
//!
//! let mut tsne = Tsne::<2>::new();
//! tsne.set_perplexity(30.0).set_theta(0.5);
//! tsne.run_from_data(&data, 10, &mut embedding).unwrap();
//! # fn load_points() -> Vec<f64> { vec![0.0; 1000] }
//! ```

pub mod affinity;
pub mod error;
pub mod interpolate;
pub mod knn;
pub mod parallel;
pub mod sptree;
pub mod tsne;

pub use affinity::NeighborList;
pub use error::TsneError;
pub use knn::{NeighborSearch, VpTree};
pub use parallel::{CustomParallelFor, Parallelism};
pub use sptree::SpTree;
pub use tsne::{defaults, gaussian_random_init, Status, Tsne};
