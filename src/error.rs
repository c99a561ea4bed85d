//! Error types surfaced at the `initialize` and `run` boundaries.
//!
//! Everything inside the iteration loop is total; the only failure points
//! are input validation and the interpolator's dimensionality restriction.
//! Perplexity-solver non-convergence is deliberately NOT an error: it is a
//! soft condition logged with `log::warn!` (a pathological row must not
//! halt a whole batch).

use thiserror::Error;

/// Errors reported by [`crate::Tsne`].
///
/// The first three variants are invalid-input conditions; the last is an
/// unsupported-configuration condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TsneError {
    /// Requested more neighbors per observation than there are other
    /// observations (K must be smaller than N).
    #[error("{k} neighbors per observation requires more than {k} observations, got {n}")]
    InsufficientObservations { n: usize, k: usize },

    /// The per-row neighbor index and distance lists disagree in length,
    /// or a row's length differs from the first row's.
    #[error("neighbor index and distance lists disagree in length at row {row}")]
    MismatchedNeighbors { row: usize },

    /// The number of index rows and distance rows differ.
    #[error("expected {expected} rows of neighbor distances, got {got}")]
    MismatchedRows { expected: usize, got: usize },

    /// A neighbor distance was NaN or infinite.
    #[error("non-finite neighbor distance at row {row}")]
    NonFiniteDistance { row: usize },

    /// Grid interpolation was requested for an embedding dimensionality
    /// other than 2.
    #[error("grid interpolation requires a 2-dimensional embedding, got {ndim}")]
    UnsupportedDimension { ndim: usize },
}
