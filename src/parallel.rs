//! Pluggable data-parallel execution over the observations.
//!
//! Every parallel stage of the algorithm has the same shape: N independent
//! tasks, task `i` writing only to its own slot of an output buffer. That
//! shape is captured here once, with three interchangeable execution modes:
//!
//! - [`Parallelism::Sequential`]: a plain loop. The default, and the mode
//!   required for bit-reproducible runs.
//! - [`Parallelism::ThreadPool`]: rayon's work-stealing pool.
//! - [`Parallelism::Custom`]: a caller-supplied parallel-for, so the
//!   library can be embedded inside a larger parallel framework without
//!   spawning its own threads.
//!
//! Reductions are NOT performed here. Stages that need a global sum (the
//! repulsive normalization term) write per-task contributions to their own
//! slot and the caller reduces serially in index order, so the result does
//! not depend on scheduler decisions.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;

/// A caller-supplied parallel-for.
///
/// Invoked as `f(n, body)`. The callback must invoke `body(start, end)` for
/// a set of disjoint subranges that exactly cover `0..n`, each range at
/// most once; ranges may be executed concurrently on any threads. Anything
/// else (overlapping ranges, gaps, double execution) is a contract
/// violation and leads to unspecified results or data races.
pub type CustomParallelFor = Arc<dyn Fn(usize, &(dyn Fn(usize, usize) + Sync)) + Send + Sync>;

/// Execution mode for the data-parallel stages.
#[derive(Clone, Default)]
pub enum Parallelism {
    /// Run every task on the calling thread, in index order.
    #[default]
    Sequential,
    /// Run tasks on rayon's global thread pool.
    ThreadPool,
    /// Delegate scheduling to a user-supplied parallel-for.
    Custom(CustomParallelFor),
}

impl fmt::Debug for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parallelism::Sequential => f.write_str("Sequential"),
            Parallelism::ThreadPool => f.write_str("ThreadPool"),
            Parallelism::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Parallelism {
    /// Apply `body(i, &mut items[i])` for every `i`, in parallel according
    /// to the selected mode. Each task touches only its own element, so no
    /// synchronization is needed beyond joining the tasks.
    pub fn for_each_mut<T, F>(&self, items: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        match self {
            Parallelism::Sequential => {
                for (i, item) in items.iter_mut().enumerate() {
                    body(i, item);
                }
            }
            Parallelism::ThreadPool => {
                items
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(i, item)| body(i, item));
            }
            Parallelism::Custom(launch) => {
                let n = items.len();
                let base = SendPtr(items.as_mut_ptr());
                let body = &body;
                launch(n, &move |start: usize, end: usize| {
                    let base = &base;
                    debug_assert!(start <= end && end <= n);
                    for i in start..end {
                        // SAFETY: the CustomParallelFor contract requires
                        // disjoint subranges of 0..n, so element i is
                        // accessed by exactly one task.
                        let item = unsafe { &mut *base.0.add(i) };
                        body(i, item);
                    }
                });
            }
        }
    }
}

struct SendPtr<T>(*mut T);

// SAFETY: the pointer is only dereferenced for indices handed out by the
// disjoint-range contract above, with T: Send.
unsafe impl<T: Send> Send for SendPtr<T> {}
unsafe impl<T: Send> Sync for SendPtr<T> {}
