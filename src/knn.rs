//! Nearest-neighbor search for the convenience initialization path.
//!
//! The algorithm proper only consumes (index, distance) lists; where they
//! come from is the caller's business. This module provides the trait
//! seam for plugging in an external search, plus the customary default: a
//! vantage-point tree over Euclidean distance.
//!
//! The VP-tree reuses the arena layout of [`crate::sptree`]: nodes in a
//! flat vector, children as indices. Construction partitions each range
//! around the median distance to a vantage point; queries walk the tree
//! with a shrinking worst-candidate radius and prune whole subtrees when
//! the triangle inequality rules them out.

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

/// A source of nearest neighbors, one observation at a time.
///
/// Implementations must return neighbors of observation `i` excluding `i`
/// itself, sorted by ascending distance.
pub trait NeighborSearch {
    fn num_obs(&self) -> usize;
    fn nearest(&self, i: usize, k: usize) -> Vec<(usize, f64)>;
}

const NONE: usize = usize::MAX;

struct VpNode {
    /// Observation acting as the vantage point of this subtree.
    index: usize,
    /// Median distance from the vantage point to the rest of the range.
    threshold: f64,
    inner: usize,
    outer: usize,
}

/// Vantage-point tree over Euclidean distance.
pub struct VpTree {
    nodes: Vec<VpNode>,
    data: Vec<f64>,
    dim: usize,
}

impl VpTree {
    /// Build from `data` holding `data.len() / dim` observations, each
    /// observation contiguous.
    pub fn new(data: &[f64], dim: usize) -> Self {
        assert!(dim > 0, "dimension must be positive");
        assert_eq!(data.len() % dim, 0, "data length is not a multiple of dim");
        let n = data.len() / dim;
        let mut tree = VpTree {
            nodes: Vec::with_capacity(n),
            data: data.to_vec(),
            dim,
        };
        let mut items: Vec<usize> = (0..n).collect();
        if !items.is_empty() {
            tree.build(&mut items);
        }
        tree
    }

    /// Recursively build the subtree over `items`, returning its slot.
    /// The first element of the range serves as the vantage point; the
    /// remainder is partitioned around the median distance to it.
    fn build(&mut self, items: &mut [usize]) -> usize {
        let slot = self.nodes.len();
        let vantage = items[0];
        self.nodes.push(VpNode {
            index: vantage,
            threshold: 0.0,
            inner: NONE,
            outer: NONE,
        });
        if items.len() == 1 {
            return slot;
        }

        let rest = &mut items[1..];
        let mid = rest.len() / 2;
        rest.select_nth_unstable_by_key(mid, |&i| OrderedFloat(self.distance(vantage, i)));
        let threshold = self.distance(vantage, rest[mid]);
        self.nodes[slot].threshold = threshold;

        // The closer half (strictly below the median rank) goes inside;
        // the median and everything beyond goes outside.
        let len = items.len();
        if mid > 0 {
            let inner = self.build(&mut items[1..1 + mid]);
            self.nodes[slot].inner = inner;
        }
        let outer = self.build(&mut items[1 + mid..len]);
        self.nodes[slot].outer = outer;
        slot
    }

    /// The `k` nearest neighbors of observation `i`, excluding `i`,
    /// ascending by distance.
    pub fn nearest_neighbors(&self, i: usize, k: usize) -> Vec<(usize, f64)> {
        let mut heap: BinaryHeap<(OrderedFloat<f64>, usize)> = BinaryHeap::with_capacity(k + 1);
        if !self.nodes.is_empty() && k > 0 {
            self.search(0, i, k, &mut heap);
        }
        let mut out: Vec<(usize, f64)> = heap
            .into_iter()
            .map(|(d, j)| (j, d.into_inner()))
            .collect();
        out.sort_unstable_by_key(|&(j, d)| (OrderedFloat(d), j));
        out
    }

    fn search(
        &self,
        pos: usize,
        query: usize,
        k: usize,
        heap: &mut BinaryHeap<(OrderedFloat<f64>, usize)>,
    ) {
        let node = &self.nodes[pos];
        let d = self.distance(query, node.index);

        if node.index != query {
            if heap.len() < k {
                heap.push((OrderedFloat(d), node.index));
            } else if OrderedFloat(d) < heap.peek().unwrap().0 {
                heap.pop();
                heap.push((OrderedFloat(d), node.index));
            }
        }

        if node.inner == NONE && node.outer == NONE {
            return;
        }

        // Worst distance still worth beating; infinity while the heap is
        // not yet full.
        let tau = |heap: &BinaryHeap<(OrderedFloat<f64>, usize)>| -> f64 {
            if heap.len() < k {
                f64::INFINITY
            } else {
                heap.peek().unwrap().0.into_inner()
            }
        };

        if d < node.threshold {
            if node.inner != NONE {
                self.search(node.inner, query, k, heap);
            }
            if node.outer != NONE && d + tau(heap) >= node.threshold {
                self.search(node.outer, query, k, heap);
            }
        } else {
            if node.outer != NONE {
                self.search(node.outer, query, k, heap);
            }
            if node.inner != NONE && d - tau(heap) <= node.threshold {
                self.search(node.inner, query, k, heap);
            }
        }
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        let pa = &self.data[a * self.dim..(a + 1) * self.dim];
        let pb = &self.data[b * self.dim..(b + 1) * self.dim];
        pa.iter()
            .zip(pb)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }
}

impl NeighborSearch for VpTree {
    fn num_obs(&self) -> usize {
        self.nodes.len()
    }

    fn nearest(&self, i: usize, k: usize) -> Vec<(usize, f64)> {
        self.nearest_neighbors(i, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn brute_force(data: &[f64], dim: usize, i: usize, k: usize) -> Vec<(usize, f64)> {
        let n = data.len() / dim;
        let dist = |a: usize, b: usize| -> f64 {
            (0..dim)
                .map(|d| (data[a * dim + d] - data[b * dim + d]).powi(2))
                .sum::<f64>()
                .sqrt()
        };
        let mut all: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, dist(i, j)))
            .collect();
        all.sort_unstable_by_key(|&(j, d)| (OrderedFloat(d), j));
        all.truncate(k);
        all
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let dim = 5;
        let n = 120;
        let data: Vec<f64> = (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let tree = VpTree::new(&data, dim);
        for i in [0, 7, 59, 119] {
            let found = tree.nearest_neighbors(i, 10);
            let expected = brute_force(&data, dim, i, 10);
            assert_eq!(found.len(), 10);
            for (f, e) in found.iter().zip(&expected) {
                assert!(
                    (f.1 - e.1).abs() < 1e-12,
                    "distance mismatch for query {}: {:?} vs {:?}",
                    i,
                    f,
                    e
                );
            }
        }
    }

    #[test]
    fn test_excludes_self_and_sorts_ascending() {
        let data = vec![0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 3.0, 3.0];
        let tree = VpTree::new(&data, 2);
        let found = tree.nearest_neighbors(0, 3);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|&(j, _)| j != 0));
        for w in found.windows(2) {
            assert!(w[0].1 <= w[1].1);
        }
        assert_eq!(found[0].0, 1);
    }

    #[test]
    fn test_k_larger_than_candidates() {
        let data = vec![0.0, 0.0, 1.0, 1.0];
        let tree = VpTree::new(&data, 2);
        let found = tree.nearest_neighbors(0, 5);
        assert_eq!(found.len(), 1);
    }
}
