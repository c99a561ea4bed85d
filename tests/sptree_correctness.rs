/// SPTree Structural and Numerical Tests
///
/// Verifies the invariants the gradient engine relies on:
/// - Every root-to-leaf path respects the depth bound
/// - Each internal node's count equals the sum of its children's counts
/// - Each child sits in the octant implied by its slot bits, with half
///   its parent's halfwidth
/// - Total leaf population equals N, and every point's recorded leaf is
///   consistent
/// - With theta = 0 and singleton leaves, the traversal reproduces the
///   exact O(N^2) pairwise repulsion
use bh_tsne::sptree::{Node, SpTree};

use approx::assert_relative_eq;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

fn normal_points(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n * 2)
        .map(|_| rng.sample::<f64, _>(StandardNormal))
        .collect()
}

fn validate_node(
    store: &[Node<2>],
    pos: usize,
    covered: &mut [bool],
    leaf_count: &mut usize,
    maxdepth: usize,
    depth: usize,
) {
    let node = &store[pos];
    covered[pos] = true;
    assert!(depth <= maxdepth, "path length {} exceeds bound {}", depth, maxdepth);

    for d in 0..2 {
        assert!(node.halfwidth[d] > 0.0);
        if pos != 0 {
            // The root's center of mass is never computed; everyone
            // else's must lie inside its own box.
            assert!(node.center_of_mass[d] >= node.midpoint[d] - node.halfwidth[d]);
            assert!(node.center_of_mass[d] <= node.midpoint[d] + node.halfwidth[d]);
        }
    }

    if node.is_leaf {
        *leaf_count += node.number;
        assert!(node.children.iter().all(|&c| c == 0));
        return;
    }

    let mut child_total = 0;
    for (slot, &c) in node.children.iter().enumerate() {
        if c == 0 {
            continue;
        }
        let child = &store[c];
        child_total += child.number;

        for d in 0..2 {
            if slot >> d & 1 == 1 {
                assert!(child.midpoint[d] > node.midpoint[d]);
                assert!(child.midpoint[d] < node.midpoint[d] + node.halfwidth[d]);
            } else {
                assert!(child.midpoint[d] < node.midpoint[d]);
                assert!(child.midpoint[d] > node.midpoint[d] - node.halfwidth[d]);
            }
            assert_eq!(node.halfwidth[d] / 2.0, child.halfwidth[d]);
        }

        validate_node(store, c, covered, leaf_count, maxdepth, depth + 1);
    }

    assert_eq!(child_total, node.number, "node {} count mismatch", pos);
    assert!(node.number > 0);
}

fn check_tree(n: usize, maxdepth: usize, seed: u64) {
    let y = normal_points(n, seed);
    let mut tree = SpTree::<2>::new(n, maxdepth);
    tree.set(&y);

    let store = tree.store();

    // All points strictly inside the root box.
    for i in 0..n {
        for d in 0..2 {
            let pos = y[i * 2 + d];
            assert!(pos < store[0].midpoint[d] + store[0].halfwidth[d]);
            assert!(pos > store[0].midpoint[d] - store[0].halfwidth[d]);
        }
    }

    let mut covered = vec![false; store.len()];
    let mut leaf_count = 0;
    validate_node(store, 0, &mut covered, &mut leaf_count, maxdepth, 0);
    assert!(covered.iter().all(|&c| c), "store contains unreachable nodes");
    assert_eq!(leaf_count, n, "leaf population does not cover every point");

    let locations = tree.locations();
    assert_eq!(locations.len(), n);
    for (i, &loc) in locations.iter().enumerate() {
        let node = &store[loc];
        assert!(node.is_leaf);
        if node.number == 1 {
            for d in 0..2 {
                assert_eq!(y[i * 2 + d], node.center_of_mass[d]);
            }
        } else {
            for d in 0..2 {
                let pos = y[i * 2 + d];
                assert!(pos < node.midpoint[d] + node.halfwidth[d]);
                assert!(pos > node.midpoint[d] - node.halfwidth[d]);
            }
        }
    }
}

#[test]
fn test_structure_across_sizes_and_depths() {
    for &n in &[10usize, 100, 500] {
        for &maxdepth in &[3usize, 7, 20] {
            check_tree(n, maxdepth, (n + maxdepth) as u64);
        }
    }
}

fn reference_non_edge_forces(y: &[f64], i: usize, neg: &mut [f64; 2]) -> f64 {
    let n = y.len() / 2;
    let mut sum = 0.0;
    *neg = [0.0; 2];
    for j in 0..n {
        if i == j {
            continue;
        }
        let dx = y[i * 2] - y[j * 2];
        let dy = y[i * 2 + 1] - y[j * 2 + 1];
        let q = 1.0 / (1.0 + dx * dx + dy * dy);
        sum += q;
        neg[0] += q * q * dx;
        neg[1] += q * q * dy;
    }
    sum
}

#[test]
fn test_exact_mode_matches_brute_force() {
    let n = 100;
    let y = normal_points(n, 1234);
    let mut tree = SpTree::<2>::new(n, 20);
    tree.set(&y);

    // Depth 20 over 100 well-separated points: every leaf must be a
    // singleton, otherwise theta = 0 is not exact.
    for node in tree.store() {
        assert!(!(node.is_leaf && node.number > 1), "tree is truncated at depth 20");
    }

    for i in 0..20 {
        let mut neg = [0.0; 2];
        let sum = tree.compute_non_edge_forces(i, 0.0, &mut neg);

        let mut ref_neg = [0.0; 2];
        let ref_sum = reference_non_edge_forces(&y, i, &mut ref_neg);

        assert_relative_eq!(sum, ref_sum, max_relative = 1e-6);
        assert_relative_eq!(neg[0], ref_neg[0], max_relative = 1e-6);
        assert_relative_eq!(neg[1], ref_neg[1], max_relative = 1e-6);
    }
}

#[test]
fn test_approximate_mode_is_close_and_positive() {
    let n = 200;
    let y = normal_points(n, 77);
    let mut tree = SpTree::<2>::new(n, 7);
    tree.set(&y);

    for i in 0..n {
        let mut neg = [0.0; 2];
        let approx = tree.compute_non_edge_forces(i, 0.5, &mut neg);
        assert!(approx > 0.0);
        assert!(neg[0].is_finite() && neg[1].is_finite());

        let mut ref_neg = [0.0; 2];
        let exact = reference_non_edge_forces(&y, i, &mut ref_neg);
        // theta = 0.5 is an approximation, but not a wild one.
        assert!(
            (approx - exact).abs() / exact < 0.1,
            "point {}: approximate Q {} strays too far from exact {}",
            i,
            approx,
            exact
        );
    }
}
