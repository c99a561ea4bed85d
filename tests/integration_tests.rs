/// End-to-end embedding scenarios with literal inputs.
use bh_tsne::{gaussian_random_init, Tsne};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

#[test]
fn test_collinear_trio_preserves_order() {
    // Three points on a line at 0, 1, 2 (one input dimension), described
    // by K = 2 neighbor lists. After embedding to 2D, the middle point
    // must stay between the endpoints.
    let indices = vec![vec![1, 2], vec![0, 2], vec![1, 0]];
    let distances = vec![vec![1.0, 2.0], vec![1.0, 1.0], vec![1.0, 2.0]];

    let tsne = Tsne::<2>::new();
    let mut status = tsne.initialize(&indices, &distances).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut y = vec![0.0; 3 * 2];
    gaussian_random_init(&mut rng, &mut y);

    tsne.run(&mut status, &mut y).unwrap();
    assert_eq!(status.iteration(), 1000);

    // Project the middle point onto the endpoint axis; strictly between
    // means the projection parameter lies in (0, 1).
    let axis = [y[4] - y[0], y[5] - y[1]];
    let rel = [y[2] - y[0], y[3] - y[1]];
    let t = (rel[0] * axis[0] + rel[1] * axis[1]) / (axis[0] * axis[0] + axis[1] * axis[1]);
    assert!(
        t > 0.05 && t < 0.95,
        "middle point sits at projection {} along the 0-2 axis",
        t
    );
}

/// Two 2D Gaussian blobs centered at (-5, 0) and (5, 0), sigma 1.
fn two_blobs(n_per_cluster: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(n_per_cluster * 4);
    for c in 0..2 {
        let center = if c == 0 { -5.0 } else { 5.0 };
        for _ in 0..n_per_cluster {
            let dx: f64 = rng.sample(StandardNormal);
            let dy: f64 = rng.sample(StandardNormal);
            data.push(center + dx);
            data.push(dy);
        }
    }
    data
}

/// Fraction of inter-cluster pairs farther apart than the mean
/// intra-cluster distance, with the first half of the points forming one
/// cluster.
fn separation_fraction(y: &[f64]) -> f64 {
    let n = y.len() / 2;
    let half = n / 2;
    let dist = |a: usize, b: usize| -> f64 {
        let dx = y[a * 2] - y[b * 2];
        let dy = y[a * 2 + 1] - y[b * 2 + 1];
        (dx * dx + dy * dy).sqrt()
    };

    let mut intra_sum = 0.0;
    let mut intra_count = 0usize;
    for c in 0..2 {
        let start = c * half;
        for i in start..start + half {
            for j in (i + 1)..start + half {
                intra_sum += dist(i, j);
                intra_count += 1;
            }
        }
    }
    let intra_mean = intra_sum / intra_count as f64;

    let mut separated = 0usize;
    let mut inter_count = 0usize;
    for i in 0..half {
        for j in half..n {
            inter_count += 1;
            if dist(i, j) > intra_mean {
                separated += 1;
            }
        }
    }
    separated as f64 / inter_count as f64
}

#[test]
fn test_two_gaussian_blobs_separate() {
    let n = 200;
    let data = two_blobs(n / 2, 8);

    // Perplexity 10 makes the search fetch K = 30 neighbors.
    let mut tsne = Tsne::<2>::new();
    tsne.set_perplexity(10.0);

    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let mut y = vec![0.0; n * 2];
    gaussian_random_init(&mut rng, &mut y);

    tsne.run_from_data(&data, 2, &mut y).unwrap();

    let fraction = separation_fraction(&y);
    assert!(
        fraction > 0.95,
        "only {:.1}% of inter-cluster pairs exceed the mean intra-cluster distance",
        fraction * 100.0
    );
}

#[test]
fn test_two_blobs_separate_with_interpolation() {
    let n = 200;
    let data = two_blobs(n / 2, 9);

    let mut tsne = Tsne::<2>::new();
    tsne.set_perplexity(10.0)
        .set_interpolation(Some(150))
        .set_max_iter(500);

    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let mut y = vec![0.0; n * 2];
    gaussian_random_init(&mut rng, &mut y);

    tsne.run_from_data(&data, 2, &mut y).unwrap();

    // The interpolated field is an approximation of an approximation;
    // cluster structure must still come through clearly.
    let fraction = separation_fraction(&y);
    assert!(
        fraction > 0.9,
        "only {:.1}% of inter-cluster pairs exceed the mean intra-cluster distance",
        fraction * 100.0
    );
}

#[test]
fn test_neighbor_list_and_data_paths_agree() {
    // Feeding run() the same neighbors the internal search would find
    // must give the same embedding.
    let n = 60;
    let data = two_blobs(n / 2, 10);

    let mut tsne = Tsne::<2>::new();
    tsne.set_perplexity(5.0).set_max_iter(50);

    let mut rng = ChaCha8Rng::seed_from_u64(10);
    let mut y_data = vec![0.0; n * 2];
    gaussian_random_init(&mut rng, &mut y_data);
    let mut y_lists = y_data.clone();

    tsne.run_from_data(&data, 2, &mut y_data).unwrap();

    use bh_tsne::{NeighborSearch, VpTree};
    let searcher = VpTree::new(&data, 2);
    let k = 15; // ceil(3 * perplexity)
    let mut indices = Vec::with_capacity(n);
    let mut dists = Vec::with_capacity(n);
    for i in 0..n {
        let hits = searcher.nearest(i, k);
        indices.push(hits.iter().map(|&(j, _)| j).collect::<Vec<_>>());
        dists.push(hits.iter().map(|&(_, d)| d).collect::<Vec<_>>());
    }
    tsne.run_from_neighbors(&indices, &dists, &mut y_lists).unwrap();

    assert_eq!(y_data, y_lists);
}

#[test]
fn test_blob_points_stay_finite() {
    let n = 100;
    let data = two_blobs(n / 2, 11);

    let mut tsne = Tsne::<2>::new();
    tsne.set_perplexity(8.0).set_max_iter(300);

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut y = vec![0.0; n * 2];
    gaussian_random_init(&mut rng, &mut y);

    tsne.run_from_data(&data, 2, &mut y).unwrap();
    assert!(y.iter().all(|v| v.is_finite()));
}
