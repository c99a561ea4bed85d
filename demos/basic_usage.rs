use bh_tsne::{gaussian_random_init, Parallelism, Tsne};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

fn main() {
    println!("=== bh_tsne: Barnes-Hut t-SNE Examples ===\n");

    blob_embedding_example();
    println!();
    neighbor_list_example();
}

fn blob_embedding_example() {
    println!("1. Embedding Two Gaussian Blobs");
    println!("--------------------------------");

    let n_per_cluster = 150;
    let mut rng = ChaCha8Rng::seed_from_u64(42);
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
    let n = n_per_cluster * 2;

    let mut tsne = Tsne::<2>::new();
    tsne.set_perplexity(10.0)
        .set_max_iter(500)
        .set_parallelism(Parallelism::ThreadPool);

    let mut y = vec![0.0; n * 2];
    gaussian_random_init(&mut rng, &mut y);

    println!("Embedding {} points from 2 clusters...", n);
    tsne.run_from_data(&data, 2, &mut y).unwrap();

    let centroid = |range: std::ops::Range<usize>| -> (f64, f64) {
        let len = range.len() as f64;
        let (mut cx, mut cy) = (0.0, 0.0);
        for i in range {
            cx += y[i * 2];
            cy += y[i * 2 + 1];
        }
        (cx / len, cy / len)
    };

    let (ax, ay) = centroid(0..n_per_cluster);
    let (bx, by) = centroid(n_per_cluster..n);
    let gap = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();

    println!("Cluster A centroid: ({:.2}, {:.2})", ax, ay);
    println!("Cluster B centroid: ({:.2}, {:.2})", bx, by);
    println!("Centroid separation: {:.2}", gap);
}

fn neighbor_list_example() {
    println!("2. Precomputed Neighbor Lists");
    println!("------------------------------");

    // Five points on a line; each lists its two nearest neighbors.
    let indices = vec![
        vec![1, 2],
        vec![0, 2],
        vec![1, 3],
        vec![2, 4],
        vec![3, 2],
    ];
    let distances = vec![
        vec![1.0, 2.0],
        vec![1.0, 1.0],
        vec![1.0, 1.0],
        vec![1.0, 1.0],
        vec![1.0, 2.0],
    ];

    let mut tsne = Tsne::<2>::new();
    tsne.set_max_iter(800);

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut y = vec![0.0; 5 * 2];
    gaussian_random_init(&mut rng, &mut y);

    let status = tsne.run_from_neighbors(&indices, &distances, &mut y).unwrap();
    println!("Ran {} iterations", status.iteration());

    println!("Final embedding:");
    for i in 0..5 {
        println!("  point {}: ({:+.3}, {:+.3})", i, y[i * 2], y[i * 2 + 1]);
    }

    // Consecutive line neighbors should stay closer than the endpoints.
    let d = |a: usize, b: usize| -> f64 {
        ((y[a * 2] - y[b * 2]).powi(2) + (y[a * 2 + 1] - y[b * 2 + 1]).powi(2)).sqrt()
    };
    println!("Neighbor distance 0-1: {:.3}", d(0, 1));
    println!("Endpoint distance 0-4: {:.3}", d(0, 4));
    println!("Line order preserved: {}", d(0, 1) < d(0, 4));
}
