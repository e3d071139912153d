//! K-means clustering over the full-dimensional embedding batch.
//!
//! Partitions records into a fixed number of clusters with Euclidean
//! distance, k-means++ initialization, and a fixed random seed so that
//! identical input always yields identical assignments.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CatalogError;

/// Fixed number of clusters for the catalog layout.
pub const CLUSTER_COUNT: usize = 15;

/// Seed shared by every refresh so generations are reproducible.
const RANDOM_SEED: u64 = 42;

const MAX_ITERATIONS: usize = 100;

/// Assign each embedding to one of [`CLUSTER_COUNT`] clusters.
///
/// Returns one cluster id in `[0, CLUSTER_COUNT)` per input vector, in
/// input order. Fails with [`CatalogError::InsufficientData`] when the
/// batch cannot fill every cluster, and
/// [`CatalogError::DimensionMismatch`] when vectors disagree on
/// dimensionality.
pub fn assign_clusters(embeddings: &[Vec<f32>]) -> Result<Vec<usize>, CatalogError> {
    kmeans(embeddings, CLUSTER_COUNT, RANDOM_SEED)
}

fn kmeans(vectors: &[Vec<f32>], k: usize, seed: u64) -> Result<Vec<usize>, CatalogError> {
    if vectors.len() < k {
        return Err(CatalogError::InsufficientData {
            needed: k,
            got: vectors.len(),
        });
    }

    let dims = vectors[0].len();
    for (row, v) in vectors.iter().enumerate() {
        if v.len() != dims {
            return Err(CatalogError::DimensionMismatch {
                row,
                expected: dims,
                found: v.len(),
            });
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = init_centroids(vectors, k, &mut rng);
    let mut assignments = vec![0usize; vectors.len()];

    for _ in 0..MAX_ITERATIONS {
        let new_assignments: Vec<usize> = vectors
            .iter()
            .map(|v| nearest_centroid(v, &centroids))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;
        if converged {
            break;
        }

        centroids = update_centroids(vectors, &assignments, k, dims);
    }

    Ok(assignments)
}

/// K-means++ initialization: first centroid chosen uniformly, each
/// subsequent one with probability proportional to squared distance
/// from the nearest already-chosen centroid.
fn init_centroids(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    let first = rng.random_range(0..vectors.len());
    centroids.push(vectors[first].clone());

    while centroids.len() < k {
        let distances: Vec<f32> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| squared_distance(v, c))
                    .fold(f32::MAX, f32::min)
            })
            .collect();

        let total: f32 = distances.iter().sum();
        if total <= f32::EPSILON {
            // All remaining points coincide with chosen centroids;
            // fill the rest round-robin.
            let idx = centroids.len() % vectors.len();
            centroids.push(vectors[idx].clone());
            continue;
        }

        let target = rng.random::<f32>() * total;
        let mut cumulative = 0.0f32;
        let mut chosen = vectors.len() - 1;
        for (i, d) in distances.iter().enumerate() {
            cumulative += d;
            if cumulative >= target {
                chosen = i;
                break;
            }
        }
        centroids.push(vectors[chosen].clone());
    }

    centroids
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(vector, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    dims: usize,
) -> Vec<Vec<f32>> {
    let mut sums = vec![vec![0.0f32; dims]; k];
    let mut counts = vec![0usize; k];

    for (v, &cluster) in vectors.iter().zip(assignments) {
        counts[cluster] += 1;
        for (acc, &x) in sums[cluster].iter_mut().zip(v) {
            *acc += x;
        }
    }

    for (cluster, centroid) in sums.iter_mut().enumerate() {
        if counts[cluster] == 0 {
            // Empty cluster: re-seed it with the point farthest from
            // its current centroid, deterministically.
            let farthest = farthest_point(vectors, assignments, cluster);
            *centroid = vectors[farthest].clone();
        } else {
            for value in centroid.iter_mut() {
                *value /= counts[cluster] as f32;
            }
        }
    }

    sums
}

/// Pick a deterministic replacement seed for an empty cluster: the
/// largest-norm point currently assigned elsewhere.
fn farthest_point(vectors: &[Vec<f32>], assignments: &[usize], empty_cluster: usize) -> usize {
    let mut best = 0;
    let mut best_dist = -1.0f32;
    for (i, v) in vectors.iter().enumerate() {
        let d: f32 = v.iter().map(|x| x * x).sum();
        if d > best_dist && assignments[i] != empty_cluster {
            best_dist = d;
            best = i;
        }
    }
    best
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic synthetic batch: `n` points spread around `groups`
    /// well-separated centers in `dims` dimensions.
    fn synthetic(n: usize, groups: usize, dims: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                let group = i % groups;
                (0..dims)
                    .map(|d| {
                        let base = if d == group % dims { 10.0 } else { 0.0 };
                        base + ((i * 31 + d * 7) % 13) as f32 * 0.01
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn returns_one_id_per_vector_in_range() {
        let vectors = synthetic(40, 5, 8);
        let assignments = assign_clusters(&vectors).unwrap();
        assert_eq!(assignments.len(), 40);
        assert!(assignments.iter().all(|&c| c < CLUSTER_COUNT));
    }

    #[test]
    fn identical_input_yields_identical_assignments() {
        let vectors = synthetic(30, 6, 10);
        let a = assign_clusters(&vectors).unwrap();
        let b = assign_clusters(&vectors).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn small_batch_is_rejected() {
        let vectors = synthetic(CLUSTER_COUNT - 1, 3, 4);
        let err = assign_clusters(&vectors).unwrap_err();
        match err {
            CatalogError::InsufficientData { needed, got } => {
                assert_eq!(needed, CLUSTER_COUNT);
                assert_eq!(got, CLUSTER_COUNT - 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mut vectors = synthetic(20, 4, 6);
        vectors[7] = vec![1.0, 2.0];
        let err = assign_clusters(&vectors).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::DimensionMismatch { row: 7, expected: 6, found: 2 }
        ));
    }

    #[test]
    fn separated_groups_land_in_separate_clusters() {
        // Three tight groups far apart; with k = 3 each must be pure.
        let mut vectors = Vec::new();
        for group in 0..3 {
            for j in 0..6 {
                let mut v = vec![0.0f32; 4];
                v[group] = 100.0 + j as f32 * 0.1;
                vectors.push(v);
            }
        }
        let assignments = kmeans(&vectors, 3, RANDOM_SEED).unwrap();
        for group in 0..3 {
            let ids: Vec<usize> = assignments[group * 6..(group + 1) * 6].to_vec();
            assert!(ids.iter().all(|&c| c == ids[0]), "group {group} split: {ids:?}");
        }
    }
}
