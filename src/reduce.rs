//! Dimensionality reduction: projects the embedding batch onto a 2-D
//! plane for visualization.
//!
//! Implements exact t-SNE (neighbor-preserving, stochastic, O(N²)) with
//! a fixed random seed so identical input always yields the same
//! layout. Catalog batches are at most a few thousand records, so the
//! quadratic pairwise step is not a concern.
//!
//! After the gradient descent finishes, all points are translated by a
//! single scalar so the minimum coordinate value across both axes and
//! all points is exactly 0. This is a whole-batch shift, not per-axis
//! normalization: relative geometry is preserved.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CatalogError;

/// Seed shared by every refresh so generations are reproducible.
const RANDOM_SEED: u64 = 42;

/// t-SNE requires at least perplexity-many neighbors to be meaningful;
/// four points is the floor at which a 2-D layout is defined at all.
const MIN_POINTS: usize = 4;

const PERPLEXITY: f64 = 30.0;
const LEARNING_RATE: f64 = 200.0;
const MAX_ITERATIONS: usize = 500;
const EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERATIONS: usize = 100;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MOMENTUM_SWITCH: usize = 250;

/// Project the embedding batch to 2-D points, one per input vector, in
/// input order.
///
/// Fails with [`CatalogError::InsufficientData`] for batches smaller
/// than four vectors and [`CatalogError::DimensionMismatch`] when the
/// vectors disagree on dimensionality.
pub fn reduce_to_plane(embeddings: &[Vec<f32>]) -> Result<Vec<[f64; 2]>, CatalogError> {
    let n = embeddings.len();
    if n < MIN_POINTS {
        return Err(CatalogError::InsufficientData {
            needed: MIN_POINTS,
            got: n,
        });
    }

    let dims = embeddings[0].len();
    for (row, v) in embeddings.iter().enumerate() {
        if v.len() != dims {
            return Err(CatalogError::DimensionMismatch {
                row,
                expected: dims,
                found: v.len(),
            });
        }
    }

    let distances = pairwise_squared_distances(embeddings);
    let p = joint_probabilities(&distances, n);

    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
    let mut points: Vec<[f64; 2]> = (0..n)
        .map(|_| [gaussian(&mut rng) * 1e-4, gaussian(&mut rng) * 1e-4])
        .collect();
    let mut velocity = vec![[0.0f64; 2]; n];

    for iteration in 0..MAX_ITERATIONS {
        let exaggeration = if iteration < EXAGGERATION_ITERATIONS {
            EXAGGERATION
        } else {
            1.0
        };
        let momentum = if iteration < MOMENTUM_SWITCH {
            INITIAL_MOMENTUM
        } else {
            FINAL_MOMENTUM
        };

        let gradient = gradient_step(&p, &points, n, exaggeration);

        for i in 0..n {
            for d in 0..2 {
                velocity[i][d] = momentum * velocity[i][d] - LEARNING_RATE * gradient[i][d];
                points[i][d] += velocity[i][d];
            }
        }

        center(&mut points);
    }

    translate_min_to_zero(&mut points);
    Ok(points)
}

/// Shift every coordinate by the same scalar so the global minimum
/// becomes exactly 0.
fn translate_min_to_zero(points: &mut [[f64; 2]]) {
    let min = points
        .iter()
        .flat_map(|p| p.iter().copied())
        .fold(f64::INFINITY, f64::min);
    if min.is_finite() {
        for p in points.iter_mut() {
            p[0] -= min;
            p[1] -= min;
        }
    }
}

fn pairwise_squared_distances(embeddings: &[Vec<f32>]) -> Vec<Vec<f64>> {
    let n = embeddings.len();
    let mut distances = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d: f64 = embeddings[i]
                .iter()
                .zip(&embeddings[j])
                .map(|(a, b)| {
                    let diff = (*a - *b) as f64;
                    diff * diff
                })
                .sum();
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }
    distances
}

/// Convert pairwise distances to symmetric joint probabilities, with a
/// per-row binary search for the Gaussian bandwidth that matches the
/// target perplexity.
fn joint_probabilities(distances: &[Vec<f64>], n: usize) -> Vec<Vec<f64>> {
    // Perplexity may not exceed what the neighborhood can support.
    let perplexity = PERPLEXITY.min((n as f64 - 1.0) / 3.0).max(1.0);
    let target_entropy = perplexity.ln();

    let mut p = vec![vec![0.0f64; n]; n];

    for i in 0..n {
        let mut beta = 1.0f64;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;

        for _ in 0..50 {
            let (entropy, row) = row_probabilities(&distances[i], i, beta);
            let diff = entropy - target_entropy;
            p[i] = row;

            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_infinite() {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_infinite() {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
        }
    }

    // Symmetrize and normalize.
    let mut joint = vec![vec![0.0f64; n]; n];
    let mut total = 0.0f64;
    for i in 0..n {
        for j in 0..n {
            joint[i][j] = (p[i][j] + p[j][i]) / (2.0 * n as f64);
            total += joint[i][j];
        }
    }
    if total > 0.0 {
        for row in joint.iter_mut() {
            for value in row.iter_mut() {
                *value = (*value / total).max(1e-12);
            }
        }
    }

    joint
}

/// Conditional probabilities for one row under bandwidth `beta`,
/// returning the Shannon entropy of the distribution.
fn row_probabilities(distances: &[f64], i: usize, beta: f64) -> (f64, Vec<f64>) {
    let n = distances.len();
    let mut row = vec![0.0f64; n];
    let mut sum = 0.0f64;

    for j in 0..n {
        if j != i {
            row[j] = (-distances[j] * beta).exp();
            sum += row[j];
        }
    }

    if sum <= 0.0 {
        return (0.0, row);
    }

    let mut entropy = 0.0f64;
    for (j, value) in row.iter_mut().enumerate() {
        if j != i {
            *value /= sum;
            if *value > 1e-12 {
                entropy -= *value * value.ln();
            }
        }
    }

    (entropy, row)
}

/// One t-SNE gradient: attraction along `p`, repulsion along the
/// Student-t low-dimensional affinities `q`.
fn gradient_step(p: &[Vec<f64>], points: &[[f64; 2]], n: usize, exaggeration: f64) -> Vec<[f64; 2]> {
    // Student-t kernel in the embedding plane.
    let mut q_num = vec![vec![0.0f64; n]; n];
    let mut q_total = 0.0f64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = points[i][0] - points[j][0];
            let dy = points[i][1] - points[j][1];
            let num = 1.0 / (1.0 + dx * dx + dy * dy);
            q_num[i][j] = num;
            q_num[j][i] = num;
            q_total += 2.0 * num;
        }
    }
    let q_total = q_total.max(1e-12);

    let mut gradient = vec![[0.0f64; 2]; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let q = (q_num[i][j] / q_total).max(1e-12);
            let mult = (exaggeration * p[i][j] - q) * q_num[i][j];
            gradient[i][0] += 4.0 * mult * (points[i][0] - points[j][0]);
            gradient[i][1] += 4.0 * mult * (points[i][1] - points[j][1]);
        }
    }

    gradient
}

/// Re-center the layout on the origin after each step to keep the
/// solution from drifting.
fn center(points: &mut [[f64; 2]]) {
    let n = points.len() as f64;
    let mean_x: f64 = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y: f64 = points.iter().map(|p| p[1]).sum::<f64>() / n;
    for p in points.iter_mut() {
        p[0] -= mean_x;
        p[1] -= mean_y;
    }
}

/// Box-Muller transform over the seeded generator.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize, dims: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                (0..dims)
                    .map(|d| ((i * 17 + d * 5) % 23) as f32 * 0.25 + if i % 3 == d % 3 { 4.0 } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn output_length_matches_input() {
        let points = reduce_to_plane(&synthetic(12, 16)).unwrap();
        assert_eq!(points.len(), 12);
    }

    #[test]
    fn global_minimum_coordinate_is_zero() {
        let points = reduce_to_plane(&synthetic(20, 8)).unwrap();
        let min = points
            .iter()
            .flat_map(|p| p.iter().copied())
            .fold(f64::INFINITY, f64::min);
        assert!(min.abs() < 1e-9, "min was {min}");
        assert!(points.iter().flat_map(|p| p.iter()).all(|c| *c >= 0.0));
    }

    #[test]
    fn fixed_seed_makes_layout_deterministic() {
        let batch = synthetic(15, 10);
        let a = reduce_to_plane(&batch).unwrap();
        let b = reduce_to_plane(&batch).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_batch_is_rejected() {
        let err = reduce_to_plane(&synthetic(3, 8)).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InsufficientData { needed: 4, got: 3 }
        ));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mut batch = synthetic(10, 8);
        batch[4] = vec![0.5; 6];
        let err = reduce_to_plane(&batch).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::DimensionMismatch { row: 4, expected: 8, found: 6 }
        ));
    }

    #[test]
    fn translation_moves_min_to_zero() {
        let mut points = vec![[-3.0, 2.0], [1.0, -5.5], [0.0, 0.0]];
        translate_min_to_zero(&mut points);
        assert_eq!(points[1][1], 0.0);
        assert_eq!(points[0][0], 2.5);
        assert_eq!(points[0][1], 7.5);
    }
}
