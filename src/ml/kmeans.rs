// src/ml/kmeans.rs
//! Weighted k-means summary of a data set
//!
//! Used to shrink a training set into a small weighted background for Kernel
//! SHAP. Centroid coordinates are snapped to the closest value observed in the
//! same column so every background point is made of real feature values.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_INIT: usize = 3;
const MAX_ITER: usize = 100;

/// Weighted set of representative points; weights sum to one
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSummary {
    pub points: Array2<f64>,
    pub weights: Array1<f64>,
}

impl WeightedSummary {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    centroids
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(c, centroid)| (c, squared_distance(point, centroid)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding
fn init_centroids(data: ArrayView2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut closest: Vec<f64> = data
        .axis_iter(Axis(0))
        .map(|row| squared_distance(row, data.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = closest.iter().sum();
        let next = if total <= 0.0 {
            // All remaining points coincide with a centroid
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        } else {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = n - 1;
            for (i, &d) in closest.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        };
        chosen.push(next);
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            closest[i] = closest[i].min(squared_distance(row, data.row(next)));
        }
    }

    data.select(Axis(0), &chosen)
}

/// One Lloyd run: centroids, assignment and inertia
fn lloyd(data: ArrayView2<f64>, mut centroids: Array2<f64>) -> (Array2<f64>, Vec<usize>, f64) {
    let (n, d) = data.dim();
    let k = centroids.nrows();
    let mut assignment = vec![0usize; n];

    for iteration in 0..MAX_ITER {
        let mut changed = false;
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            let (c, _) = nearest(row, &centroids);
            changed |= c != assignment[i];
            assignment[i] = c;
        }
        if !changed && iteration > 0 {
            break;
        }

        let mut sums = Array2::<f64>::zeros((k, d));
        let mut counts = vec![0usize; k];
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            let mut target = sums.row_mut(assignment[i]);
            target += &row;
            counts[assignment[i]] += 1;
        }
        for c in 0..k {
            // Empty clusters keep their previous centroid
            if counts[c] > 0 {
                centroids.row_mut(c).assign(&(&sums.row(c) / counts[c] as f64));
            }
        }
    }

    let inertia = data
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, row)| squared_distance(row, centroids.row(assignment[i])))
        .sum();
    (centroids, assignment, inertia)
}

/// Summarise `data` by at most `k` weighted points
///
/// Data sets with no more than `k` rows are returned as-is with uniform weights.
pub fn weighted_kmeans(data: ArrayView2<f64>, k: usize, seed: u64) -> WeightedSummary {
    let n = data.nrows();
    if n == 0 || k == 0 {
        return WeightedSummary {
            points: Array2::zeros((0, data.ncols())),
            weights: Array1::zeros(0),
        };
    }
    if n <= k {
        return WeightedSummary {
            points: data.to_owned(),
            weights: Array1::from_elem(n, 1.0 / n as f64),
        };
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<(Array2<f64>, Vec<usize>, f64)> = None;
    for _ in 0..N_INIT {
        let run = lloyd(data, init_centroids(data, k, &mut rng));
        if best.as_ref().map_or(true, |b| run.2 < b.2) {
            best = Some(run);
        }
    }
    let (mut centroids, assignment, _) = match best {
        Some(best) => best,
        None => return weighted_kmeans(data, n, seed),
    };

    // Snap each coordinate to the nearest observed value of its column
    for mut centroid in centroids.axis_iter_mut(Axis(0)) {
        for (j, value) in centroid.iter_mut().enumerate() {
            let column = data.column(j);
            let mut closest = column[0];
            for &candidate in column.iter() {
                if (candidate - *value).abs() < (closest - *value).abs() {
                    closest = candidate;
                }
            }
            *value = closest;
        }
    }

    let mut weights = Array1::<f64>::zeros(k);
    for &c in &assignment {
        weights[c] += 1.0;
    }
    weights /= n as f64;

    WeightedSummary {
        points: centroids,
        weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_small_data_returned_verbatim() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let summary = weighted_kmeans(data.view(), 5, 0);
        assert_eq!(summary.points, data);
        assert_eq!(summary.weights, array![0.5, 0.5]);
    }

    #[test]
    fn test_two_clusters_weighted_by_size() {
        let data = array![[0.0], [0.1], [0.2], [10.0], [10.1]];
        let summary = weighted_kmeans(data.view(), 2, 0);
        assert_eq!(summary.len(), 2);
        assert!((summary.weights.sum() - 1.0).abs() < 1e-12);

        let mut pairs: Vec<(f64, f64)> = summary
            .points
            .column(0)
            .iter()
            .copied()
            .zip(summary.weights.iter().copied())
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        // Centroids snap onto observed values
        assert_eq!(pairs[0], (0.1, 0.6));
        assert!(pairs[1].0 == 10.0 || pairs[1].0 == 10.1);
        assert!((pairs[1].1 - 0.4).abs() < 1e-12);
    }
}
