// src/ml/importance.rs
//! Per-feature importance: permutation importance and k-NN mutual information

use super::{accuracy, Classifier};
use crate::error::{Capability, EmgErrorBuilder, EmgResult};
use crate::utils::{digamma, standard_normal, std_dev};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

/// Mean drop in accuracy when each feature column is shuffled
pub fn permutation_importance(
    model: &dyn Classifier,
    features: ArrayView2<f64>,
    labels: &[usize],
    n_repeats: usize,
    seed: u64,
) -> EmgResult<Vec<f64>> {
    if n_repeats == 0 {
        return Err(EmgErrorBuilder::new("importance", "permutation_importance")
            .capability(Capability::Importance, "at least one repeat required"));
    }
    let baseline = accuracy(labels, &model.predict(features)?);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut importances = Vec::with_capacity(features.ncols());
    let mut shuffled = features.to_owned();

    for feature in 0..features.ncols() {
        let original = features.column(feature);
        let mut column: Vec<f64> = original.to_vec();
        let mut drop = 0.0;

        for _ in 0..n_repeats {
            column.shuffle(&mut rng);
            shuffled.column_mut(feature).assign(&ArrayView1::from(&column));
            drop += baseline - accuracy(labels, &model.predict(shuffled.view())?);
        }

        shuffled.column_mut(feature).assign(&original);
        importances.push(drop / n_repeats as f64);
    }

    Ok(importances)
}

/// Mutual information between every continuous feature and the discrete labels
///
/// Columns are scaled to unit standard deviation and jittered with seeded noise
/// of relative size 1e-10 to break ties; estimates are clamped at zero.
pub fn mutual_info_classif(
    features: ArrayView2<f64>,
    labels: &[usize],
    n_neighbors: usize,
    seed: u64,
) -> EmgResult<Vec<f64>> {
    if features.nrows() != labels.len() {
        return Err(EmgErrorBuilder::new("importance", "mutual_info_classif").mismatch(
            "labels",
            "one label per sample required",
            features.nrows(),
            labels.len(),
        ));
    }
    if n_neighbors == 0 {
        return Err(EmgErrorBuilder::new("importance", "mutual_info_classif")
            .capability(Capability::Importance, "at least one neighbour required"));
    }

    let mut scaled: Array2<f64> = features.to_owned();
    for mut column in scaled.axis_iter_mut(Axis(1)) {
        let std = std_dev(column.view());
        if std > 0.0 {
            column.mapv_inplace(|v| v / std);
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for mut column in scaled.axis_iter_mut(Axis(1)) {
        let magnitude = column.mapv(f64::abs).mean().unwrap_or(0.0).max(1.0);
        for v in column.iter_mut() {
            *v += 1e-10 * magnitude * standard_normal(&mut rng);
        }
    }

    Ok((0..scaled.ncols())
        .into_par_iter()
        .map(|feature| mi_continuous_discrete(scaled.column(feature), labels, n_neighbors))
        .collect())
}

/// Ross (2014) estimator for one continuous variable against a discrete one
fn mi_continuous_discrete(values: ArrayView1<f64>, labels: &[usize], n_neighbors: usize) -> f64 {
    let n = values.len();
    let mut radius = vec![0.0; n];
    let mut neighbours = vec![0usize; n];
    let mut class_size = vec![0usize; n];

    let mut classes: Vec<usize> = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();

    for class in classes {
        let members: Vec<usize> = (0..n).filter(|&i| labels[i] == class).collect();
        let count = members.len();
        for &i in &members {
            class_size[i] = count;
        }
        if count < 2 {
            continue;
        }

        let k = n_neighbors.min(count - 1);
        for &i in &members {
            let mut distances: Vec<f64> = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (values[i] - values[j]).abs())
                .collect();
            distances.sort_by(|a, b| a.total_cmp(b));
            // Just inside the k-th neighbour
            radius[i] = next_toward_zero(distances[k - 1]);
            neighbours[i] = k;
        }
    }

    let kept: Vec<usize> = (0..n).filter(|&i| class_size[i] > 1).collect();
    if kept.is_empty() {
        return 0.0;
    }
    let m = kept.len() as f64;

    let mut mean_k = 0.0;
    let mut mean_class = 0.0;
    let mut mean_within = 0.0;
    for &i in &kept {
        let within = kept
            .iter()
            .filter(|&&j| (values[i] - values[j]).abs() <= radius[i])
            .count();
        mean_k += digamma(neighbours[i] as f64);
        mean_class += digamma(class_size[i] as f64);
        mean_within += digamma(within as f64);
    }

    let mi = digamma(m) + (mean_k - mean_class - mean_within) / m;
    mi.max(0.0)
}

fn next_toward_zero(x: f64) -> f64 {
    if x > 0.0 {
        f64::from_bits(x.to_bits() - 1)
    } else {
        x
    }
}
