// src/ml/shap.rs
//! Kernel SHAP attributions for any [`Classifier`]
//!
//! Shapley values are estimated by a weighted linear regression over feature
//! coalitions. Coalition sizes are enumerated exhaustively while the evaluation
//! budget allows it and sampled by their Shapley kernel weight afterwards.
//! Features outside a coalition are integrated out over a weighted background
//! summary (see [`crate::ml::kmeans::weighted_kmeans`]).

use crate::error::{EmgErrorBuilder, EmgResult, ProcessingStage};
use crate::ml::kmeans::WeightedSummary;
use crate::ml::Classifier;
use crate::utils::weighted_least_squares;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A coalition of "present" features with its kernel weight
#[derive(Debug, Clone)]
struct Coalition {
    mask: Vec<bool>,
    weight: f64,
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Visit every size-`k` subset of `0..n` in lexicographic order
fn for_each_combination(n: usize, k: usize, mut visit: impl FnMut(&[usize])) {
    if k == 0 || k > n {
        return;
    }
    let mut combo: Vec<usize> = (0..k).collect();
    loop {
        visit(&combo);
        let mut i = k;
        while i > 0 && combo[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            return;
        }
        combo[i - 1] += 1;
        for j in i..k {
            combo[j] = combo[j - 1] + 1;
        }
    }
}

fn mask_of(n: usize, present: &[usize]) -> Vec<bool> {
    let mut mask = vec![false; n];
    for &i in present {
        mask[i] = true;
    }
    mask
}

fn complement(mask: &[bool]) -> Vec<bool> {
    mask.iter().map(|&m| !m).collect()
}

/// Coalition design for `n_features` features and at most `budget` evaluations
fn build_coalitions(n_features: usize, budget: usize, rng: &mut StdRng) -> Vec<Coalition> {
    let m = n_features;
    let n_sizes = m / 2;
    let n_paired = (m - 1) / 2;
    let all_subsets = if m >= 63 { usize::MAX } else { (1usize << m) - 2 };
    let budget = budget.max(2 * m).min(all_subsets);

    // Shapley kernel mass of each coalition size; paired sizes carry their complement
    let mut size_weights: Vec<f64> = (1..=n_sizes)
        .map(|s| (m - 1) as f64 / (s * (m - s)) as f64)
        .collect();
    for w in size_weights.iter_mut().take(n_paired) {
        *w *= 2.0;
    }
    let total: f64 = size_weights.iter().sum();
    for w in size_weights.iter_mut() {
        *w /= total;
    }

    let mut coalitions = Vec::new();
    let mut remaining = size_weights.clone();
    let mut samples_left = budget as f64;
    let mut n_full = 0;

    for size in 1..=n_sizes {
        let idx = size - 1;
        let paired = size <= n_paired;
        let mut n_subsets = binomial(m, size);
        if paired {
            n_subsets *= 2.0;
        }
        if samples_left * remaining[idx] / n_subsets < 1.0 - 1e-8 {
            break;
        }

        n_full += 1;
        samples_left -= n_subsets;
        if remaining[idx] < 1.0 {
            let scale = 1.0 - remaining[idx];
            for w in remaining.iter_mut() {
                *w /= scale;
            }
        }

        let mut weight = size_weights[idx] / binomial(m, size);
        if paired {
            weight /= 2.0;
        }
        for_each_combination(m, size, |present| {
            let mask = mask_of(m, present);
            if paired {
                coalitions.push(Coalition {
                    mask: complement(&mask),
                    weight,
                });
            }
            coalitions.push(Coalition { mask, weight });
        });
    }

    if n_full < n_sizes && samples_left >= 1.0 {
        let tail = &size_weights[n_full..];
        let weight_left: f64 = tail.iter().sum();
        let mut sampled = Vec::new();
        let mut draws_left = samples_left as usize;

        while draws_left > 0 {
            let mut target = rng.gen::<f64>() * weight_left;
            let mut offset = tail.len() - 1;
            for (i, &w) in tail.iter().enumerate() {
                if target < w {
                    offset = i;
                    break;
                }
                target -= w;
            }
            let size = n_full + offset + 1;
            let present = rand::seq::index::sample(rng, m, size).into_vec();
            let mask = mask_of(m, &present);
            if size <= n_paired && draws_left >= 2 {
                sampled.push(complement(&mask));
                draws_left -= 1;
            }
            sampled.push(mask);
            draws_left -= 1;
        }

        let weight = weight_left / sampled.len() as f64;
        coalitions.extend(sampled.into_iter().map(|mask| Coalition { mask, weight }));
    }

    coalitions
}

/// Model-agnostic Shapley value estimator over `predict_proba`
pub struct KernelExplainer<'a> {
    model: &'a dyn Classifier,
    background: WeightedSummary,
    coalitions: Vec<Coalition>,
    expected_value: Array1<f64>,
}

impl<'a> KernelExplainer<'a> {
    pub fn new(
        model: &'a dyn Classifier,
        background: WeightedSummary,
        max_coalitions: usize,
        seed: u64,
    ) -> EmgResult<Self> {
        if background.is_empty() || background.points.ncols() == 0 {
            return Err(EmgErrorBuilder::new("kernel_shap", "new")
                .invalid_data("background", "background summary is empty"));
        }

        let proba = model.predict_proba(background.points.view())?;
        let expected_value = proba.t().dot(&background.weights);

        let n_features = background.points.ncols();
        let mut rng = StdRng::seed_from_u64(seed);
        let coalitions = if n_features > 1 {
            build_coalitions(n_features, max_coalitions, &mut rng)
        } else {
            Vec::new()
        };

        Ok(Self {
            model,
            background,
            coalitions,
            expected_value,
        })
    }

    /// Background-weighted mean prediction per class
    pub fn expected_value(&self) -> ArrayView1<f64> {
        self.expected_value.view()
    }

    pub fn n_coalitions(&self) -> usize {
        self.coalitions.len()
    }

    /// Attributions of one sample, shape `(features, classes)`
    pub fn explain_sample(&self, sample: ArrayView1<f64>) -> EmgResult<Array2<f64>> {
        let m = self.background.points.ncols();
        if sample.len() != m {
            return Err(EmgErrorBuilder::new("kernel_shap", "explain").mismatch(
                "sample",
                "feature count differs from background",
                m,
                sample.len(),
            ));
        }

        let fx = self
            .model
            .predict_proba(sample.insert_axis(Axis(0)))?
            .row(0)
            .to_owned();
        let n_classes = fx.len();
        let delta = &fx - &self.expected_value;

        if m == 1 {
            return Ok(delta.insert_axis(Axis(0)));
        }

        // One synthetic row per (coalition, background point)
        let n_bg = self.background.len();
        let n_coal = self.coalitions.len();
        let mut synthetic = Array2::<f64>::zeros((n_coal * n_bg, m));
        for (c, coalition) in self.coalitions.iter().enumerate() {
            for b in 0..n_bg {
                let mut row = synthetic.row_mut(c * n_bg + b);
                row.assign(&self.background.points.row(b));
                for (j, &present) in coalition.mask.iter().enumerate() {
                    if present {
                        row[j] = sample[j];
                    }
                }
            }
        }
        let proba = self.model.predict_proba(synthetic.view())?;

        let mut expected = Array2::<f64>::zeros((n_coal, n_classes));
        for c in 0..n_coal {
            for b in 0..n_bg {
                let w = self.background.weights[b];
                let mut target = expected.row_mut(c);
                target.scaled_add(w, &proba.row(c * n_bg + b));
            }
        }

        // Efficiency constraint eliminates the last feature
        let last = m - 1;
        let design = Array2::from_shape_fn((n_coal, last), |(c, j)| {
            let mask = &self.coalitions[c].mask;
            f64::from(u8::from(mask[j])) - f64::from(u8::from(mask[last]))
        });
        let weights: Array1<f64> = self.coalitions.iter().map(|c| c.weight).collect();

        let mut phi = Array2::<f64>::zeros((m, n_classes));
        for k in 0..n_classes {
            let target: Array1<f64> = (0..n_coal)
                .map(|c| {
                    let z_last = f64::from(u8::from(self.coalitions[c].mask[last]));
                    expected[[c, k]] - self.expected_value[k] - z_last * delta[k]
                })
                .collect();
            let beta = weighted_least_squares(design.view(), target.view(), weights.view())
                .ok_or_else(|| {
                    EmgErrorBuilder::new("kernel_shap", "explain")
                        .processing(ProcessingStage::Ranking, "singular coalition system")
                })?;
            let mut column = phi.column_mut(k);
            column.slice_mut(ndarray::s![..last]).assign(&beta);
            column[last] = delta[k] - beta.sum();
        }

        Ok(phi)
    }

    /// Attributions for every row, shape `(samples, features, classes)`
    pub fn shap_values(&self, samples: ArrayView2<f64>) -> EmgResult<Array3<f64>> {
        let m = self.background.points.ncols();
        let n_classes = self.expected_value.len();
        let mut values = Array3::<f64>::zeros((samples.nrows(), m, n_classes));
        for (i, sample) in samples.axis_iter(Axis(0)).enumerate() {
            values
                .index_axis_mut(Axis(0), i)
                .assign(&self.explain_sample(sample)?);
        }
        Ok(values)
    }

    /// Mean absolute attribution per feature over samples and classes
    pub fn mean_abs_importance(&self, samples: ArrayView2<f64>) -> EmgResult<Vec<f64>> {
        let values = self.shap_values(samples)?;
        let (n, m, k) = values.dim();
        if n == 0 {
            return Ok(vec![0.0; m]);
        }
        Ok((0..m)
            .map(|j| {
                values
                    .index_axis(Axis(1), j)
                    .iter()
                    .map(|v| v.abs())
                    .sum::<f64>()
                    / (n * k) as f64
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::kmeans::weighted_kmeans;
    use ndarray::array;

    /// Two-class additive model with known attributions
    struct Additive {
        coefficients: Vec<f64>,
        classes: Vec<usize>,
    }

    impl Additive {
        fn new(coefficients: Vec<f64>) -> Self {
            Self {
                coefficients,
                classes: vec![0, 1],
            }
        }
    }

    impl Classifier for Additive {
        fn name(&self) -> &'static str {
            "additive"
        }

        fn fit(&mut self, _: ArrayView2<f64>, _: &[usize]) -> EmgResult<()> {
            Ok(())
        }

        fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
            let mut proba = Array2::zeros((features.nrows(), 2));
            for (i, row) in features.axis_iter(Axis(0)).enumerate() {
                let p: f64 = 0.5
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(x, c)| x * c)
                        .sum::<f64>();
                proba[[i, 1]] = p;
                proba[[i, 0]] = 1.0 - p;
            }
            Ok(proba)
        }

        fn classes(&self) -> &[usize] {
            &self.classes
        }
    }

    #[test]
    fn test_coalitions_enumerate_all_subsets_when_affordable() {
        let mut rng = StdRng::seed_from_u64(0);
        let coalitions = build_coalitions(4, 512, &mut rng);
        assert_eq!(coalitions.len(), 14);
        let total: f64 = coalitions.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coalitions_respect_budget() {
        let mut rng = StdRng::seed_from_u64(0);
        let coalitions = build_coalitions(12, 100, &mut rng);
        assert!(coalitions.len() <= 100);
        let total: f64 = coalitions.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_attributions_for_additive_model() {
        let model = Additive::new(vec![0.1, -0.05, 0.0]);
        let background = array![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]];
        let summary = weighted_kmeans(background.view(), 10, 0);
        let explainer = KernelExplainer::new(&model, summary, 512, 0).unwrap();

        let sample = array![2.0, 1.0, 5.0];
        let phi = explainer.explain_sample(sample.view()).unwrap();

        // phi_j = c_j * (x_j - mean_j)
        assert!((phi[[0, 1]] - 0.1 * 1.5).abs() < 1e-6);
        assert!((phi[[1, 1]] - -0.05 * 0.0).abs() < 1e-6);
        assert!(phi[[2, 1]].abs() < 1e-6);
        assert!((phi[[0, 0]] + phi[[0, 1]]).abs() < 1e-6);
    }

    #[test]
    fn test_sampled_coalitions_preserve_efficiency() {
        let coefficients: Vec<f64> = (0..10).map(|j| if j < 3 { 0.02 } else { 0.0 }).collect();
        let model = Additive::new(coefficients);
        let background = Array2::from_shape_fn((20, 10), |(i, j)| ((i * 7 + j * 3) % 5) as f64);
        let summary = weighted_kmeans(background.view(), 5, 1);
        let explainer = KernelExplainer::new(&model, summary, 64, 3).unwrap();
        assert!(explainer.n_coalitions() <= 64);

        let samples = Array2::from_shape_fn((4, 10), |(i, j)| (i + j) as f64 * 0.5);
        let values = explainer.shap_values(samples.view()).unwrap();
        for (i, sample) in samples.axis_iter(Axis(0)).enumerate() {
            let fx = model.predict_proba(sample.insert_axis(Axis(0))).unwrap();
            let total: f64 = values.index_axis(Axis(0), i).column(1).sum();
            assert!((total - (fx[[0, 1]] - explainer.expected_value()[1])).abs() < 1e-6);
        }

        let importance = explainer.mean_abs_importance(samples.view()).unwrap();
        assert!(importance[..3].iter().all(|&v| v > 0.0));
        assert!(importance[3..].iter().all(|&v| v < 1e-6));
    }

    #[test]
    fn test_single_feature() {
        let model = Additive::new(vec![0.1]);
        let summary = weighted_kmeans(array![[0.0], [2.0]].view(), 5, 0);
        let explainer = KernelExplainer::new(&model, summary, 16, 0).unwrap();
        let phi = explainer.explain_sample(array![3.0].view()).unwrap();
        assert!((phi[[0, 1]] - 0.2).abs() < 1e-12);
    }
}
