// src/ml/boosting.rs
//! Gradient-boosted trees with a softmax objective

use super::tree::{grow_boosting_tree, BoostingTreeParams, Tree};
use super::{check_fitted, check_training_data, ClassIndex, Classifier};
use crate::error::EmgResult;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

const DEFAULT_ROUNDS: usize = 100;
const DEFAULT_LEARNING_RATE: f64 = 0.3;
const DEFAULT_MAX_DEPTH: usize = 6;
const DEFAULT_LAMBDA: f64 = 1.0;
const MIN_HESSIAN: f64 = 1e-16;

/// Second-order boosting, one regression tree per class and round
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    n_rounds: usize,
    learning_rate: f64,
    tree_params: BoostingTreeParams,
    /// `rounds[r][k]` is the tree for class column `k` in round `r`
    rounds: Vec<Vec<Tree>>,
    index: ClassIndex,
    fitted: Option<usize>,
}

impl Default for GradientBoosting {
    fn default() -> Self {
        Self::with_params(DEFAULT_ROUNDS, DEFAULT_LEARNING_RATE, DEFAULT_MAX_DEPTH)
    }
}

impl GradientBoosting {
    pub fn with_params(n_rounds: usize, learning_rate: f64, max_depth: usize) -> Self {
        Self {
            n_rounds,
            learning_rate,
            tree_params: BoostingTreeParams {
                max_depth,
                lambda: DEFAULT_LAMBDA,
                min_child_weight: 1.0,
            },
            rounds: Vec::new(),
            index: ClassIndex::default(),
            fitted: None,
        }
    }

    fn margins(&self, features: ArrayView2<f64>) -> Array2<f64> {
        let mut margins = Array2::<f64>::zeros((features.nrows(), self.index.len()));
        for (sample, mut out) in features.axis_iter(Axis(0)).zip(margins.axis_iter_mut(Axis(0))) {
            for round in &self.rounds {
                for (k, tree) in round.iter().enumerate() {
                    out[k] += self.learning_rate * tree.leaf(sample).first().copied().unwrap_or(0.0);
                }
            }
        }
        margins
    }
}

fn softmax_in_place(margins: &mut Array2<f64>) {
    for mut row in margins.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

impl Classifier for GradientBoosting {
    fn name(&self) -> &'static str {
        "XGB"
    }

    fn fit(&mut self, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()> {
        check_training_data("gradient_boosting", features, labels)?;
        let (index, encoded) = ClassIndex::fit(labels);
        let (n, d) = features.dim();
        let k = index.len();
        let all: Vec<usize> = (0..n).collect();

        let mut margins = Array2::<f64>::zeros((n, k));
        let mut rounds = Vec::with_capacity(self.n_rounds);

        for _ in 0..self.n_rounds {
            let mut proba = margins.clone();
            softmax_in_place(&mut proba);

            let trees: Vec<Tree> = (0..k)
                .into_par_iter()
                .map(|class| {
                    let gradients: Vec<f64> = (0..n)
                        .map(|i| proba[[i, class]] - if encoded[i] == class { 1.0 } else { 0.0 })
                        .collect();
                    let hessians: Vec<f64> = (0..n)
                        .map(|i| (2.0 * proba[[i, class]] * (1.0 - proba[[i, class]])).max(MIN_HESSIAN))
                        .collect();
                    grow_boosting_tree(features, &gradients, &hessians, &all, &self.tree_params)
                })
                .collect();

            for (class, tree) in trees.iter().enumerate() {
                for (i, sample) in features.axis_iter(Axis(0)).enumerate() {
                    margins[[i, class]] += self.learning_rate * tree.leaf(sample).first().copied().unwrap_or(0.0);
                }
            }
            rounds.push(trees);
        }

        self.rounds = rounds;
        self.index = index;
        self.fitted = Some(d);
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
        check_fitted("gradient_boosting", self.fitted, features)?;
        let mut margins = self.margins(features);
        softmax_in_place(&mut margins);
        Ok(margins)
    }

    fn classes(&self) -> &[usize] {
        self.index.classes()
    }
}
