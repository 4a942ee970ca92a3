// src/ml/naive_bayes.rs
//! Gaussian naive Bayes

use super::{check_fitted, check_training_data, ClassIndex, Classifier};
use crate::error::EmgResult;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::f64::consts::PI;

/// Portion of the largest feature variance added to every variance
const VAR_SMOOTHING: f64 = 1e-9;
const MIN_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, Default)]
pub struct GaussianNaiveBayes {
    index: ClassIndex,
    /// (classes, features)
    means: Array2<f64>,
    variances: Array2<f64>,
    log_priors: Array1<f64>,
    fitted: Option<usize>,
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &'static str {
        "Naive Bayes"
    }

    fn fit(&mut self, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()> {
        check_training_data("naive_bayes", features, labels)?;
        let (index, encoded) = ClassIndex::fit(labels);
        let (n, d) = features.dim();
        let k = index.len();

        let epsilon = VAR_SMOOTHING
            * features
                .var_axis(Axis(0), 0.0)
                .iter()
                .fold(0.0f64, |acc, &v| acc.max(v));

        let mut means = Array2::<f64>::zeros((k, d));
        let mut variances = Array2::<f64>::zeros((k, d));
        let mut log_priors = Array1::<f64>::zeros(k);

        for class in 0..k {
            let rows: Vec<usize> = (0..n).filter(|&i| encoded[i] == class).collect();
            let subset = features.select(Axis(0), &rows);
            means.row_mut(class).assign(&subset.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d)));
            variances
                .row_mut(class)
                .assign(&subset.var_axis(Axis(0), 0.0).mapv(|v| v + epsilon));
            log_priors[class] = (rows.len() as f64 / n as f64).ln();
        }

        // Constant features would otherwise give zero variance
        variances.mapv_inplace(|v| if v > 0.0 { v } else { MIN_VARIANCE });

        self.index = index;
        self.means = means;
        self.variances = variances;
        self.log_priors = log_priors;
        self.fitted = Some(d);
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
        check_fitted("naive_bayes", self.fitted, features)?;
        let k = self.index.len();
        let mut proba = Array2::<f64>::zeros((features.nrows(), k));

        for (sample, mut out) in features.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            let joint: Vec<f64> = (0..k)
                .map(|class| {
                    let log_likelihood: f64 = sample
                        .iter()
                        .zip(self.means.row(class))
                        .zip(self.variances.row(class))
                        .map(|((&x, &mu), &var)| -0.5 * (2.0 * PI * var).ln() - (x - mu).powi(2) / (2.0 * var))
                        .sum();
                    self.log_priors[class] + log_likelihood
                })
                .collect();

            let max = joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let norm: f64 = joint.iter().map(|j| (j - max).exp()).sum();
            for (o, j) in out.iter_mut().zip(&joint) {
                *o = (j - max).exp() / norm;
            }
        }

        Ok(proba)
    }

    fn classes(&self) -> &[usize] {
        self.index.classes()
    }
}
