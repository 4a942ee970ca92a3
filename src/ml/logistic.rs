// src/ml/logistic.rs
//! Multinomial logistic regression with L2 penalty

use super::{check_fitted, check_training_data, ClassIndex, Classifier};
use crate::error::EmgResult;
use ndarray::{Array1, Array2, ArrayView2, Axis};

const DEFAULT_C: f64 = 1.0;
const DEFAULT_MAX_ITER: usize = 5000;
const GRADIENT_TOLERANCE: f64 = 1e-4;

/// Softmax regression fitted by gradient descent with backtracking line search
///
/// Features are standardised internally; the penalty is `||W||^2 / (2 C)`
/// relative to the summed log-loss.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    c: f64,
    max_iter: usize,
    index: ClassIndex,
    /// (features, classes)
    weights: Array2<f64>,
    intercept: Array1<f64>,
    mean: Array1<f64>,
    scale: Array1<f64>,
    fitted: Option<usize>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(DEFAULT_C, DEFAULT_MAX_ITER)
    }
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c,
            max_iter,
            index: ClassIndex::default(),
            weights: Array2::zeros((0, 0)),
            intercept: Array1::zeros(0),
            mean: Array1::zeros(0),
            scale: Array1::zeros(0),
            fitted: None,
        }
    }

    fn standardize(&self, features: ArrayView2<f64>) -> Array2<f64> {
        (&features - &self.mean) / &self.scale
    }

    fn softmax_rows(mut logits: Array2<f64>) -> Array2<f64> {
        for mut row in logits.axis_iter_mut(Axis(0)) {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        logits
    }

    /// Penalised loss and gradients for the given parameters
    fn objective(
        &self,
        x: &Array2<f64>,
        targets: &Array2<f64>,
        weights: &Array2<f64>,
        intercept: &Array1<f64>,
    ) -> (f64, Array2<f64>, Array1<f64>) {
        let proba = Self::softmax_rows(x.dot(weights) + intercept);

        let log_loss: f64 = proba
            .iter()
            .zip(targets.iter())
            .filter(|(_, &t)| t > 0.0)
            .map(|(&p, _)| -(p.max(1e-300)).ln())
            .sum();
        let penalty = weights.iter().map(|w| w * w).sum::<f64>() / (2.0 * self.c);

        let residual = &proba - targets;
        let grad_w = x.t().dot(&residual) + weights / self.c;
        let grad_b = residual.sum_axis(Axis(0));

        (log_loss + penalty, grad_w, grad_b)
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "Logistic Regression"
    }

    fn fit(&mut self, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()> {
        check_training_data("logistic_regression", features, labels)?;
        let (index, encoded) = ClassIndex::fit(labels);
        let (n, d) = features.dim();
        let k = index.len();

        self.mean = features.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
        self.scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let x = self.standardize(features);

        let mut targets = Array2::<f64>::zeros((n, k));
        for (i, &class) in encoded.iter().enumerate() {
            targets[[i, class]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((d, k));
        let mut intercept = Array1::<f64>::zeros(k);
        let (mut loss, mut grad_w, mut grad_b) = self.objective(&x, &targets, &weights, &intercept);
        let mut step = 1.0 / n as f64;

        for _ in 0..self.max_iter {
            let grad_norm_sq = grad_w.iter().chain(grad_b.iter()).map(|g| g * g).sum::<f64>();
            if grad_norm_sq.sqrt() / n as f64 <= GRADIENT_TOLERANCE {
                break;
            }

            // Armijo backtracking
            loop {
                let candidate_w = &weights - &(&grad_w * step);
                let candidate_b = &intercept - &(&grad_b * step);
                let (candidate_loss, cgw, cgb) = self.objective(&x, &targets, &candidate_w, &candidate_b);
                if candidate_loss <= loss - 0.5 * step * grad_norm_sq || step < 1e-12 {
                    weights = candidate_w;
                    intercept = candidate_b;
                    loss = candidate_loss;
                    grad_w = cgw;
                    grad_b = cgb;
                    break;
                }
                step *= 0.5;
            }
            step *= 2.0;
        }

        self.index = index;
        self.weights = weights;
        self.intercept = intercept;
        self.fitted = Some(d);
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
        check_fitted("logistic_regression", self.fitted, features)?;
        let x = self.standardize(features);
        Ok(Self::softmax_rows(x.dot(&self.weights) + &self.intercept))
    }

    fn classes(&self) -> &[usize] {
        self.index.classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_separable_binary_problem() {
        let x = array![[0.0, 1.0], [0.5, 1.2], [1.0, 0.8], [3.0, -1.0], [3.5, -0.5], [4.0, -1.2]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut model = LogisticRegression::default();
        model.fit(x.view(), &y).unwrap();

        assert_eq!(model.predict(x.view()).unwrap(), y.to_vec());
        let proba = model.predict_proba(array![[0.0, 1.0]].view()).unwrap();
        assert!(proba[[0, 0]] > 0.8);
    }

    #[test]
    fn test_constant_feature_is_harmless() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 5.0], [1.0, 6.0]];
        let mut model = LogisticRegression::default();
        model.fit(x.view(), &[0, 0, 1, 1]).unwrap();
        assert!(model.predict_proba(x.view()).unwrap().iter().all(|p| p.is_finite()));
    }
}
