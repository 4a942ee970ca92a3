// src/ml/svm.rs
//! RBF-kernel support vector classifier
//!
//! Binary machines are trained with SMO using maximal-violating-pair working
//! set selection and combined one-vs-one. Probabilities come from pairwise
//! coupling of sigmoid-squashed decision values; `predict` keeps majority
//! voting, so it can disagree with the probability argmax on close calls.

use super::{check_fitted, check_training_data, ClassIndex, Classifier};
use crate::error::EmgResult;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

const DEFAULT_C: f64 = 1.0;
const SMO_TOLERANCE: f64 = 1e-3;
const MAX_SMO_ITERATIONS: usize = 100_000;
const TAU: f64 = 1e-12;

#[derive(Debug, Clone)]
struct BinaryMachine {
    /// Class column treated as +1
    positive: usize,
    negative: usize,
    support: Array2<f64>,
    /// alpha_i * y_i of every support vector
    dual_coef: Vec<f64>,
    rho: f64,
}

impl BinaryMachine {
    fn decision(&self, gamma: f64, x: ArrayView1<f64>) -> f64 {
        self.support
            .axis_iter(Axis(0))
            .zip(&self.dual_coef)
            .map(|(sv, &coef)| coef * rbf(gamma, sv, x))
            .sum::<f64>()
            - self.rho
    }
}

#[derive(Debug, Clone)]
pub struct SupportVectorClassifier {
    c: f64,
    gamma: f64,
    index: ClassIndex,
    machines: Vec<BinaryMachine>,
    fitted: Option<usize>,
}

impl Default for SupportVectorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_C)
    }
}

fn rbf(gamma: f64, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let d: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * d).exp()
}

impl SupportVectorClassifier {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            gamma: 1.0,
            index: ClassIndex::default(),
            machines: Vec::new(),
            fitted: None,
        }
    }

    /// Solve the dual for labels `y` in {-1, +1} over the precomputed kernel
    fn smo(&self, kernel: &Array2<f64>, y: &[f64]) -> (Vec<f64>, f64) {
        let n = y.len();
        let c = self.c;
        let mut alpha = vec![0.0; n];
        // Gradient of 1/2 a'Qa - e'a
        let mut grad = vec![-1.0; n];
        let q = |i: usize, j: usize| y[i] * y[j] * kernel[[i, j]];

        for _ in 0..MAX_SMO_ITERATIONS {
            let mut i = None;
            let mut g_max = f64::NEG_INFINITY;
            let mut j = None;
            let mut g_min = f64::INFINITY;

            for t in 0..n {
                let value = -y[t] * grad[t];
                let in_up = (y[t] > 0.0 && alpha[t] < c) || (y[t] < 0.0 && alpha[t] > 0.0);
                let in_low = (y[t] > 0.0 && alpha[t] > 0.0) || (y[t] < 0.0 && alpha[t] < c);
                if in_up && value >= g_max {
                    g_max = value;
                    i = Some(t);
                }
                if in_low && value <= g_min {
                    g_min = value;
                    j = Some(t);
                }
            }

            let (Some(i), Some(j)) = (i, j) else { break };
            if g_max - g_min < SMO_TOLERANCE {
                break;
            }

            let (old_i, old_j) = (alpha[i], alpha[j]);
            if y[i] != y[j] {
                let quad = (q(i, i) + q(j, j) + 2.0 * q(i, j)).max(TAU);
                let delta = (-grad[i] - grad[j]) / quad;
                let diff = alpha[i] - alpha[j];
                alpha[i] += delta;
                alpha[j] += delta;
                if diff > 0.0 {
                    if alpha[j] < 0.0 {
                        alpha[j] = 0.0;
                        alpha[i] = diff;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = -diff;
                }
                if diff > 0.0 {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = c - diff;
                    }
                } else if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = c + diff;
                }
            } else {
                let quad = (q(i, i) + q(j, j) - 2.0 * q(i, j)).max(TAU);
                let delta = (grad[i] - grad[j]) / quad;
                let sum = alpha[i] + alpha[j];
                alpha[i] -= delta;
                alpha[j] += delta;
                if sum > c {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = sum - c;
                    }
                } else if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = sum;
                }
                if sum > c {
                    if alpha[j] > c {
                        alpha[j] = c;
                        alpha[i] = sum - c;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = sum;
                }
            }

            let (delta_i, delta_j) = (alpha[i] - old_i, alpha[j] - old_j);
            for t in 0..n {
                grad[t] += q(i, t) * delta_i + q(j, t) * delta_j;
            }
        }

        // Offset from the free support vectors, or the midpoint of the feasible interval
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free_count = 0usize;
        for t in 0..n {
            let yg = y[t] * grad[t];
            if alpha[t] >= c {
                if y[t] < 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else if alpha[t] <= 0.0 {
                if y[t] > 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else {
                free_sum += yg;
                free_count += 1;
            }
        }
        let rho = if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        };

        (alpha, rho)
    }

    /// Decision values of every pairwise machine for one sample
    fn decisions(&self, x: ArrayView1<f64>) -> Vec<f64> {
        self.machines.iter().map(|m| m.decision(self.gamma, x)).collect()
    }
}

impl Classifier for SupportVectorClassifier {
    fn name(&self) -> &'static str {
        "SVC"
    }

    fn fit(&mut self, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()> {
        check_training_data("svc", features, labels)?;
        let (index, encoded) = ClassIndex::fit(labels);
        let d = features.ncols();

        // gamma = 1 / (n_features * Var(X))
        let count = features.len() as f64;
        let overall_mean = features.sum() / count;
        let variance = features.iter().map(|v| (v - overall_mean).powi(2)).sum::<f64>() / count;
        self.gamma = if variance > 0.0 { 1.0 / (d as f64 * variance) } else { 1.0 };

        let mut machines = Vec::new();
        for positive in 0..index.len() {
            for negative in positive + 1..index.len() {
                let rows: Vec<usize> = (0..encoded.len())
                    .filter(|&i| encoded[i] == positive || encoded[i] == negative)
                    .collect();
                let subset = features.select(Axis(0), &rows);
                let y: Vec<f64> = rows
                    .iter()
                    .map(|&i| if encoded[i] == positive { 1.0 } else { -1.0 })
                    .collect();

                let m = rows.len();
                let kernel = Array2::from_shape_fn((m, m), |(a, b)| rbf(self.gamma, subset.row(a), subset.row(b)));
                let (alpha, rho) = self.smo(&kernel, &y);

                let support_rows: Vec<usize> = (0..m).filter(|&t| alpha[t] > 0.0).collect();
                machines.push(BinaryMachine {
                    positive,
                    negative,
                    support: subset.select(Axis(0), &support_rows),
                    dual_coef: support_rows.iter().map(|&t| alpha[t] * y[t]).collect(),
                    rho,
                });
            }
        }

        self.index = index;
        self.machines = machines;
        self.fitted = Some(d);
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
        check_fitted("svc", self.fitted, features)?;
        let k = self.index.len();
        let mut proba = Array2::<f64>::zeros((features.nrows(), k));
        if k == 1 {
            proba.fill(1.0);
            return Ok(proba);
        }

        let pairs = (k * (k - 1) / 2) as f64;
        for (x, mut out) in features.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            for (machine, f) in self.machines.iter().zip(self.decisions(x)) {
                let p = 1.0 / (1.0 + (-f).exp());
                out[machine.positive] += p;
                out[machine.negative] += 1.0 - p;
            }
            out.mapv_inplace(|v| v / pairs);
        }
        Ok(proba)
    }

    fn predict(&self, features: ArrayView2<f64>) -> EmgResult<Vec<usize>> {
        check_fitted("svc", self.fitted, features)?;
        let k = self.index.len();
        let classes = self.index.classes();

        Ok(features
            .axis_iter(Axis(0))
            .map(|x| {
                let mut votes = Array1::<f64>::zeros(k);
                for (machine, f) in self.machines.iter().zip(self.decisions(x)) {
                    if f > 0.0 {
                        votes[machine.positive] += 1.0;
                    } else {
                        votes[machine.negative] += 1.0;
                    }
                }
                classes[super::argmax(votes.view())]
            })
            .collect())
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
    fn test_binary_margin() {
        let x = array![[0.0, 0.0], [0.2, 0.1], [0.1, 0.3], [3.0, 3.0], [3.2, 2.9], [2.8, 3.1]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut svc = SupportVectorClassifier::default();
        svc.fit(x.view(), &y).unwrap();

        assert_eq!(svc.machines.len(), 1);
        assert_eq!(svc.predict(x.view()).unwrap(), y.to_vec());
        let proba = svc.predict_proba(array![[3.0, 3.0]].view()).unwrap();
        assert!(proba[[0, 1]] > 0.5);
    }

    #[test]
    fn test_one_vs_one_machine_count() {
        let (x, y) = crate::ml::test_data::blobs(6, 3, 5);
        let mut svc = SupportVectorClassifier::default();
        svc.fit(x.view(), &y).unwrap();
        assert_eq!(svc.machines.len(), 3);
    }
}
