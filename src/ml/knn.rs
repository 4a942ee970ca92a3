// src/ml/knn.rs
//! k-nearest-neighbour classifier

use super::{check_fitted, check_training_data, ClassIndex, Classifier};
use crate::error::EmgResult;
use ndarray::{Array2, ArrayView2, Axis};

const DEFAULT_NEIGHBORS: usize = 5;

/// Uniformly weighted Euclidean k-NN
#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    k: usize,
    train: Option<Array2<f64>>,
    labels: Vec<usize>,
    index: ClassIndex,
}

impl Default for KNearestNeighbors {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBORS)
    }
}

impl KNearestNeighbors {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            train: None,
            labels: Vec::new(),
            index: ClassIndex::default(),
        }
    }
}

impl Classifier for KNearestNeighbors {
    fn name(&self) -> &'static str {
        "KNN"
    }

    fn fit(&mut self, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()> {
        check_training_data("knn", features, labels)?;
        let (index, encoded) = ClassIndex::fit(labels);
        self.index = index;
        self.labels = encoded;
        self.train = Some(features.to_owned());
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
        check_fitted("knn", self.train.as_ref().map(|t| t.ncols()), features)?;
        let train = match &self.train {
            Some(train) => train,
            None => return Ok(Array2::zeros((features.nrows(), 0))),
        };

        let k = self.k.min(train.nrows());
        let mut proba = Array2::<f64>::zeros((features.nrows(), self.index.len()));

        for (query, mut out) in features.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            let mut distances: Vec<(f64, usize)> = train
                .axis_iter(Axis(0))
                .enumerate()
                .map(|(i, row)| {
                    let d: f64 = row.iter().zip(query.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                    (d, i)
                })
                .collect();
            // Stable on equal distances so earlier training samples win
            distances.sort_by(|a, b| a.0.total_cmp(&b.0));

            for &(_, i) in distances.iter().take(k) {
                out[self.labels[i]] += 1.0 / k as f64;
            }
        }

        Ok(proba)
    }

    fn classes(&self) -> &[usize] {
        self.index.classes()
    }
}
