// src/ml/forest.rs
//! Bootstrap-aggregated random forest

use super::tree::{grow_classification_tree, Tree, TreeParams};
use super::{check_fitted, check_training_data, ClassIndex, Classifier};
use crate::error::EmgResult;
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const DEFAULT_TREES: usize = 100;
const DEFAULT_MAX_DEPTH: usize = 30;

#[derive(Debug, Clone)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    seed: u64,
    trees: Vec<Tree>,
    index: ClassIndex,
    fitted: Option<usize>,
}

impl RandomForest {
    pub fn new(seed: u64) -> Self {
        Self::with_params(DEFAULT_TREES, DEFAULT_MAX_DEPTH, seed)
    }

    pub fn with_params(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            max_depth,
            seed,
            trees: Vec::new(),
            index: ClassIndex::default(),
            fitted: None,
        }
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "Random Forest"
    }

    fn fit(&mut self, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()> {
        check_training_data("random_forest", features, labels)?;
        let (index, encoded) = ClassIndex::fit(labels);
        let (n, d) = features.dim();
        let n_classes = index.len();

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            max_features: Some(((d as f64).sqrt() as usize).max(1)),
        };

        // One independent stream per tree keeps the result scheduling-independent
        let seed = self.seed;
        self.trees = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                grow_classification_tree(features, &encoded, n_classes, &bootstrap, &params, &mut rng)
            })
            .collect();

        self.index = index;
        self.fitted = Some(d);
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
        check_fitted("random_forest", self.fitted, features)?;
        let k = self.index.len();
        let mut proba = Array2::<f64>::zeros((features.nrows(), k));

        for (sample, mut out) in features.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            for tree in &self.trees {
                for (o, v) in out.iter_mut().zip(tree.leaf(sample)) {
                    *o += v;
                }
            }
            out.mapv_inplace(|v| v / self.trees.len() as f64);
        }
        Ok(proba)
    }

    fn classes(&self) -> &[usize] {
        self.index.classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_data::blobs;

    #[test]
    fn test_forest_is_reproducible() {
        let (x, y) = blobs(10, 4, 1);
        let mut a = RandomForest::with_params(20, 10, 42);
        let mut b = RandomForest::with_params(20, 10, 42);
        a.fit(x.view(), &y).unwrap();
        b.fit(x.view(), &y).unwrap();

        assert_eq!(a.trees().len(), 20);
        assert_eq!(a.predict_proba(x.view()).unwrap(), b.predict_proba(x.view()).unwrap());
    }
}
