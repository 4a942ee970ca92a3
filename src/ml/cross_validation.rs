// src/ml/cross_validation.rs
//! Stratified k-fold partitioning and out-of-fold prediction

use super::{Classifier, ClassifierKind, ClassifierProvider};
use crate::config::CrossValidationConfig;
use crate::error::{Capability, EmgErrorBuilder, EmgResult};
use ndarray::{ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// One train/validation partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Class-proportion preserving k-fold splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize, shuffle: bool, seed: u64) -> Self {
        Self { n_splits, shuffle, seed }
    }

    pub fn from_config(config: &CrossValidationConfig) -> Self {
        Self::new(config.n_splits, config.shuffle, config.seed)
    }

    /// Partition sample indices into folds
    ///
    /// Each class is dealt round-robin over the folds (after a seeded shuffle),
    /// continuing the rotation across classes so fold sizes differ by at most one.
    pub fn split(&self, labels: &[usize]) -> EmgResult<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(EmgErrorBuilder::new("stratified_kfold", "split").capability(
                Capability::CrossValidation,
                format!("at least 2 folds required, got {}", self.n_splits),
            ));
        }

        let mut classes: Vec<usize> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let members: Vec<Vec<usize>> = classes
            .iter()
            .map(|&c| (0..labels.len()).filter(|&i| labels[i] == c).collect())
            .collect();

        let smallest = members.iter().map(Vec::len).min().unwrap_or(0);
        if smallest < self.n_splits {
            return Err(EmgErrorBuilder::new("stratified_kfold", "split").capability(
                Capability::CrossValidation,
                format!(
                    "n_splits={} exceeds the number of members ({}) in the smallest class",
                    self.n_splits, smallest
                ),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut assignment = vec![0usize; labels.len()];
        let mut slot = 0usize;
        for mut indices in members {
            if self.shuffle {
                indices.shuffle(&mut rng);
            }
            for index in indices {
                assignment[index] = slot % self.n_splits;
                slot += 1;
            }
        }

        Ok((0..self.n_splits)
            .map(|fold| {
                let (validation, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&i| assignment[i] == fold);
                Fold { train, validation }
            })
            .collect())
    }
}

/// Gather `indices` rows and labels
pub fn take_rows(features: ArrayView2<f64>, labels: &[usize], indices: &[usize]) -> (ndarray::Array2<f64>, Vec<usize>) {
    (
        features.select(Axis(0), indices),
        indices.iter().map(|&i| labels[i]).collect(),
    )
}

/// Per-fold scores of one model family on one feature matrix
pub struct FoldScores {
    pub accuracy: Vec<f64>,
    pub f1: Vec<f64>,
    /// Model fitted on the last fold's training part
    pub last_model: Box<dyn Classifier>,
}

impl FoldScores {
    pub fn mean_accuracy(&self) -> f64 {
        crate::utils::mean(&self.accuracy)
    }

    pub fn mean_f1(&self) -> f64 {
        crate::utils::mean(&self.f1)
    }
}

/// Fit a fresh model per fold and score it on the held-out part
pub fn cross_validate(
    provider: &ClassifierProvider,
    kind: ClassifierKind,
    features: ArrayView2<f64>,
    labels: &[usize],
    folds: &[Fold],
) -> EmgResult<FoldScores> {
    let mut accuracy = Vec::with_capacity(folds.len());
    let mut f1 = Vec::with_capacity(folds.len());
    let mut last_model = None;

    for (i, fold) in folds.iter().enumerate() {
        let (x_train, y_train) = take_rows(features, labels, &fold.train);
        let (x_val, y_val) = take_rows(features, labels, &fold.validation);

        let mut model = provider.create(kind);
        model.fit(x_train.view(), &y_train)?;
        let predicted = model.predict(x_val.view())?;

        let fold_accuracy = super::accuracy(&y_val, &predicted);
        let fold_f1 = super::f1_macro(&y_val, &predicted);
        debug!(fold = i, accuracy = fold_accuracy, f1 = fold_f1, "fold scored");

        accuracy.push(fold_accuracy);
        f1.push(fold_f1);
        last_model = Some(model);
    }

    let last_model = last_model.ok_or_else(|| {
        EmgErrorBuilder::new("cross_validation", "cross_validate")
            .capability(Capability::CrossValidation, "no folds to evaluate")
    })?;
    Ok(FoldScores { accuracy, f1, last_model })
}

/// Predict every sample with the model trained on the folds not containing it
pub fn cross_val_predict(
    provider: &ClassifierProvider,
    kind: ClassifierKind,
    features: ArrayView2<f64>,
    labels: &[usize],
    folds: &[Fold],
) -> EmgResult<Vec<usize>> {
    let mut predictions = vec![None; labels.len()];

    for fold in folds {
        let (x_train, y_train) = take_rows(features, labels, &fold.train);
        let x_val = features.select(Axis(0), &fold.validation);

        let mut model = provider.create(kind);
        model.fit(x_train.view(), &y_train)?;
        for (&index, prediction) in fold.validation.iter().zip(model.predict(x_val.view())?) {
            predictions[index] = Some(prediction);
        }
    }

    predictions
        .into_iter()
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| {
            EmgErrorBuilder::new("cross_validation", "cross_val_predict")
                .capability(Capability::CrossValidation, "folds do not cover every sample")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_data::blobs;

    #[test]
    fn test_folds_partition_indices_and_keep_proportions() {
        let labels: Vec<usize> = (0..30).map(|i| if i < 10 { 0 } else if i < 22 { 1 } else { 2 }).collect();
        let folds = StratifiedKFold::new(4, true, 42).split(&labels).unwrap();
        assert_eq!(folds.len(), 4);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.validation.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..30).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.validation.len(), 30);
            for class in 0..3 {
                let total = labels.iter().filter(|&&l| l == class).count();
                let in_fold = fold.validation.iter().filter(|&&i| labels[i] == class).count();
                let ideal = total as f64 / 4.0;
                assert!((in_fold as f64 - ideal).abs() < 1.0);
            }
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let a = StratifiedKFold::new(4, true, 42).split(&labels).unwrap();
        let b = StratifiedKFold::new(4, true, 42).split(&labels).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_errors() {
        let labels = vec![0, 0, 0, 1, 1, 1];
        assert!(StratifiedKFold::new(1, true, 0).split(&labels).is_err());
        assert!(StratifiedKFold::new(4, true, 0).split(&labels).is_err());
        assert!(StratifiedKFold::new(3, false, 0).split(&labels).is_ok());
    }

    #[test]
    fn test_cross_val_predict_covers_all_samples() {
        let (x, y) = blobs(8, 3, 11);
        let folds = StratifiedKFold::new(4, true, 42).split(&y).unwrap();
        let provider = ClassifierProvider::new(42);
        let predicted = cross_val_predict(&provider, ClassifierKind::Knn, x.view(), &y, &folds).unwrap();
        assert_eq!(predicted.len(), y.len());
        assert!(crate::ml::accuracy(&y, &predicted) > 0.8);

        let scores = cross_validate(&provider, ClassifierKind::NaiveBayes, x.view(), &y, &folds).unwrap();
        assert_eq!(scores.accuracy.len(), 4);
        assert!(scores.mean_accuracy() > 0.8);
        assert_eq!(scores.last_model.n_classes(), 3);
    }
}
